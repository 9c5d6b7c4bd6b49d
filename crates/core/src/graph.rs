//! Commit-graph model builder.
//!
//! [`GraphModelBuilder::build`] turns the service's raw `{nodes, edges}` feed
//! into a typed, render-ready [`GraphModel`]. The transformation is pure: it
//! reads nothing but its input and has no knowledge of the current
//! selection. Node and edge kinds are closed enums decided once by
//! [`GraphModelBuilder::classify_node`] and [`GraphModelBuilder::classify_edge`];
//! everything downstream matches on those tags instead of the raw flags.
//!
//! Layout is left to the renderer. The model only carries hierarchical hints
//! (a per-node level and spacing constants) and deterministic styling.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Node ids the service gives branch pointers (`branch-<id>`).
const BRANCH_NODE_PREFIX: &str = "branch-";

// ---------------------------------------------------------------------------
// Raw feed
// ---------------------------------------------------------------------------

/// The raw `{nodes, edges}` payload returned by `GET /graph`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawGraph {
    #[serde(default)]
    pub nodes: Option<Vec<RawNode>>,
    #[serde(default)]
    pub edges: Option<Vec<RawEdge>>,
    /// Set by the service when it failed to assemble the graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A node identifier: commits use numbers, branch pointers use strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for RawId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RawId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<i64> for RawId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// The `branch` marker on a raw node: a flag or the branch's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BranchMarker {
    Flag(bool),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
    pub id: RawId,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub branch: Option<BranchMarker>,
    #[serde(default)]
    pub shape: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEdge {
    pub from: RawId,
    pub to: RawId,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub dashes: Option<bool>,
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Commit,
    BranchPointer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentKind {
    Direct,
    Merge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "parent")]
pub enum EdgeKind {
    ParentLink(ParentKind),
    HeadLink,
}

/// Presentation-only node styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeStyle {
    pub shape: &'static str,
    pub background: &'static str,
    pub border: &'static str,
    pub highlight_background: &'static str,
    pub highlight_border: &'static str,
}

/// Presentation-only edge styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EdgeStyle {
    pub color: &'static str,
    pub highlight: &'static str,
    pub dashed: bool,
    pub width: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    /// Hierarchy level for an up-to-down layout; roots are 0.
    pub level: usize,
    pub style: NodeStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
    pub label: Option<String>,
    pub style: EdgeStyle,
}

/// Hints for a hierarchical renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayoutHints {
    pub direction: &'static str,
    pub sort_method: &'static str,
    pub node_spacing: u32,
    pub level_separation: u32,
    pub physics: bool,
}

impl Default for LayoutHints {
    fn default() -> Self {
        Self {
            direction: "UD",
            sort_method: "directed",
            node_spacing: 150,
            level_separation: 100,
            physics: false,
        }
    }
}

/// A non-empty, render-ready commit graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub layout: LayoutHints,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

/// Result of [`GraphModelBuilder::build`]. `Empty` is a normal outcome that
/// callers render as a placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "graph", rename_all = "snake_case")]
pub enum GraphModel {
    Empty,
    Graph(CommitGraph),
}

impl GraphModel {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_graph(&self) -> Option<&CommitGraph> {
        match self {
            Self::Graph(g) => Some(g),
            Self::Empty => None,
        }
    }
}

impl CommitGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    fn kind_of(&self, id: &str) -> Option<NodeKind> {
        self.node(id).map(|n| n.kind)
    }

    /// The commit a branch pointer points at, `None` for an empty branch.
    pub fn head_of(&self, branch_node: &str) -> Option<&GraphNode> {
        self.edges
            .iter()
            .find(|e| e.from == branch_node && e.kind == EdgeKind::HeadLink)
            .and_then(|e| self.node(&e.to))
    }

    /// Parent commits of `commit`, in feed order.
    pub fn parents_of(&self, commit: &str) -> Vec<&GraphNode> {
        self.edges
            .iter()
            .filter(|e| e.to == commit && self.kind_of(&e.from) == Some(NodeKind::Commit))
            .filter_map(|e| self.node(&e.from))
            .collect()
    }

    pub fn is_merge_commit(&self, commit: &str) -> bool {
        self.parents_of(commit).len() >= 2
    }

    /// Branch pointers with no head link, i.e. empty branches.
    pub fn orphan_branch_pointers(&self) -> Vec<&GraphNode> {
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKind::BranchPointer && self.head_of(&n.id).is_none())
            .collect()
    }

    pub fn commit_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Commit)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Pure transformation from [`RawGraph`] to [`GraphModel`].
pub struct GraphModelBuilder;

impl GraphModelBuilder {
    /// Build the render-ready model. Absent or empty `nodes`/`edges` (and a
    /// feed carrying an `error`) yield [`GraphModel::Empty`].
    pub fn build(raw: &RawGraph) -> GraphModel {
        if let Some(err) = &raw.error {
            warn!(error = %err, "graph feed reported an error, rendering empty graph");
            return GraphModel::Empty;
        }
        let (raw_nodes, raw_edges) = match (&raw.nodes, &raw.edges) {
            (Some(n), Some(e)) if !n.is_empty() && !e.is_empty() => (n, e),
            _ => {
                debug!("graph feed has no nodes or edges");
                return GraphModel::Empty;
            }
        };

        let mut nodes: Vec<GraphNode> = Vec::with_capacity(raw_nodes.len());
        let mut index = HashMap::with_capacity(raw_nodes.len());
        for raw_node in raw_nodes {
            let id = raw_node.id.to_string();
            if index.contains_key(&id) {
                warn!(node = %id, "duplicate graph node ignored");
                continue;
            }
            let kind = Self::classify_node(raw_node);
            index.insert(id.clone(), nodes.len());
            nodes.push(GraphNode {
                label: node_label(raw_node, &id),
                id,
                kind,
                level: 0,
                style: Self::node_style(kind),
            });
        }

        let mut edges = Vec::with_capacity(raw_edges.len());
        for raw_edge in raw_edges {
            let (from, to) = (raw_edge.from.to_string(), raw_edge.to.to_string());
            if !index.contains_key(&from) || !index.contains_key(&to) {
                warn!(%from, %to, "graph edge references an unknown node, dropped");
                continue;
            }
            let kind = Self::classify_edge(raw_edge);
            edges.push(GraphEdge {
                from,
                to,
                kind,
                label: raw_edge.label.clone().filter(|l| !l.is_empty()),
                style: Self::edge_style(kind),
            });
        }

        let mut graph = CommitGraph {
            nodes,
            edges,
            layout: LayoutHints::default(),
            index,
        };
        assign_levels(&mut graph);
        debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "built graph model"
        );
        GraphModel::Graph(graph)
    }

    /// A node is a branch pointer when the feed marks it with a truthy
    /// `branch` field or draws it as an ellipse.
    pub fn classify_node(node: &RawNode) -> NodeKind {
        let marked = match &node.branch {
            Some(BranchMarker::Flag(flag)) => *flag,
            Some(BranchMarker::Name(name)) => !name.is_empty(),
            None => false,
        };
        if marked || node.shape.as_deref() == Some("ellipse") {
            NodeKind::BranchPointer
        } else {
            NodeKind::Commit
        }
    }

    /// Classify an edge from its own fields only.
    ///
    /// Commit ids are numeric, so a dashed edge leaving a text id is a head
    /// link while a dashed edge between commits is a merge's second parent.
    pub fn classify_edge(edge: &RawEdge) -> EdgeKind {
        let dashed = edge.dashes.unwrap_or(false);
        let labelled = edge.label.as_deref().is_some_and(|l| !l.is_empty());
        match &edge.from {
            RawId::Text(s) if s.starts_with(BRANCH_NODE_PREFIX) => EdgeKind::HeadLink,
            RawId::Text(_) if dashed => EdgeKind::HeadLink,
            _ if dashed || labelled => EdgeKind::ParentLink(ParentKind::Merge),
            _ => EdgeKind::ParentLink(ParentKind::Direct),
        }
    }

    pub fn node_style(kind: NodeKind) -> NodeStyle {
        match kind {
            NodeKind::BranchPointer => NodeStyle {
                shape: "ellipse",
                background: "#d73a49",
                border: "#cb2431",
                highlight_background: "#e36578",
                highlight_border: "#cb2431",
            },
            NodeKind::Commit => NodeStyle {
                shape: "box",
                background: "#0969da",
                border: "#0550ae",
                highlight_background: "#318ce7",
                highlight_border: "#0550ae",
            },
        }
    }

    pub fn edge_style(kind: EdgeKind) -> EdgeStyle {
        match kind {
            EdgeKind::HeadLink => EdgeStyle {
                color: "#28a745",
                highlight: "#22863a",
                dashed: true,
                width: 2,
            },
            EdgeKind::ParentLink(ParentKind::Merge) => EdgeStyle {
                color: "#d73a49",
                highlight: "#cb2431",
                dashed: false,
                width: 1,
            },
            EdgeKind::ParentLink(ParentKind::Direct) => EdgeStyle {
                color: "#586069",
                highlight: "#24292e",
                dashed: false,
                width: 1,
            },
        }
    }
}

fn node_label(node: &RawNode, id: &str) -> String {
    let base = node.label.clone().unwrap_or_else(|| id.to_string());
    match &node.branch {
        Some(BranchMarker::Name(name)) if !name.is_empty() => format!("{}\n[{}]", base, name),
        _ => base,
    }
}

/// Commits get the length of their longest ancestor chain; a branch pointer
/// sits level with its head (0 when empty). Commits caught in a cycle of a
/// malformed feed stay at 0.
fn assign_levels(graph: &mut CommitGraph) {
    let n = graph.nodes.len();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree = vec![0usize; n];

    for edge in &graph.edges {
        let (f, t) = (graph.index[&edge.from], graph.index[&edge.to]);
        if graph.nodes[f].kind == NodeKind::Commit && graph.nodes[t].kind == NodeKind::Commit {
            children[f].push(t);
            indegree[t] += 1;
        }
    }

    let mut levels = vec![0usize; n];
    let mut queue: VecDeque<usize> = (0..n)
        .filter(|&i| graph.nodes[i].kind == NodeKind::Commit && indegree[i] == 0)
        .collect();
    let mut visited = 0usize;
    while let Some(i) = queue.pop_front() {
        visited += 1;
        for &c in &children[i] {
            levels[c] = levels[c].max(levels[i] + 1);
            indegree[c] -= 1;
            if indegree[c] == 0 {
                queue.push_back(c);
            }
        }
    }
    let commits = graph.commit_count();
    if visited < commits {
        warn!(unvisited = commits - visited, "commit graph contains a cycle");
    }

    for edge in &graph.edges {
        let (f, t) = (graph.index[&edge.from], graph.index[&edge.to]);
        if edge.kind == EdgeKind::HeadLink && graph.nodes[f].kind == NodeKind::BranchPointer {
            levels[f] = levels[t];
        }
    }

    for (node, level) in graph.nodes.iter_mut().zip(levels) {
        node.level = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Numeric-looking ids become commit numbers, the rest stay text.
    fn rid(s: &str) -> RawId {
        s.parse::<i64>().map(RawId::Number).unwrap_or_else(|_| RawId::from(s))
    }

    fn node(id: &str, label: &str) -> RawNode {
        RawNode {
            id: rid(id),
            label: Some(label.into()),
            branch: None,
            shape: None,
        }
    }

    fn branch_node(id: &str, label: &str) -> RawNode {
        RawNode {
            branch: Some(BranchMarker::Flag(true)),
            ..node(id, label)
        }
    }

    fn edge(from: &str, to: &str) -> RawEdge {
        RawEdge {
            from: rid(from),
            to: rid(to),
            label: None,
            dashes: None,
        }
    }

    #[test]
    fn test_branch_pointer_and_head_link() {
        let raw = RawGraph {
            nodes: Some(vec![node("c1", "init"), branch_node("branch-main", "main")]),
            edges: Some(vec![RawEdge {
                dashes: Some(true),
                ..edge("branch-main", "c1")
            }]),
            error: None,
        };

        let model = GraphModelBuilder::build(&raw);
        let graph = model.as_graph().expect("graph should not be empty");
        assert_eq!(graph.node("branch-main").unwrap().kind, NodeKind::BranchPointer);
        assert_eq!(graph.node("c1").unwrap().kind, NodeKind::Commit);
        assert_eq!(graph.edges[0].kind, EdgeKind::HeadLink);
        assert_eq!(graph.head_of("branch-main").unwrap().id, "c1");
    }

    #[test]
    fn test_empty_inputs_yield_empty_graph() {
        assert!(GraphModelBuilder::build(&RawGraph::default()).is_empty());

        let no_edges = RawGraph {
            nodes: Some(vec![node("c1", "init")]),
            edges: Some(vec![]),
            error: None,
        };
        assert!(GraphModelBuilder::build(&no_edges).is_empty());

        let no_nodes = RawGraph {
            nodes: None,
            edges: Some(vec![edge("a", "b")]),
            error: None,
        };
        assert_eq!(GraphModelBuilder::build(&no_nodes), GraphModel::Empty);
    }

    #[test]
    fn test_error_feed_is_empty() {
        let raw: RawGraph =
            serde_json::from_str(r#"{"nodes":[],"edges":[],"error":"database is locked"}"#)
                .unwrap();
        assert!(GraphModelBuilder::build(&raw).is_empty());
    }

    #[test]
    fn test_edge_classification_is_order_independent() {
        let edges = vec![
            edge("1", "2"),
            RawEdge {
                label: Some("feature".into()),
                ..edge("3", "4")
            },
            RawEdge {
                dashes: Some(true),
                ..edge("branch-1", "4")
            },
        ];
        let forward: Vec<EdgeKind> = edges.iter().map(GraphModelBuilder::classify_edge).collect();
        let backward: Vec<EdgeKind> = edges
            .iter()
            .rev()
            .map(GraphModelBuilder::classify_edge)
            .rev()
            .collect();
        assert_eq!(forward, backward);
        assert_eq!(
            forward,
            vec![
                EdgeKind::ParentLink(ParentKind::Direct),
                EdgeKind::ParentLink(ParentKind::Merge),
                EdgeKind::HeadLink,
            ]
        );
    }

    #[test]
    fn test_service_feed_with_merge_commit() {
        // Shape of the service's /graph response: numeric commit ids,
        // ellipse branch nodes with labelled head edges.
        let raw: RawGraph = serde_json::from_str(
            r##"{
              "nodes": [
                {"id":1,"label":"init","shape":"box"},
                {"id":2,"label":"on main","shape":"box"},
                {"id":3,"label":"on feature","shape":"box"},
                {"id":4,"label":"Merge commit","shape":"box"},
                {"id":"branch-1","label":"main","shape":"ellipse","color":"#d73a49"},
                {"id":"branch-2","label":"feature","shape":"ellipse","color":"#d73a49"}
              ],
              "edges": [
                {"from":1,"to":2},
                {"from":1,"to":3},
                {"from":2,"to":4},
                {"from":3,"to":4,"dashes":true,"color":"#28a745"},
                {"from":"branch-1","to":4,"color":"#d73a49","label":"main"},
                {"from":"branch-2","to":3,"color":"#d73a49","label":"feature"}
              ]
            }"##,
        )
        .unwrap();

        let model = GraphModelBuilder::build(&raw);
        let graph = model.as_graph().unwrap();
        assert_eq!(graph.commit_count(), 4);
        assert!(graph.is_merge_commit("4"));
        assert!(!graph.is_merge_commit("2"));
        assert_eq!(graph.node("branch-1").unwrap().kind, NodeKind::BranchPointer);
        assert_eq!(graph.head_of("branch-2").unwrap().id, "3");

        assert_eq!(graph.node("1").unwrap().level, 0);
        assert_eq!(graph.node("3").unwrap().level, 1);
        assert_eq!(graph.node("4").unwrap().level, 2);
        assert_eq!(graph.node("branch-1").unwrap().level, 2);

        let kind_of = |from: &str, to: &str| {
            graph
                .edges
                .iter()
                .find(|e| e.from == from && e.to == to)
                .map(|e| e.kind)
        };
        assert_eq!(kind_of("3", "4"), Some(EdgeKind::ParentLink(ParentKind::Merge)));
        assert_eq!(kind_of("2", "4"), Some(EdgeKind::ParentLink(ParentKind::Direct)));
        assert_eq!(kind_of("branch-1", "4"), Some(EdgeKind::HeadLink));
        assert_eq!(graph.parents_of("4").len(), 2);
    }

    #[test]
    fn test_dashed_edge_between_commits_is_merge_parent() {
        let between_commits = RawEdge {
            dashes: Some(true),
            ..edge("3", "4")
        };
        assert_eq!(
            GraphModelBuilder::classify_edge(&between_commits),
            EdgeKind::ParentLink(ParentKind::Merge)
        );

        let from_text_pointer = RawEdge {
            dashes: Some(true),
            ..edge("head-main", "c1")
        };
        assert_eq!(
            GraphModelBuilder::classify_edge(&from_text_pointer),
            EdgeKind::HeadLink
        );
    }

    #[test]
    fn test_orphan_branch_pointer_is_tolerated() {
        let raw = RawGraph {
            nodes: Some(vec![
                node("1", "init"),
                node("2", "second"),
                branch_node("branch-9", "empty"),
            ]),
            edges: Some(vec![edge("1", "2")]),
            error: None,
        };
        let model = GraphModelBuilder::build(&raw);
        let graph = model.as_graph().unwrap();
        let orphans = graph.orphan_branch_pointers();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].id, "branch-9");
        assert_eq!(orphans[0].level, 0);
        assert!(graph.head_of("branch-9").is_none());
    }

    #[test]
    fn test_named_branch_marker_extends_label() {
        let raw_node = RawNode {
            branch: Some(BranchMarker::Name("main".into())),
            ..node("7", "tip")
        };
        assert_eq!(
            GraphModelBuilder::classify_node(&raw_node),
            NodeKind::BranchPointer
        );
        assert_eq!(node_label(&raw_node, "7"), "tip\n[main]");

        let unmarked = RawNode {
            branch: Some(BranchMarker::Flag(false)),
            ..node("8", "plain")
        };
        assert_eq!(GraphModelBuilder::classify_node(&unmarked), NodeKind::Commit);
    }

    #[test]
    fn test_dangling_edges_and_duplicates_dropped() {
        let raw = RawGraph {
            nodes: Some(vec![node("1", "a"), node("1", "dup"), node("2", "b")]),
            edges: Some(vec![edge("1", "2"), edge("2", "99")]),
            error: None,
        };
        let model = GraphModelBuilder::build(&raw);
        let graph = model.as_graph().unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.node("1").unwrap().label, "a");
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn test_styles_follow_kind() {
        let commit = GraphModelBuilder::node_style(NodeKind::Commit);
        let pointer = GraphModelBuilder::node_style(NodeKind::BranchPointer);
        assert_ne!(commit, pointer);
        assert_eq!(pointer.shape, "ellipse");

        let head = GraphModelBuilder::edge_style(EdgeKind::HeadLink);
        assert!(head.dashed);
        assert_eq!(head.width, 2);
        let direct = GraphModelBuilder::edge_style(EdgeKind::ParentLink(ParentKind::Direct));
        assert!(!direct.dashed);
    }

    #[test]
    fn test_cycle_does_not_hang() {
        let raw = RawGraph {
            nodes: Some(vec![node("1", "a"), node("2", "b")]),
            edges: Some(vec![edge("1", "2"), edge("2", "1")]),
            error: None,
        };
        let model = GraphModelBuilder::build(&raw);
        let graph = model.as_graph().unwrap();
        assert!(graph.nodes.iter().all(|n| n.level == 0));
    }
}
