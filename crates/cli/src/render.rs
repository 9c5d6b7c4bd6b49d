//! Terminal rendering of lists, history and the commit graph.

use std::fmt::Write as _;

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use branchview_core::graph::{CommitGraph, EdgeKind, GraphModel, NodeKind, ParentKind};
use branchview_core::models::{Branch, Commit, Identity, Repository};

use crate::style;

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

pub fn identities(items: &[Identity], selected: Option<i64>) -> Table {
    let mut t = table(vec!["", "ID", "Name"]);
    for i in items {
        t.add_row(vec![
            Cell::new(style::selected_marker(selected == Some(i.id))),
            Cell::new(i.id),
            Cell::new(&i.display_name),
        ]);
    }
    t
}

pub fn repositories(items: &[Repository], selected: Option<i64>) -> Table {
    let mut t = table(vec!["", "ID", "Name"]);
    for r in items {
        t.add_row(vec![
            Cell::new(style::selected_marker(selected == Some(r.id))),
            Cell::new(r.id),
            Cell::new(&r.name),
        ]);
    }
    t
}

pub fn branches(items: &[Branch], selected: Option<i64>) -> Table {
    let mut t = table(vec!["", "ID", "Name", "Head"]);
    for b in items {
        let head = b
            .head_commit_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "(empty)".to_string());
        t.add_row(vec![
            Cell::new(style::selected_marker(selected == Some(b.id))),
            Cell::new(b.id),
            Cell::new(&b.name),
            Cell::new(head),
        ]);
    }
    t
}

pub fn history(commits: &[Commit]) -> Table {
    let mut t = table(vec!["ID", "Message", "Author", "Parents", "Created"]);
    for c in commits {
        let parents: Vec<String> = [c.parent_commit_id, c.parent_commit_id_2]
            .iter()
            .flatten()
            .map(|p| p.to_string())
            .collect();
        let created = c
            .created_at_utc()
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .or_else(|| c.created_at.clone())
            .unwrap_or_default();
        let message = if c.is_merge() {
            format!("{} (merge)", c.message)
        } else {
            c.message.clone()
        };
        t.add_row(vec![
            Cell::new(c.id),
            Cell::new(message),
            Cell::new(c.author_id),
            Cell::new(parents.join(", ")),
            Cell::new(created),
        ]);
    }
    t
}

/// Plain-text listing of the graph, one level per block, top to bottom.
pub fn graph(model: &GraphModel) -> String {
    let Some(graph) = model.as_graph() else {
        return style::dim("(no commits yet)");
    };

    let mut nodes: Vec<_> = graph.nodes.iter().collect();
    nodes.sort_by_key(|n| (n.level, n.kind == NodeKind::BranchPointer, n.id.clone()));

    let mut out = String::new();
    for node in nodes {
        let indent = "  ".repeat(node.level);
        let label = node.label.replace('\n', " ");
        match node.kind {
            NodeKind::BranchPointer => {
                let head = graph
                    .head_of(&node.id)
                    .map(|h| format!("-> {}", h.id))
                    .unwrap_or_else(|| "(empty)".to_string());
                let _ = writeln!(out, "{}{} {}", indent, style::branch(&label), head);
            }
            NodeKind::Commit => {
                let parents: Vec<&str> = graph
                    .parents_of(&node.id)
                    .iter()
                    .map(|p| p.id.as_str())
                    .collect();
                let merge = if graph.is_merge_commit(&node.id) { " [merge]" } else { "" };
                let _ = writeln!(
                    out,
                    "{}{} {}{} {}",
                    indent,
                    node.id,
                    label,
                    merge,
                    style::dim(&format!("parents: {}", parents.join(", ")))
                );
            }
        }
    }
    out
}

/// Graphviz rendering of the model, using the model's colours.
pub fn dot(model: &GraphModel) -> String {
    let mut out = String::from("digraph commits {\n  rankdir=TB;\n");
    if let Some(graph) = model.as_graph() {
        write_dot_body(&mut out, graph);
    }
    out.push_str("}\n");
    out
}

fn write_dot_body(out: &mut String, graph: &CommitGraph) {
    for node in &graph.nodes {
        let shape = match node.kind {
            NodeKind::BranchPointer => "ellipse",
            NodeKind::Commit => "box",
        };
        let _ = writeln!(
            out,
            "  \"{}\" [label=\"{}\", shape={}, style=filled, fillcolor=\"{}\", color=\"{}\"];",
            escape(&node.id),
            escape(&node.label),
            shape,
            node.style.background,
            node.style.border,
        );
    }
    for edge in &graph.edges {
        let mut attrs = vec![format!("color=\"{}\"", edge.style.color)];
        if edge.style.dashed {
            attrs.push("style=dashed".into());
        }
        if edge.kind == EdgeKind::ParentLink(ParentKind::Merge) {
            attrs.push("penwidth=2".into());
        }
        if let Some(label) = &edge.label {
            attrs.push(format!("label=\"{}\"", escape(label)));
        }
        let _ = writeln!(
            out,
            "  \"{}\" -> \"{}\" [{}];",
            escape(&edge.from),
            escape(&edge.to),
            attrs.join(", ")
        );
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchview_core::graph::{GraphModelBuilder, RawEdge, RawGraph, RawId, RawNode};

    fn sample() -> GraphModel {
        let raw = RawGraph {
            nodes: Some(vec![
                RawNode {
                    id: RawId::Number(1),
                    label: Some("say \"hi\"".into()),
                    branch: None,
                    shape: None,
                },
                RawNode {
                    id: "branch-1".into(),
                    label: Some("main".into()),
                    branch: None,
                    shape: Some("ellipse".into()),
                },
            ]),
            edges: Some(vec![RawEdge {
                from: "branch-1".into(),
                to: RawId::Number(1),
                label: Some("main".into()),
                dashes: None,
            }]),
            error: None,
        };
        GraphModelBuilder::build(&raw)
    }

    #[test]
    fn test_dot_output() {
        let dot = dot(&sample());
        assert!(dot.starts_with("digraph commits {"));
        assert!(dot.contains("\"branch-1\" -> \"1\""));
        assert!(dot.contains("shape=ellipse"));
        assert!(dot.contains("say \\\"hi\\\""));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_empty_graph_placeholder() {
        assert!(graph(&GraphModel::Empty).contains("no commits"));
        assert_eq!(dot(&GraphModel::Empty), "digraph commits {\n  rankdir=TB;\n}\n");
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a\nb"), "a\\nb");
        assert_eq!(escape("\\"), "\\\\");
    }
}
