//! branchview command-line client.
//!
//! Browse identities, repositories and branches of a version-control
//! service, view file content, history and the commit graph, commit edits,
//! and merge branches with interactive conflict resolution. The selection is
//! persisted between invocations.

mod conflict;
mod render;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::Editor;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use branchview_core::config::ClientConfig;
use branchview_core::merge::{MergeOutcome, MergeWorkflowCoordinator};
use branchview_core::models::ActiveView;
use branchview_core::navigation::{NavigationController, ViewData};
use branchview_core::{HttpGateway, SessionStore};

use conflict::ResolveChoice;

type Navigator = NavigationController<HttpGateway>;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "branchview",
    version,
    about = "Browse, edit and merge branches of a version-control service"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the current selection.
    Status,

    /// List, create or select identities.
    Identity {
        #[command(subcommand)]
        action: ListAction,
    },

    /// List, create or select repositories of the current identity.
    Repo {
        #[command(subcommand)]
        action: ListAction,
    },

    /// List, create, select or reset branches of the current repository.
    Branch {
        #[command(subcommand)]
        action: BranchAction,
    },

    /// Print the file content of the current branch.
    File,

    /// Show the commit history of the current repository.
    Log,

    /// Show the commit graph of the current repository.
    Graph {
        /// Emit Graphviz DOT instead of a text listing.
        #[arg(long)]
        dot: bool,
    },

    /// Commit new file content to the current branch.
    Commit {
        /// Commit message.
        #[arg(short, long)]
        message: String,

        /// Read the new content from a file instead of opening $EDITOR.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Merge SOURCE into TARGET (branch names or ids).
    Merge {
        source: String,
        target: String,

        /// Resolve a conflict without prompting.
        #[arg(long, value_enum)]
        resolve: Option<ResolveChoice>,
    },
}

#[derive(Subcommand, Debug)]
enum ListAction {
    /// List all entries.
    List,
    /// Create a new entry.
    Create { name: String },
    /// Select an entry by name or id.
    Use { key: String },
}

#[derive(Subcommand, Debug)]
enum BranchAction {
    /// List branches.
    List,
    /// Create a branch.
    Create { name: String },
    /// Select a branch by name or id.
    Use { key: String },
    /// Point the current branch at another commit.
    Reset { commit_id: i64 },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = match ClientConfig::load_and_resolve(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("branchview").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("branchview.toml"))
}

async fn run(command: Commands, config: &ClientConfig) -> Result<()> {
    let nav = connect(config).await?;

    match command {
        Commands::Status => cmd_status(&nav, config),
        Commands::Identity { action } => cmd_identity(&nav, action).await,
        Commands::Repo { action } => cmd_repo(&nav, action).await,
        Commands::Branch { action } => cmd_branch(&nav, action).await,
        Commands::File => cmd_file(&nav).await,
        Commands::Log => cmd_log(&nav).await,
        Commands::Graph { dot } => cmd_graph(&nav, dot).await,
        Commands::Commit { message, file } => cmd_commit(&nav, &message, file.as_deref()).await,
        Commands::Merge {
            source,
            target,
            resolve,
        } => cmd_merge(nav, &source, &target, resolve).await,
    }
}

/// Build the gateway and controller and replay the persisted selection.
async fn connect(config: &ClientConfig) -> Result<Arc<Navigator>> {
    let gateway = Arc::new(
        HttpGateway::from_config(&config.service).context("failed to create HTTP client")?,
    );
    let session = match SessionStore::open(&config.session) {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "session store unavailable, selection will not persist");
            SessionStore::in_memory().context("failed to create in-memory session")?
        }
    };
    let nav = Arc::new(NavigationController::new(gateway, session));
    nav.restore()
        .await
        .with_context(|| format!("failed to reach service at {}", config.service.base_url))?;
    Ok(nav)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_status(nav: &Navigator, config: &ClientConfig) -> Result<()> {
    let selection = nav.selection();
    let none = || style::dim("(none)");

    println!();
    println!("{}", style::header("branchview"));
    println!();
    println!("  Service    {}", config.service.base_url);
    println!(
        "  Identity   {}",
        selection
            .identity
            .as_ref()
            .map(|i| format!("{} (id {})", i.display_name, i.id))
            .unwrap_or_else(none)
    );
    println!(
        "  Repository {}",
        selection
            .repository
            .as_ref()
            .map(|r| format!("{} (id {})", r.name, r.id))
            .unwrap_or_else(none)
    );
    println!(
        "  Branch     {}",
        selection
            .branch
            .as_ref()
            .map(|b| {
                let head = b
                    .head_commit_id
                    .map(style::commit_id)
                    .unwrap_or_else(|| "empty".to_string());
                format!("{} (id {}, head {})", style::branch(&b.name), b.id, head)
            })
            .unwrap_or_else(none)
    );
    println!();
    Ok(())
}

async fn cmd_identity(nav: &Navigator, action: ListAction) -> Result<()> {
    match action {
        ListAction::List => {
            let state = nav.snapshot();
            if state.identities.is_empty() {
                println!("No identities found.");
                return Ok(());
            }
            let selected = state.selection.identity.as_ref().map(|i| i.id);
            println!("{}", render::identities(&state.identities, selected));
        }
        ListAction::Create { name } => {
            let identity = nav
                .create_identity(&name)
                .await
                .context("failed to create identity")?;
            let created = format!(
                "Created identity {} (id {})",
                identity.display_name, identity.id
            );
            println!("{}", style::success(&created));
        }
        ListAction::Use { key } => {
            let id = {
                let state = nav.snapshot();
                pick(&state.identities, &key, |i| i.id, |i| i.display_name.as_str(), "identity")?.id
            };
            nav.select_identity(Some(id))
                .await
                .context("failed to select identity")?;
            println!("{}", style::success(&format!("Using identity {}", key)));
        }
    }
    Ok(())
}

async fn cmd_repo(nav: &Navigator, action: ListAction) -> Result<()> {
    match action {
        ListAction::List => {
            let state = nav.snapshot();
            if state.selection.identity.is_none() {
                anyhow::bail!("no identity selected; run 'branchview identity use <name>'");
            }
            if state.repositories.is_empty() {
                println!("No repositories found.");
                return Ok(());
            }
            let selected = state.selection.repository.as_ref().map(|r| r.id);
            println!("{}", render::repositories(&state.repositories, selected));
        }
        ListAction::Create { name } => {
            let repository = nav
                .create_repository(&name)
                .await
                .context("failed to create repository")?;
            let created = format!("Created repository {} (id {})", repository.name, repository.id);
            println!("{}", style::success(&created));
        }
        ListAction::Use { key } => {
            let repository = {
                let state = nav.snapshot();
                pick(&state.repositories, &key, |r| r.id, |r| r.name.as_str(), "repository")?
                    .clone()
            };
            nav.select_repository(Some(repository))
                .await
                .context("failed to select repository")?;
            let branch = nav
                .selection()
                .branch
                .map(|b| style::branch(&b.name))
                .unwrap_or_else(|| style::dim("no branches"));
            println!("{}", style::success(&format!("Using repository {} on {}", key, branch)));
        }
    }
    Ok(())
}

async fn cmd_branch(nav: &Navigator, action: BranchAction) -> Result<()> {
    match action {
        BranchAction::List => {
            let state = nav.snapshot();
            if state.selection.repository.is_none() {
                anyhow::bail!("no repository selected; run 'branchview repo use <name>'");
            }
            if state.branches.is_empty() {
                println!("No branches found.");
                return Ok(());
            }
            let selected = state.selection.branch.as_ref().map(|b| b.id);
            println!("{}", render::branches(&state.branches, selected));
        }
        BranchAction::Create { name } => {
            let branch = nav
                .create_branch(&name)
                .await
                .context("failed to create branch")?;
            println!(
                "{}",
                style::success(&format!("Created branch {} (id {})", branch.name, branch.id))
            );
        }
        BranchAction::Use { key } => {
            let branch = {
                let state = nav.snapshot();
                pick(&state.branches, &key, |b| b.id, |b| b.name.as_str(), "branch")?.clone()
            };
            nav.select_branch(Some(branch))
                .await
                .context("failed to select branch")?;
            println!("{}", style::success(&format!("Using branch {}", key)));
        }
        BranchAction::Reset { commit_id } => {
            let branch = nav
                .reset_branch(commit_id)
                .await
                .context("failed to reset branch")?;
            println!(
                "{}",
                style::success(&format!(
                    "Branch {} now points at {}",
                    branch.name,
                    style::commit_id(commit_id)
                ))
            );
        }
    }
    Ok(())
}

async fn cmd_file(nav: &Navigator) -> Result<()> {
    require_branch(nav)?;
    nav.set_active_view(ActiveView::File)
        .await
        .context("failed to load file")?;
    if let ViewData::File(content) = nav.snapshot().view {
        print!("{}", content);
        if !content.is_empty() && !content.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

async fn cmd_log(nav: &Navigator) -> Result<()> {
    require_branch(nav)?;
    nav.set_active_view(ActiveView::History)
        .await
        .context("failed to load history")?;
    match nav.snapshot().view {
        ViewData::History(commits) if commits.is_empty() => println!("No commits yet."),
        ViewData::History(commits) => println!("{}", render::history(&commits)),
        _ => {}
    }
    Ok(())
}

async fn cmd_graph(nav: &Navigator, dot: bool) -> Result<()> {
    require_branch(nav)?;
    nav.set_active_view(ActiveView::Graph)
        .await
        .context("failed to load graph")?;
    if let ViewData::Graph(model) = nav.snapshot().view {
        if dot {
            print!("{}", render::dot(&model));
        } else {
            print!("{}", render::graph(&model));
        }
    }
    Ok(())
}

async fn cmd_commit(nav: &Navigator, message: &str, file: Option<&Path>) -> Result<()> {
    require_branch(nav)?;
    let content = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let current = match nav.snapshot().view {
                ViewData::File(content) => content,
                _ => String::new(),
            };
            match Editor::new().edit(&current).context("failed to run editor")? {
                Some(edited) => edited,
                None => {
                    println!("{}", style::warn("Editor closed without saving; nothing committed."));
                    return Ok(());
                }
            }
        }
    };

    let receipt = nav
        .create_commit(message, &content)
        .await
        .context("failed to create commit")?;
    let id = receipt
        .commit
        .map(|c| style::commit_id(c.id))
        .unwrap_or_default();
    println!("{}", style::success(&format!("Committed {}", id).trim_end()));
    Ok(())
}

async fn cmd_merge(
    nav: Arc<Navigator>,
    source: &str,
    target: &str,
    resolve: Option<ResolveChoice>,
) -> Result<()> {
    let (source, target) = {
        let state = nav.snapshot();
        if state.selection.repository.is_none() {
            anyhow::bail!("no repository selected; run 'branchview repo use <name>'");
        }
        (
            pick(&state.branches, source, |b| b.id, |b| b.name.as_str(), "branch")?.clone(),
            pick(&state.branches, target, |b| b.id, |b| b.name.as_str(), "branch")?.clone(),
        )
    };

    let coordinator = MergeWorkflowCoordinator::new(Arc::clone(nav.gateway()), nav.clone());
    let attempt = coordinator
        .attempt_merge(source.id, target.id)
        .await
        .context("merge failed")?;

    let conflict = match attempt.outcome {
        MergeOutcome::Merged => {
            let detail = attempt.message.unwrap_or_else(|| "merged".to_string());
            println!(
                "{}",
                style::success(&format!("{} -> {}: {}", source.name, target.name, detail))
            );
            return Ok(());
        }
        MergeOutcome::Conflict(conflict) => conflict,
    };

    conflict::print_conflict(&conflict, &source.name, &target.name);
    let Some(resolution) = conflict::resolution(&conflict, resolve)? else {
        coordinator.cancel();
        println!("{}", style::warn("Merge cancelled; both branches are unchanged."));
        return Ok(());
    };

    let message = coordinator
        .resolve_conflict(resolution)
        .await
        .context("forced merge failed; the conflict is still unresolved")?;
    println!(
        "{}",
        style::success(&format!(
            "Conflict resolved: {}",
            message.unwrap_or_else(|| format!("{} merged into {}", source.name, target.name))
        ))
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

fn require_branch(nav: &Navigator) -> Result<()> {
    if nav.selection().branch.is_none() {
        anyhow::bail!("no branch selected; run 'branchview branch use <name>'");
    }
    Ok(())
}

/// Find an entry by numeric id first, then by exact name.
fn pick<'a, T>(
    items: &'a [T],
    key: &str,
    id: impl Fn(&T) -> i64,
    name: impl Fn(&T) -> &str,
    kind: &str,
) -> Result<&'a T> {
    if let Ok(wanted) = key.parse::<i64>() {
        if let Some(found) = items.iter().find(|item| id(item) == wanted) {
            return Ok(found);
        }
    }
    items
        .iter()
        .find(|item| name(item) == key)
        .ok_or_else(|| anyhow::anyhow!("{} '{}' not found", kind, key))
}
