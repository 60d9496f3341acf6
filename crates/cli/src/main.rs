//! Chronicle command-line management tool.
//!
//! Provides subcommands for committing and inspecting campaign versions,
//! managing branches and merge requests, resolving merge conflicts, viewing
//! the audit log, and generating / validating configuration files.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use console::Style;
use dialoguer::Select;
use tracing_subscriber::EnvFilter;

use chronicle_core::config::{self, AppConfig};
use chronicle_core::models::{
    BranchType, ConflictResolution, MergeRequest, MergeRequestStatus, ResolutionData,
    ResolutionInput, VersionType,
};
use chronicle_core::{Chronicle, NewBranch, NewMergeRequest, NewVersion};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Chronicle command-line management tool.
#[derive(Parser, Debug)]
#[command(
    name = "chronicle",
    version,
    about = "Manage and inspect a Chronicle campaign version store"
)]
struct Cli {
    /// Path to the TOML configuration file. Defaults to the per-user
    /// config location.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a configuration file.
    Validate,

    /// Show a campaign summary.
    Status {
        /// Campaign to summarize.
        #[arg(long)]
        campaign: String,
    },

    /// Commit a content snapshot from a JSON file.
    Commit {
        /// Path to the JSON content file.
        file: PathBuf,

        /// Campaign the version belongs to.
        #[arg(long)]
        campaign: String,

        /// Branch receiving the commit; defaults to the configured branch.
        #[arg(short, long)]
        branch: Option<String>,

        /// Version title.
        #[arg(short, long)]
        title: String,

        /// Commit message.
        #[arg(short, long)]
        message: String,

        /// Author; defaults to the configured default author.
        #[arg(short, long, default_value = "")]
        author: String,

        /// Version type: skeleton, draft, published, or played.
        #[arg(long, default_value = "draft")]
        r#type: String,

        /// Optional one-line summary.
        #[arg(long)]
        summary: Option<String>,
    },

    /// Show branch history, newest first.
    Log {
        /// Campaign to inspect.
        #[arg(long)]
        campaign: String,

        /// Branch to walk; defaults to the configured branch.
        #[arg(short, long)]
        branch: Option<String>,

        /// Maximum number of versions; defaults to the configured limit.
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Show one version in full.
    Show {
        /// Version hash.
        hash: String,

        /// Print the full content tree as JSON.
        #[arg(long)]
        content: bool,
    },

    /// Manage branches.
    Branch {
        #[command(subcommand)]
        action: BranchAction,
    },

    /// Manage merge requests.
    Mr {
        #[command(subcommand)]
        action: MrAction,
    },

    /// Manage merge conflicts.
    Conflicts {
        #[command(subcommand)]
        action: ConflictsAction,
    },

    /// Merge a reviewed merge request into its target branch.
    Merge {
        /// Merge request ID.
        id: String,

        /// Strategy: auto, manual, or cherry_pick.
        #[arg(short, long, default_value = "auto")]
        strategy: String,

        /// Merge commit message.
        #[arg(short, long, default_value = "")]
        message: String,

        /// Author recorded on the merge commit.
        #[arg(short, long, default_value = "")]
        author: String,

        /// JSON file with per-path choices (manual) or paths (cherry_pick).
        #[arg(long)]
        resolutions: Option<PathBuf>,
    },

    /// Show recent audit log entries.
    Audit {
        /// Maximum number of entries to show.
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

#[derive(Subcommand, Debug)]
enum BranchAction {
    /// Fork a new branch from an existing version.
    Create {
        /// Branch name.
        name: String,

        /// Campaign the branch belongs to.
        #[arg(long)]
        campaign: String,

        /// Version hash the branch starts from.
        #[arg(long)]
        start_point: String,

        /// Branch type: alternate, player_choice, experimental, or parallel.
        #[arg(long, default_value = "alternate")]
        r#type: String,

        /// Optional description.
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List a campaign's branches.
    List {
        /// Campaign to inspect.
        #[arg(long)]
        campaign: String,
    },
}

#[derive(Subcommand, Debug)]
enum MrAction {
    /// Open a merge request between two branches.
    Create {
        /// Campaign both branches belong to.
        #[arg(long)]
        campaign: String,

        /// Branch whose changes are proposed.
        #[arg(long)]
        source: String,

        /// Branch that receives them.
        #[arg(long)]
        target: String,

        /// Merge request title.
        #[arg(short, long)]
        title: String,

        /// Optional description.
        #[arg(short, long)]
        description: Option<String>,

        /// Author; defaults to the configured default author.
        #[arg(short, long, default_value = "")]
        author: String,

        /// Reviewer; repeat for more than one.
        #[arg(short, long)]
        reviewer: Vec<String>,
    },

    /// List merge requests for a campaign.
    List {
        /// Campaign to inspect.
        #[arg(long)]
        campaign: String,

        /// Filter by status: open, conflicts, merged, closed.
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show one merge request with its conflicts.
    Show {
        /// Merge request ID.
        id: String,
    },

    /// Close a merge request without merging.
    Close {
        /// Merge request ID.
        id: String,

        /// Who is closing it.
        #[arg(long, default_value = "cli")]
        by: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConflictsAction {
    /// List conflicts recorded for a merge request.
    List {
        /// Merge request ID.
        #[arg(long = "mr")]
        merge_request: String,

        /// Show only unresolved conflicts.
        #[arg(short, long)]
        unresolved: bool,
    },

    /// Show details of a specific conflict.
    Show {
        /// Conflict ID.
        id: String,
    },

    /// Resolve conflicts, interactively unless --id is given.
    Resolve {
        /// Merge request ID.
        #[arg(long = "mr")]
        merge_request: String,

        /// Who is resolving.
        #[arg(long, default_value = "cli")]
        by: String,

        /// Resolve a single conflict non-interactively.
        #[arg(long, requires = "accept")]
        id: Option<String>,

        /// Resolution for --id: take_source, take_target, or merge.
        #[arg(long, requires = "id")]
        accept: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    // Minimal logging for CLI; RUST_LOG overrides.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);

    match cli.command {
        Commands::Init { output } => cmd_init(output),
        Commands::Validate => cmd_validate(&config_path),
        _ => {
            // All other commands need the config and an open engine
            let config = load_config(&config_path)?;
            let engine = Chronicle::open(config).context("failed to open engine")?;

            match cli.command {
                Commands::Status { campaign } => cmd_status(&engine, &campaign),
                Commands::Commit {
                    file,
                    campaign,
                    branch,
                    title,
                    message,
                    author,
                    r#type,
                    summary,
                } => cmd_commit(
                    &engine, &file, &campaign, branch, &title, &message, &author, &r#type, summary,
                ),
                Commands::Log {
                    campaign,
                    branch,
                    limit,
                } => cmd_log(&engine, &campaign, branch.as_deref(), limit),
                Commands::Show { hash, content } => cmd_show(&engine, &hash, content),
                Commands::Branch { action } => cmd_branch(&engine, action),
                Commands::Mr { action } => cmd_mr(&engine, action),
                Commands::Conflicts { action } => cmd_conflicts(&engine, action),
                Commands::Merge {
                    id,
                    strategy,
                    message,
                    author,
                    resolutions,
                } => cmd_merge(&engine, &id, &strategy, &message, &author, resolutions),
                Commands::Audit { limit } => cmd_audit(&engine, limit),
                _ => unreachable!(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &PathBuf) -> Result<AppConfig> {
    let mut config =
        AppConfig::load_from_file(path).context("failed to load configuration file")?;
    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(config::default_config_path);

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("failed to create config directory")?;
        }
    }
    std::fs::write(&output, config::sample_config()).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the config file with your storage path and defaults");
    println!("  2. Set any environment variables referenced under [events]");
    println!(
        "  3. Validate with: chronicle validate --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &PathBuf) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;

    // Check structure
    println!("  [OK] TOML structure is valid");

    // Resolve env vars (non-fatal warnings)
    let _ = config.resolve_env_vars();
    println!("  [OK] Environment variable references processed");

    // Validate values
    match config.validate() {
        Ok(()) => {
            println!("  [OK] All required fields are valid");
        }
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    // The database file need not exist yet, but its directory must.
    if let Some(dir) = config.storage.db_path.parent() {
        if dir.as_os_str().is_empty() || dir.exists() {
            println!("  [OK] Database directory exists");
        } else {
            println!(
                "  [WARN] Database directory does not exist yet: {}",
                dir.display()
            );
        }
    }

    // A webhook env var that is named but unset delivers nothing.
    if let Some(ref env_name) = config.events.webhook_url_env {
        if config.events.webhook_url.is_some() {
            println!("  [OK] Webhook URL resolved from {}", env_name);
        } else {
            println!("  [WARN] Webhook env var {} is not set", env_name);
        }
    }

    // Summary
    println!();
    println!("Configuration summary:");
    println!("  Database path : {}", config.storage.db_path.display());
    println!("  Log level     : {}", config.storage.log_level);
    println!("  Default branch: {}", config.engine.default_branch);
    println!(
        "  Default author: {}",
        config.engine.default_author.as_deref().unwrap_or("(none)")
    );
    println!("  History limit : {}", config.engine.history_limit);
    println!(
        "  Webhook URL   : {}",
        if config.events.webhook_url.is_some() {
            "set"
        } else {
            "not set"
        }
    );
    println!(
        "  Webhook secret: {}",
        if config.events.webhook_secret.is_some() {
            "set"
        } else {
            "not set"
        }
    );
    println!("  Event timeout : {}s", config.events.timeout_secs);
    println!();
    println!("Configuration is valid.");

    Ok(())
}

fn cmd_status(engine: &Chronicle, campaign: &str) -> Result<()> {
    let status = engine
        .campaign_status(campaign)
        .context("failed to read campaign status")?;

    println!();
    println!("{}", header(&format!("Campaign: {}", status.campaign_id)));
    println!();
    println!("  Versions             : {}", status.version_count);
    println!("  Branches             : {}", status.branch_count);
    println!("  Open merge requests  : {}", status.open_merge_requests);
    println!("  Unresolved conflicts : {}", status.unresolved_conflicts);

    if status.branches.is_empty() {
        println!();
        println!("No branches yet.");
        return Ok(());
    }

    println!();
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Name", "Type", "Head", "Merged", "Updated"]);

    for branch in &status.branches {
        table.add_row(vec![
            Cell::new(&branch.name),
            Cell::new(branch.branch_type.to_string()),
            Cell::new(short(&branch.head)),
            Cell::new(if branch.is_merged { "yes" } else { "no" }),
            Cell::new(branch.updated_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!("{}", table);
    println!();

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_commit(
    engine: &Chronicle,
    file: &PathBuf,
    campaign: &str,
    branch: Option<String>,
    title: &str,
    message: &str,
    author: &str,
    type_str: &str,
    summary: Option<String>,
) -> Result<()> {
    let version_type = match type_str {
        "skeleton" => VersionType::Skeleton,
        "draft" => VersionType::Draft,
        "published" => VersionType::Published,
        "played" => VersionType::Played,
        other => anyhow::bail!(
            "invalid version type '{}': use skeleton, draft, published, or played",
            other
        ),
    };

    let raw = std::fs::read_to_string(file).context("failed to read content file")?;
    let content: serde_json::Value =
        serde_json::from_str(&raw).context("content file is not valid JSON")?;

    let version = engine
        .create_version(NewVersion {
            campaign_id: campaign.to_string(),
            content,
            title: title.to_string(),
            commit_message: message.to_string(),
            author: author.to_string(),
            version_type,
            branch_name: branch,
            parent_hashes: Vec::new(),
            summary,
            metadata: serde_json::Value::Null,
        })
        .context("failed to create version")?;

    println!(
        "{}",
        success(&format!(
            "Committed {} to branch '{}'",
            short(&version.hash),
            version.branch_name
        ))
    );
    println!("  Hash   : {}", version.hash);
    println!("  Title  : {}", version.title);
    println!("  Author : {}", version.author);

    Ok(())
}

fn cmd_log(
    engine: &Chronicle,
    campaign: &str,
    branch: Option<&str>,
    limit: Option<u32>,
) -> Result<()> {
    let limit = limit.unwrap_or(engine.config().engine.history_limit);
    let versions = engine
        .get_version_history(campaign, branch, Some(limit as usize))
        .context("failed to read history")?;

    if versions.is_empty() {
        println!("No versions found.");
        return Ok(());
    }

    println!(
        "{:<14} {:<11} {:<16} {:<18} TITLE",
        "HASH", "TYPE", "AUTHOR", "CREATED"
    );
    println!("{}", "-".repeat(90));

    for v in &versions {
        println!(
            "{:<14} {:<11} {:<16} {:<18} {}",
            short(&v.hash),
            v.version_type.to_string(),
            truncate(&v.author, 14),
            v.created_at.format("%Y-%m-%d %H:%M").to_string(),
            truncate(&v.title, 40),
        );
    }

    println!();
    println!("{} version(s) shown", versions.len());

    Ok(())
}

fn cmd_show(engine: &Chronicle, hash: &str, show_content: bool) -> Result<()> {
    let version = engine.get_version(hash).context("failed to load version")?;

    println!("Version: {}", version.hash);
    println!("========{}", "=".repeat(version.hash.len() + 1));
    println!();
    println!("  Campaign : {}", version.campaign_id);
    println!("  Branch   : {}", version.branch_name);
    println!("  Type     : {}", version.version_type);
    println!("  Author   : {}", version.author);
    println!("  Title    : {}", version.title);
    println!("  Message  : {}", version.commit_message);
    if let Some(ref summary) = version.summary {
        println!("  Summary  : {}", summary);
    }
    println!(
        "  Parents  : {}",
        if version.parent_hashes.is_empty() {
            "(root)".to_string()
        } else {
            version
                .parent_hashes
                .iter()
                .map(|h| short(h))
                .collect::<Vec<_>>()
                .join(", ")
        }
    );
    println!("  Created  : {}", version.created_at.to_rfc3339());

    if show_content {
        println!();
        println!("Content:");
        println!("{}", "-".repeat(40));
        println!(
            "{}",
            serde_json::to_string_pretty(&version.content).context("failed to render content")?
        );
    }

    Ok(())
}

fn cmd_branch(engine: &Chronicle, action: BranchAction) -> Result<()> {
    match action {
        BranchAction::Create {
            name,
            campaign,
            start_point,
            r#type,
            description,
        } => {
            let branch_type = match r#type.as_str() {
                "alternate" => BranchType::Alternate,
                "player_choice" => BranchType::PlayerChoice,
                "experimental" => BranchType::Experimental,
                "parallel" => BranchType::Parallel,
                other => anyhow::bail!(
                    "invalid branch type '{}': use alternate, player_choice, \
                     experimental, or parallel",
                    other
                ),
            };

            let branch = engine
                .create_branch(NewBranch {
                    campaign_id: campaign,
                    name,
                    start_point,
                    branch_type,
                    description,
                    metadata: serde_json::Value::Null,
                })
                .context("failed to create branch")?;

            println!(
                "{}",
                success(&format!(
                    "Branch '{}' created at {}",
                    branch.name,
                    short(&branch.head)
                ))
            );
            Ok(())
        }

        BranchAction::List { campaign } => {
            let branches = engine
                .list_branches(&campaign)
                .context("failed to list branches")?;

            if branches.is_empty() {
                println!("No branches found.");
                return Ok(());
            }

            println!();
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Name", "Type", "Head", "Base", "Merged", "Created"]);

            for branch in &branches {
                table.add_row(vec![
                    Cell::new(&branch.name),
                    Cell::new(branch.branch_type.to_string()),
                    Cell::new(short(&branch.head)),
                    Cell::new(
                        branch
                            .base
                            .as_deref()
                            .map(short)
                            .unwrap_or_else(|| "-".to_string()),
                    ),
                    Cell::new(if branch.is_merged { "yes" } else { "no" }),
                    Cell::new(branch.created_at.format("%Y-%m-%d").to_string()),
                ]);
            }

            println!("{}", table);
            println!();
            println!("{} branch(es) shown", branches.len());

            Ok(())
        }
    }
}

fn cmd_mr(engine: &Chronicle, action: MrAction) -> Result<()> {
    match action {
        MrAction::Create {
            campaign,
            source,
            target,
            title,
            description,
            author,
            reviewer,
        } => {
            let request = engine
                .create_merge_request(NewMergeRequest {
                    campaign_id: campaign,
                    source_branch: source,
                    target_branch: target,
                    title,
                    description,
                    author,
                    reviewers: reviewer,
                    metadata: serde_json::Value::Null,
                })
                .context("failed to create merge request")?;

            print_merge_request(&request);
            if request.status == MergeRequestStatus::Conflicts {
                println!();
                println!(
                    "Conflicts detected. Inspect with: chronicle conflicts list --mr {}",
                    request.id
                );
            }
            Ok(())
        }

        MrAction::List { campaign, status } => {
            let status = match status.as_deref() {
                None => None,
                Some("open") => Some(MergeRequestStatus::Open),
                Some("conflicts") => Some(MergeRequestStatus::Conflicts),
                Some("merged") => Some(MergeRequestStatus::Merged),
                Some("closed") => Some(MergeRequestStatus::Closed),
                Some(other) => anyhow::bail!(
                    "invalid status '{}': use open, conflicts, merged, or closed",
                    other
                ),
            };

            let requests = engine
                .list_merge_requests(&campaign, status)
                .context("failed to list merge requests")?;

            if requests.is_empty() {
                println!("No merge requests found.");
                return Ok(());
            }

            println!();
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["ID", "Status", "Source", "Target", "Title", "Author"]);

            for request in &requests {
                table.add_row(vec![
                    Cell::new(short(&request.id)),
                    Cell::new(request.status.to_string()),
                    Cell::new(&request.source_branch),
                    Cell::new(&request.target_branch),
                    Cell::new(truncate(&request.title, 32)),
                    Cell::new(&request.author),
                ]);
            }

            println!("{}", table);
            println!();
            println!("{} merge request(s) shown", requests.len());

            Ok(())
        }

        MrAction::Show { id } => {
            let request = engine
                .get_merge_request(&id)
                .context("failed to load merge request")?;

            print_merge_request(&request);

            let conflicts = engine
                .list_conflicts(&id, false)
                .context("failed to list conflicts")?;

            if conflicts.is_empty() {
                return Ok(());
            }

            println!();
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["ID", "Path", "Type", "Resolution", "By"]);

            for conflict in &conflicts {
                table.add_row(vec![
                    Cell::new(short(&conflict.id)),
                    Cell::new(&conflict.path),
                    Cell::new(conflict.conflict_type.to_string()),
                    Cell::new(
                        conflict
                            .resolution
                            .map(|r| r.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                    ),
                    Cell::new(conflict.resolved_by.as_deref().unwrap_or("-")),
                ]);
            }

            println!("{}", table);

            Ok(())
        }

        MrAction::Close { id, by } => {
            let request = engine
                .close_merge_request(&id, &by)
                .context("failed to close merge request")?;

            println!(
                "{}",
                success(&format!("Merge request {} closed", short(&request.id)))
            );
            Ok(())
        }
    }
}

fn cmd_conflicts(engine: &Chronicle, action: ConflictsAction) -> Result<()> {
    match action {
        ConflictsAction::List {
            merge_request,
            unresolved,
        } => {
            let conflicts = engine
                .list_conflicts(&merge_request, unresolved)
                .context("failed to list conflicts")?;

            if conflicts.is_empty() {
                println!("{}", success("No conflicts found"));
                return Ok(());
            }

            println!();
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["ID", "Path", "Type", "Source", "Target", "Resolution"]);

            for conflict in &conflicts {
                table.add_row(vec![
                    Cell::new(short(&conflict.id)),
                    Cell::new(&conflict.path),
                    Cell::new(conflict.conflict_type.to_string()),
                    Cell::new(truncate(&conflict.source_value, 24)),
                    Cell::new(truncate(&conflict.target_value, 24)),
                    Cell::new(
                        conflict
                            .resolution
                            .map(|r| r.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                    ),
                ]);
            }

            println!("{}", table);
            println!();
            println!("{} conflict(s) shown", conflicts.len());

            Ok(())
        }

        ConflictsAction::Show { id } => {
            let conflict = engine.get_conflict(&id).context("failed to load conflict")?;

            println!("Conflict: {}", conflict.id);
            println!("========={}", "=".repeat(conflict.id.len() + 1));
            println!();
            println!("  Merge request : {}", conflict.merge_request_id);
            println!("  Path          : {}", conflict.path);
            println!("  Field         : {}", conflict.field);
            println!("  Entity type   : {}", conflict.entity_type);
            println!("  Type          : {}", conflict.conflict_type);
            println!(
                "  Options       : {}",
                conflict
                    .resolution_options
                    .iter()
                    .map(|o| o.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            if let Some(resolution) = conflict.resolution {
                println!("  Resolution    : {}", resolution);
                println!(
                    "  Resolved by   : {}",
                    conflict.resolved_by.as_deref().unwrap_or("-")
                );
                if let Some(resolved_at) = conflict.resolved_at {
                    println!("  Resolved at   : {}", resolved_at.to_rfc3339());
                }
            }

            // Multi-line text reads better as a unified diff.
            if conflict.source_value.contains('\n') || conflict.target_value.contains('\n') {
                println!();
                println!("Diff (target -> source):");
                println!("{}", "-".repeat(40));
                let patch = diffy::create_patch(&conflict.target_value, &conflict.source_value);
                let formatter = diffy::PatchFormatter::new().with_color();
                print!("{}", formatter.fmt_patch(&patch));
            } else {
                println!();
                println!("  Source value  : {}", conflict.source_value);
                println!("  Target value  : {}", conflict.target_value);
            }

            Ok(())
        }

        ConflictsAction::Resolve {
            merge_request,
            by,
            id,
            accept,
        } => {
            let resolutions = match (id, accept) {
                (Some(id), Some(accept)) => {
                    let resolution =
                        ConflictResolution::from_str_val(&accept).ok_or_else(|| {
                            anyhow::anyhow!(
                                "invalid resolution '{}': use take_source, take_target, or merge",
                                accept
                            )
                        })?;
                    let mut map = BTreeMap::new();
                    map.insert(
                        id,
                        ResolutionInput {
                            resolution,
                            resolved_by: by.clone(),
                            data: None,
                        },
                    );
                    map
                }
                _ => prompt_resolutions(engine, &merge_request, &by)?,
            };

            if resolutions.is_empty() {
                println!("Nothing resolved.");
                return Ok(());
            }

            let updated = engine
                .resolve_conflicts(&merge_request, &resolutions)
                .context("failed to resolve conflicts")?;
            let request = engine
                .get_merge_request(&merge_request)
                .context("failed to reload merge request")?;

            println!();
            println!(
                "{}",
                success(&format!(
                    "{} conflict(s) resolved; merge request is now {}",
                    updated.len(),
                    request.status
                ))
            );
            Ok(())
        }
    }
}

/// Walk the unresolved conflicts one by one, asking for a resolution each.
fn prompt_resolutions(
    engine: &Chronicle,
    merge_request: &str,
    by: &str,
) -> Result<BTreeMap<String, ResolutionInput>> {
    let unresolved = engine
        .list_conflicts(merge_request, true)
        .context("failed to list conflicts")?;

    if unresolved.is_empty() {
        return Ok(BTreeMap::new());
    }

    println!();
    println!(
        "{}",
        header(&format!("{} unresolved conflict(s)", unresolved.len()))
    );

    let mut resolutions = BTreeMap::new();

    for conflict in &unresolved {
        println!();
        println!("{}", header(&format!("Conflict at {}", conflict.path)));
        println!("  Type   : {}", conflict.conflict_type);
        println!("  Source : {}", truncate(&conflict.source_value, 60));
        println!("  Target : {}", truncate(&conflict.target_value, 60));

        let options: Vec<String> = conflict
            .resolution_options
            .iter()
            .map(|o| o.to_string())
            .collect();
        let mut items = options.clone();
        items.push("skip".to_string());

        let pick = Select::new()
            .with_prompt("Resolution")
            .items(&items)
            .default(0)
            .interact()
            .context("failed to read selection")?;

        if pick >= options.len() {
            println!("{}", dim("  skipped"));
            continue;
        }

        if let Some(resolution) = ConflictResolution::from_str_val(&options[pick]) {
            resolutions.insert(
                conflict.id.clone(),
                ResolutionInput {
                    resolution,
                    resolved_by: by.to_string(),
                    data: None,
                },
            );
        }
    }

    Ok(resolutions)
}

fn cmd_merge(
    engine: &Chronicle,
    id: &str,
    strategy: &str,
    message: &str,
    author: &str,
    resolutions: Option<PathBuf>,
) -> Result<()> {
    let resolution_data = match resolutions {
        Some(path) => {
            let raw = std::fs::read_to_string(&path).context("failed to read resolutions file")?;
            let data: ResolutionData =
                serde_json::from_str(&raw).context("resolutions file is not valid JSON")?;
            Some(data)
        }
        None => None,
    };

    let merge_commit = engine
        .merge_branches(id, strategy, message, author, resolution_data)
        .context("merge failed")?;

    println!("{}", success("Branches merged"));
    println!("  Merge commit : {}", merge_commit.hash);
    println!("  Target branch: {}", merge_commit.branch_name);
    println!(
        "  Parents      : {}",
        merge_commit
            .parent_hashes
            .iter()
            .map(|h| short(h))
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(())
}

fn cmd_audit(engine: &Chronicle, limit: u32) -> Result<()> {
    let entries = engine
        .recent_audit(limit)
        .context("failed to list audit entries")?;

    if entries.is_empty() {
        println!("No audit log entries found.");
        return Ok(());
    }

    println!(
        "{:<18} {:<22} {:<14} DETAILS",
        "TIMESTAMP", "ACTION", "ACTOR"
    );
    println!("{}", "-".repeat(90));

    for entry in &entries {
        println!(
            "{:<18} {:<22} {:<14} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            entry.action,
            truncate(&entry.actor, 12),
            truncate(&entry.details, 40),
        );
    }

    println!();
    println!("{} entries shown", entries.len());

    Ok(())
}

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn print_merge_request(request: &MergeRequest) {
    println!("Merge request: {}", request.id);
    println!("=============={}", "=".repeat(request.id.len() + 1));
    println!();
    println!("  Campaign : {}", request.campaign_id);
    println!("  Status   : {}", request.status);
    println!(
        "  Branches : {} -> {}",
        request.source_branch, request.target_branch
    );
    println!("  Title    : {}", request.title);
    if let Some(ref description) = request.description {
        println!("  About    : {}", description);
    }
    println!("  Author   : {}", request.author);
    if !request.reviewers.is_empty() {
        println!("  Reviewers: {}", request.reviewers.join(", "));
    }
    if let Some(ref merged_by) = request.merged_by {
        println!("  Merged by: {}", merged_by);
    }
    if let Some(ref hash) = request.merge_commit_hash {
        println!("  Commit   : {}", hash);
    }
    println!("  Created  : {}", request.created_at.to_rfc3339());
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

/// Abbreviate a hash or ID for column display.
fn short(s: &str) -> String {
    if s.len() > 12 {
        s[..12].to_string()
    } else {
        s.to_string()
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut cut = max_len.saturating_sub(3);
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &s[..cut])
    }
}

fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_short_strings() {
        assert_eq!(truncate("Goblin ambush", 20), "Goblin ambush");
        assert_eq!(truncate("exact", 5), "exact");
    }

    #[test]
    fn test_truncate_cuts_long_ascii() {
        assert_eq!(truncate("The Sunless Citadel, Session 12", 20), "The Sunless Citad...");
    }

    #[test]
    fn test_truncate_backs_up_to_char_boundary() {
        // The two-byte é spans bytes 20-21, exactly where a 24-column cut lands.
        let title = format!("{}éclair", "x".repeat(20));
        assert_eq!(truncate(&title, 24), format!("{}...", "x".repeat(20)));
    }

    #[test]
    fn test_truncate_handles_multibyte_at_every_width() {
        let title = "Château d'Ombre: the Siège of Éclat";
        for width in 0..title.len() {
            assert!(truncate(title, width).ends_with("..."));
        }
    }
}
