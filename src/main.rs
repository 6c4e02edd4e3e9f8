//! # parley
//!
//! Command-line surface over saved sessions: inspect the message list,
//! check resource freshness, prune, report status, archive into `SQLite`.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use parley_context::{ContextStore, PruneReport, ResourceTracker};
use parley_core::{BehaviorLookup, Message};
use parley_engine::builder::context_config;
use parley_engine::tools::builtin_registry;
use parley_engine::ChatStatus;
use parley_settings::{get_settings, load_settings_from_path, parley_home, ParleySettings};
use parley_store::{Database, FileSessionStore, SessionSnapshot, SessionStore, SqliteSessionStore};
use parley_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "parley", about = "Inspect and maintain parley sessions")]
struct Cli {
    /// Settings file to use instead of ~/.parley/settings.json.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the message list of a saved session.
    Inspect { session: PathBuf },
    /// Print every resource in context with its freshness.
    Resources {
        session: PathBuf,
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Prune messages or parts and write the session back.
    Prune {
        session: PathBuf,
        /// Sequence id of a message to prune (repeatable).
        #[arg(long = "message")]
        messages: Vec<i64>,
        /// Part to prune as SEQ:INDEX (repeatable).
        #[arg(long = "part")]
        parts: Vec<String>,
        /// Age out ephemeral tool traffic.
        #[arg(long)]
        ephemeral: bool,
        /// Report without writing.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the status report of a saved session.
    Status { session: PathBuf },
    /// Copy a saved session into the `SQLite` store.
    Archive {
        session: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print the effective settings.
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = match &cli.settings {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => get_settings().clone(),
    };
    init_telemetry(&TelemetryConfig::from_settings(&settings.logging)?)?;

    match cli.command {
        Command::Inspect { session } => inspect(&settings, &session),
        Command::Resources { session, json } => resources(&settings, &session, json),
        Command::Prune {
            session,
            messages,
            parts,
            ephemeral,
            dry_run,
        } => prune(&settings, &session, &messages, &parts, ephemeral, dry_run),
        Command::Status { session } => status(&settings, &session),
        Command::Archive { session, db } => archive(&settings, &session, db),
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}

/// A saved session loaded into a context store that knows the built-in tools.
struct Loaded {
    snapshot: SessionSnapshot,
    context: ContextStore,
}

fn load(settings: &ParleySettings, path: &Path) -> Result<Loaded> {
    let snapshot = FileSessionStore::read_path(path)
        .with_context(|| format!("failed to read session {}", path.display()))?;
    let behaviors: Arc<dyn BehaviorLookup> = Arc::new(builtin_registry()?);
    let context = ContextStore::new(context_config(settings), behaviors);
    context.replace_all(snapshot.messages.clone());
    Ok(Loaded { snapshot, context })
}

fn describe(message: &Message) -> String {
    let kinds: Vec<String> = message
        .parts
        .iter()
        .map(|p| match p.tool_name() {
            Some(name) => format!("{}({name})", p.kind_label()),
            None => p.kind_label().to_string(),
        })
        .collect();
    let role = if message.is_feedback {
        "feedback".to_string()
    } else {
        format!("{:?}", message.role).to_lowercase()
    };
    let mut line = format!("#{:<4} {:<9} {}", message.sequence_id, role, kinds.join(", "));
    if !message.dependencies().is_empty() {
        line.push_str(&format!("  [{} links]", message.dependencies().len()));
    }
    if let Some(usage) = message.usage {
        line.push_str(&format!("  [{} tokens]", usage.total_tokens));
    }
    line
}

fn inspect(settings: &ParleySettings, path: &Path) -> Result<()> {
    let loaded = load(settings, path)?;
    println!(
        "session {} (saved {})",
        loaded.snapshot.session_id,
        loaded.snapshot.saved_at.to_rfc3339()
    );
    for message in loaded.context.snapshot() {
        println!("{}", describe(&message));
    }
    Ok(())
}

fn resources(settings: &ParleySettings, path: &Path, json: bool) -> Result<()> {
    let loaded = load(settings, path)?;
    let rows = loaded.context.resource_overview(&ResourceTracker::filesystem());
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("no resources in context");
    }
    for row in rows {
        println!(
            "{:<15} {:>10}B  {}",
            row.status.as_str(),
            row.resource.size_bytes,
            row.resource.resource_id
        );
    }
    Ok(())
}

/// Parse `SEQ:INDEX`.
fn parse_part_ref(raw: &str) -> Result<(i64, usize)> {
    let Some((seq, index)) = raw.split_once(':') else {
        bail!("part reference must be SEQ:INDEX, got {raw}");
    };
    Ok((
        seq.trim().parse().with_context(|| format!("bad sequence id in {raw}"))?,
        index.trim().parse().with_context(|| format!("bad part index in {raw}"))?,
    ))
}

fn prune(
    settings: &ParleySettings,
    path: &Path,
    messages: &[i64],
    parts: &[String],
    ephemeral: bool,
    dry_run: bool,
) -> Result<()> {
    if messages.is_empty() && parts.is_empty() && !ephemeral {
        bail!("nothing to prune: pass --message, --part or --ephemeral");
    }
    let loaded = load(settings, path)?;
    let mut total = PruneReport::default();
    let mut add = |report: PruneReport| {
        total.removed_parts += report.removed_parts;
        total.removed_messages += report.removed_messages;
        total.rewritten_maps += report.rewritten_maps;
    };

    // Every reference is resolved against the loaded context before anything
    // is removed; indices shift once parts go.
    let mut seeds = loaded.context.part_ids_of(messages);
    for raw in parts {
        let (seq, index) = parse_part_ref(raw)?;
        seeds.extend(loaded.context.resolve_parts(seq, &[index])?);
    }
    if !seeds.is_empty() {
        add(loaded.context.prune_by_reference(seeds, "cli"));
    }
    if ephemeral {
        add(loaded.context.prune_ephemeral_tool_calls());
    }

    println!(
        "removed {} parts, {} messages; rewrote {} dependency maps",
        total.removed_parts, total.removed_messages, total.rewritten_maps
    );
    if dry_run || !total.changed() {
        return Ok(());
    }
    let snapshot = SessionSnapshot::new(loaded.snapshot.session_id, loaded.context.snapshot());
    FileSessionStore::write_path(path, &snapshot)?;
    info!(path = %path.display(), "session written");
    Ok(())
}

fn status(settings: &ParleySettings, path: &Path) -> Result<()> {
    let loaded = load(settings, path)?;
    print!("{}", ChatStatus::new().report(&loaded.context));
    println!("messages:    {}", loaded.context.len());
    Ok(())
}

fn archive(settings: &ParleySettings, path: &Path, db: Option<PathBuf>) -> Result<()> {
    let loaded = load(settings, path)?;
    let db_path = db
        .or_else(|| settings.storage.sqlite_path.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| parley_home().join("sessions.db"));
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let store = SqliteSessionStore::new(Database::open(&db_path)?);
    store.save(&loaded.snapshot.session_id, &loaded.context.snapshot())?;
    println!("archived {} into {}", loaded.snapshot.session_id, db_path.display());
    Ok(())
}
