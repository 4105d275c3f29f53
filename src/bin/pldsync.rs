use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use pldsync::backup::SnapshotId;
use pldsync::export::export_to;
use pldsync::record::fmt_duration;
use pldsync::{Config, DeviceState, FileArchive, Role, SyncPhase, SyncWorker, Workspace};

#[derive(Parser)]
#[command(name = "pldsync", about = "Merge, back up and sync activity logs")]
struct Cli {
    /// JSON config file; defaults are used when it does not exist
    #[arg(long, default_value = "pldsync.json")]
    config: PathBuf,
    /// Override the SD working directory
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Override the save region file
    #[arg(long)]
    archive: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show merged totals per title
    Info {
        /// Only list the N most played titles
        #[arg(long)]
        top: Option<usize>,
    },
    /// Wait for a client and sync with it
    Host,
    /// Find a host on the local network and sync with it
    Client,
    /// Snapshot the merged data
    Backup,
    /// List snapshots, newest first
    Backups,
    /// Make a snapshot the merged data
    Restore {
        /// Snapshot file name, as shown by `backups`
        id: String,
    },
    /// Write the merged data into the save region
    Commit,
    /// Discard merged data and start over from the save region
    Reset,
    /// Write export.csv and export.json to the data directory
    Export,
}

async fn load(workspace: &Workspace, archive: &FileArchive) -> Result<DeviceState> {
    workspace
        .load_device_state(archive)
        .await
        .with_context(|| format!("loading records from {}", archive.path().display()))
}

fn print_info(state: &DeviceState, top: Option<usize>) {
    let store = &state.store;
    let mut titles: Vec<_> = store.summaries.iter().collect();
    titles.sort_by(|a, b| b.total_secs.cmp(&a.total_secs));
    let total: u64 = titles.iter().map(|s| u64::from(s.total_secs)).sum();

    println!(
        "{} titles, {} sessions, {} syncs, total {}",
        titles.len(),
        store.sessions.len(),
        state.sync_count,
        fmt_duration(total.min(u64::from(u32::MAX)) as u32)
    );
    for s in titles.into_iter().take(top.unwrap_or(usize::MAX)) {
        println!(
            "{:016X}  {:<32}  {:>10}  {:>5} launches  {:>4} sessions  best streak {}d",
            s.title_id,
            state.names.lookup(s.title_id).unwrap_or("Unknown"),
            fmt_duration(s.total_secs),
            s.launch_count,
            store.sessions.count_for(s.title_id),
            store.sessions.longest_streak(s.title_id)
        );
    }
}

async fn run_sync(
    config: &Config,
    workspace: &Workspace,
    state: DeviceState,
    role: Role,
) -> Result<()> {
    let worker = SyncWorker::spawn(state, role, config.network.clone(), workspace.clone());
    let mut phases = worker.phases();
    println!("{}", *phases.borrow());

    loop {
        tokio::select! {
            changed = phases.changed() => {
                if changed.is_err() {
                    break;
                }
                let phase = *phases.borrow();
                println!("{}", phase);
                if matches!(phase, SyncPhase::Done | SyncPhase::Failed) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Cancelling...");
                worker.cancel();
            }
        }
    }

    let (state, result) = worker.join().await?;
    match result {
        Ok(report) => {
            println!("{}", report.status_line());
            println!(
                "{} sessions, {} titles, sync #{}",
                report.total_sessions, report.total_titles, state.sync_count
            );
            Ok(())
        }
        Err(e) => {
            println!("{}", e.status_line());
            Err(e.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)
        .with_context(|| format!("reading {}", cli.config.display()))?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(path) = cli.archive {
        config.archive_path = path;
    }

    let workspace = Workspace::from_config(&config);
    let archive = FileArchive::new(config.archive_path.clone());

    match cli.command {
        Commands::Info { top } => {
            let state = load(&workspace, &archive).await?;
            print_info(&state, top);
        }
        Commands::Host => {
            let state = load(&workspace, &archive).await?;
            run_sync(&config, &workspace, state, Role::Host).await?;
        }
        Commands::Client => {
            let state = load(&workspace, &archive).await?;
            run_sync(&config, &workspace, state, Role::Client).await?;
        }
        Commands::Backup => {
            load(&workspace, &archive).await?;
            match workspace.backup_merged().await? {
                Some(id) => println!("Backup saved: {}", id),
                None => bail!("nothing to back up in {}", workspace.dir().display()),
            }
        }
        Commands::Backups => {
            let backups = workspace.backups();
            let ids = backups.list().await?;
            if ids.is_empty() {
                println!("No backups in {}", backups.dir().display());
            }
            for id in ids {
                match backups.app_count(&id).await {
                    Ok(count) => println!("{}  {}  {} apps", id, id.label(), count),
                    Err(e) => println!("{}  {}  unreadable: {}", id, id.label(), e),
                }
            }
        }
        Commands::Restore { id } => {
            let Some(id) = SnapshotId::parse(&id) else {
                bail!("not a backup name: {}", id);
            };
            let store = workspace.adopt_snapshot(&id).await?;
            println!(
                "Restored {}: {} titles, {} sessions",
                id.label(),
                store.summaries.len(),
                store.sessions.len()
            );
        }
        Commands::Commit => {
            let state = load(&workspace, &archive).await?;
            let backup = workspace.commit(&archive, &state).await?;
            println!(
                "Wrote {} titles to {} (previous contents in {})",
                state.store.summaries.len(),
                archive.path().display(),
                backup
            );
        }
        Commands::Reset => {
            let state = workspace.reset_to_local(&archive).await?;
            println!(
                "Merged data reset to {} titles, {} sessions",
                state.store.summaries.len(),
                state.store.sessions.len()
            );
        }
        Commands::Export => {
            let state = load(&workspace, &archive).await?;
            let (csv, json) = export_to(workspace.dir(), &state.store, &state.names).await?;
            println!("Exported {} and {}", csv.display(), json.display());
        }
    }
    Ok(())
}
