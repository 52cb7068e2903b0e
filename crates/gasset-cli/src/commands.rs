use std::path::{Path, PathBuf};

use anyhow::Context;
use colored::Colorize;
use gasset_core::{config, snapshot, Bootstrapper, Outcome, SourceReport};
use gasset_store::{BackendError, FsBackend};
use tracing::debug;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let start = match cli.project {
        Some(path) => path,
        None => std::env::current_dir().context("cannot read the current directory")?,
    };
    let root = gasset_core::locate(&start)?;
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => gasset_core::default_config_dir()
            .context("cannot determine the user config directory; pass --config-dir")?,
    };
    debug!(root = %root.display(), config_dir = %config_dir.display(), "project located");

    let backend = FsBackend::with_base_dir(&root);
    let work = async {
        match cli.command {
            Command::Init(args) => cmd_init(&backend, &root, &config_dir, args).await,
            Command::Snap(_) => cmd_snap(&backend, &root, &config_dir).await,
        }
    };

    tokio::select! {
        result = work => result,
        _ = tokio::signal::ctrl_c() => {
            // Uploads run on blocking threads that outlive the dropped future.
            backend.cancel();
            Err(anyhow::Error::new(BackendError::Cancelled).context("interrupted"))
        }
    }
}

async fn cmd_init(
    backend: &FsBackend,
    root: &Path,
    config_dir: &Path,
    args: InitArgs,
) -> anyhow::Result<()> {
    let resolved = config::resolve(root, backend).await?;
    let id = Bootstrapper::new(backend, &resolved, config_dir)
        .bootstrap(args.create)
        .await?;
    let verb = if args.create { "Created" } else { "Connected to" };
    println!("{} {} repository for {}", "✓".green().bold(), verb, root.display().to_string().bold());
    println!("  Identity: {}", id.as_str().cyan());
    println!(
        "  Connection: {}",
        gasset_core::connection_path(config_dir, &id).display().to_string().dimmed()
    );
    Ok(())
}

async fn cmd_snap(backend: &FsBackend, root: &Path, config_dir: &Path) -> anyhow::Result<()> {
    let resolved = config::resolve(root, backend).await?;
    if resolved.project.source_directories.is_empty() {
        println!("No source directories declared in {}.", config::project_file(root).display());
        return Ok(());
    }
    let reports = snapshot::run(backend, &resolved, config_dir).await?;
    for report in &reports {
        print_report(root, report);
    }
    let saved = reports.iter().filter(|r| r.outcome.is_saved()).count();
    println!(
        "{} {} saved, {} unchanged",
        "✓".green().bold(),
        saved.to_string().bold(),
        reports.len() - saved
    );
    Ok(())
}

fn print_report(root: &Path, report: &SourceReport) {
    let path = report
        .source
        .path
        .strip_prefix(root)
        .map(PathBuf::from)
        .unwrap_or_else(|_| report.source.path.clone());
    match &report.outcome {
        Outcome::Saved { id, expired } => {
            println!("  {} {}  {}", "saved".green(), path.display().to_string().bold(), id.to_string().yellow());
            if !expired.is_empty() {
                println!("        {} older snapshot(s) expired", expired.len());
            }
        }
        Outcome::Skipped { root: content } => {
            println!("  {} {}  {}", "unchanged".dimmed(), path.display(), content.short_hex().dimmed());
        }
    }
}
