use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use module_sync::{
    ErrorKind, GitHubService, InstallOrchestrator, InstallerConfig, ProgressTracker, SyncError,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "Keep local module directories in sync with a remote repository", long_about = None)]
struct Cli {
    /// Installer configuration file
    #[arg(short, long, value_name = "FILE", env = "MODULE_SYNC_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show installed and remote versions of every unit
    Status,
    /// Update outdated modules, except the self-update module
    Check,
    /// Update every outdated module, including the self-update module
    Install,
    /// Download every module again regardless of version
    Reinstall,
    /// Create all installation directories
    CreateDirs,
    /// Delete the whole installation
    DeleteDirs {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.kind() {
                ErrorKind::MissingVersionMarker => {
                    eprintln!("error: {e}\nThe remote repository needs to be republished.")
                }
                _ => eprintln!("error: {e}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), SyncError> {
    let config = InstallerConfig::load(&cli.config)?;

    let mut service = GitHubService::new();
    if let Some(branch) = &config.repository.branch {
        service = service.with_branch(branch);
    }
    if let Some(token) = config
        .repository
        .token_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok())
    {
        service = service.with_token(token);
    }

    let orchestrator = InstallOrchestrator::from_config(&config, Arc::new(service));
    let mut progress = ProgressTracker::with_listener(|line| eprintln!("{line}"));

    match cli.command {
        Command::Status => {
            if !orchestrator.is_fully_provisioned().await {
                println!("installation is incomplete, run `create-dirs` and `install`");
            }
            for status in orchestrator.status().await? {
                println!(
                    "{:<12} {:<24} installed={} remote={}{}",
                    status.module,
                    status.unit,
                    status.installed_version,
                    status.remote_version,
                    if status.outdated { " (outdated)" } else { "" }
                );
            }
        }
        Command::Check => {
            let installed = orchestrator.check_updates(&mut progress).await?;
            println!("{installed} unit(s) updated");
        }
        Command::Install => {
            orchestrator.create_directories().await?;
            let installed = orchestrator.install(&mut progress).await?;
            println!("{installed} unit(s) installed");
        }
        Command::Reinstall => {
            orchestrator.create_directories().await?;
            let installed = orchestrator.reinstall_all(&mut progress).await?;
            println!("{installed} unit(s) reinstalled");
        }
        Command::CreateDirs => orchestrator.create_directories().await?,
        Command::DeleteDirs { yes } => {
            if !yes {
                return Err(SyncError::InvalidConfig {
                    message: format!(
                        "refusing to delete {} without --yes",
                        orchestrator.root_directory().display()
                    ),
                });
            }
            orchestrator.delete_all_directories().await?;
        }
    }

    Ok(())
}
