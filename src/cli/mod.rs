pub mod export;
pub mod output;
pub mod process;
pub mod report;

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use export::{process_export_command, ExportCommand};
use process::{daemon_executable, kill_previous_servers, restart_server};
use report::{process_report_command, ReportCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{
        blocklist::normalize_site,
        control::{control_socket_path, send_command, Command, Response, ResponseStatus},
        start_daemon,
        storage::settings::{Settings, SettingsStore},
    },
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
        notice::{toast, Severity},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Webinsight", version, long_about = None)]
#[command(about = "Track time spent on websites", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application")]
    Init {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Display usage statistics for a day, month or year")]
    Report {
        #[command(flatten)]
        command: ReportCommand,
    },
    #[command(about = "Export per-website usage as csv or a text table")]
    Export {
        #[command(flatten)]
        command: ExportCommand,
    },
    #[command(about = "Toggle focus mode, which blocks the configured sites")]
    Focus {
        #[command(subcommand)]
        command: FocusCommand,
    },
    #[command(about = "Manage the list of sites focus mode blocks")]
    Block {
        #[command(subcommand)]
        command: BlockCommand,
    },
    #[command(about = "Manage the browsing time limit countdown")]
    Limit {
        #[command(subcommand)]
        command: LimitCommand,
    },
    #[command(
        about = "Run a daemon directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Stop currently running daemon.")]
    Stop {},
}

#[derive(Subcommand, Debug)]
enum FocusCommand {
    #[command(about = "Enable focus mode and apply the block list")]
    On,
    #[command(about = "Disable focus mode and lift all blocking")]
    Off,
    #[command(about = "Show whether focus mode is on")]
    Status,
}

#[derive(Subcommand, Debug)]
enum BlockCommand {
    #[command(about = "Add a site to the block list")]
    Add { site: String },
    #[command(about = "Remove a site from the block list")]
    Remove { site: String },
    #[command(about = "Show the block list")]
    List,
}

#[derive(Subcommand, Debug)]
enum LimitCommand {
    #[command(about = "Start a countdown of the given number of minutes")]
    Set { minutes: u64 },
    #[command(about = "Stop the running countdown")]
    Stop,
    #[command(about = "Show the remaining time")]
    Status,
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(
        CLI_PREFIX,
        &create_application_default_path()?,
        logging_level,
        args.log,
    )?;

    match args.commands {
        Commands::Init { dir } => {
            restart_server(dir.as_deref())?;
            Ok(())
        }
        Commands::Stop {} => {
            match send_daemon_command(&Command::Stop).await {
                Ok(_) => toast(Severity::Success, "Daemon stopped"),
                Err(_) => {
                    // No reachable socket, fall back to killing the process.
                    kill_previous_servers(&daemon_executable()?);
                    toast(Severity::Info, "Daemon was not reachable, killed instead");
                }
            }
            Ok(())
        }
        Commands::Serve { dir } => {
            let dir = dir.map_or_else(create_application_default_path, Ok)?;
            start_daemon(dir).await?;
            Ok(())
        }
        Commands::Report { command } => process_report_command(command).await,
        Commands::Export { command } => process_export_command(command).await,
        Commands::Focus { command } => process_focus_command(command).await,
        Commands::Block { command } => process_block_command(command).await,
        Commands::Limit { command } => process_limit_command(command).await,
    }
}

async fn process_focus_command(command: FocusCommand) -> Result<()> {
    match command {
        FocusCommand::On => {
            let response = send_daemon_command(&Command::SetFocusMode { enabled: true }).await?;
            show_response(response, Severity::Info);
        }
        FocusCommand::Off => {
            let response = send_daemon_command(&Command::SetFocusMode { enabled: false }).await?;
            show_response(response, Severity::Info);
        }
        FocusCommand::Status => {
            let settings = load_settings().await?;
            if settings.focus_mode_enabled {
                toast(
                    Severity::Success,
                    format!(
                        "Focus Mode is ON, blocking {} site(s)",
                        settings.blocked_sites.len()
                    ),
                );
            } else {
                toast(Severity::Info, "Focus Mode is OFF");
            }
        }
    }
    Ok(())
}

async fn process_block_command(command: BlockCommand) -> Result<()> {
    match command {
        BlockCommand::Add { site } => {
            let settings = load_settings().await?;
            let Some(cleaned) = normalize_site(&site) else {
                toast(Severity::Error, "Invalid or duplicate site!");
                return Ok(());
            };
            if settings.blocked_sites.contains(&cleaned) {
                toast(Severity::Error, "Invalid or duplicate site!");
                return Ok(());
            }

            let mut sites = settings.blocked_sites;
            sites.push(cleaned);
            let response = send_daemon_command(&Command::UpdateBlocking { sites }).await?;
            show_response(response, Severity::Success);
        }
        BlockCommand::Remove { site } => {
            let settings = load_settings().await?;
            let cleaned = normalize_site(&site).unwrap_or_default();
            if !settings.blocked_sites.contains(&cleaned) {
                toast(Severity::Warning, format!("{site} is not in the block list"));
                return Ok(());
            }

            let sites = settings
                .blocked_sites
                .into_iter()
                .filter(|s| *s != cleaned)
                .collect();
            let response = send_daemon_command(&Command::UpdateBlocking { sites }).await?;
            show_response(response, Severity::Success);
        }
        BlockCommand::List => {
            let settings = load_settings().await?;
            if settings.blocked_sites.is_empty() {
                toast(Severity::Info, "The block list is empty");
            } else {
                for site in settings.blocked_sites {
                    println!("{site}");
                }
            }
        }
    }
    Ok(())
}

async fn process_limit_command(command: LimitCommand) -> Result<()> {
    match command {
        LimitCommand::Set { minutes } => {
            if minutes == 0 {
                toast(Severity::Error, "Invalid time limit!");
                return Ok(());
            }
            let response = send_daemon_command(&Command::StartTimer {
                seconds: minutes * 60,
            })
            .await?;
            if response.status == ResponseStatus::Ok {
                toast(
                    Severity::Success,
                    format!("Time limit set: {minutes} minutes"),
                );
            } else {
                show_response(response, Severity::Success);
            }
        }
        LimitCommand::Stop => {
            let response = send_daemon_command(&Command::StopTimer).await?;
            show_response(response, Severity::Info);
        }
        LimitCommand::Status => {
            let settings = load_settings().await?;
            if settings.remaining_seconds > 0 {
                toast(
                    Severity::Info,
                    format!(
                        "Time Left: {}:{:02}",
                        settings.remaining_seconds / 60,
                        settings.remaining_seconds % 60
                    ),
                );
            } else {
                toast(Severity::Info, "No countdown running");
            }
        }
    }
    Ok(())
}

async fn send_daemon_command(command: &Command) -> Result<Response> {
    let socket = control_socket_path(&create_application_default_path()?);
    send_command(&socket, command).await.map_err(|e| {
        anyhow!("Couldn't reach the daemon ({e}). Is it running? Start it with `webinsight init`")
    })
}

fn show_response(response: Response, success: Severity) {
    let severity = match response.status {
        ResponseStatus::Ok => success,
        ResponseStatus::Error => Severity::Error,
    };
    match response.message {
        Some(message) => toast(severity, message),
        None => toast(severity, "Done"),
    }
}

async fn load_settings() -> Result<Settings> {
    let store = SettingsStore::new(create_application_default_path()?.join("settings.json"));
    store.load().await
}
