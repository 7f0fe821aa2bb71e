//! Time Tracker CLI
//!
//! Tracks time against named tasks with a count-up timer, Pomodoro work
//! countdowns and breaks. The timer lives in a background daemon; every
//! other subcommand talks to it over a Unix socket.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};

use time_tracker::cli::{Cli, Commands, Display, IpcClient, TaskCommands};
use time_tracker::config::TrackerConfig;
use time_tracker::daemon;
use time_tracker::history::StoreError;
use time_tracker::types::{SessionEntry, TimerMessage};
use time_tracker::webhook::WebhookClient;

/// Main entry point
#[tokio::main]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_tracing(&cli);

    // Execute command
    if let Err(e) = execute(cli).await {
        Display::show_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber for logging.
///
/// `RUST_LOG` wins; otherwise the daemon logs at `info`, client commands at
/// `warn`, and `--verbose` lowers either to `debug`.
fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let is_daemon = matches!(cli.command, Some(Commands::Daemon));
    let default_level = match (cli.verbose, is_daemon) {
        (true, _) => "debug",
        (false, true) => "info",
        (false, false) => "warn",
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if is_daemon {
        builder.init();
    } else {
        builder.without_time().init();
    }
}

/// Executes the CLI command.
async fn execute(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        // No command provided, show help
        Cli::command().print_help()?;
        return Ok(());
    };

    if let Commands::Completions { shell } = command {
        generate_completions(shell);
        return Ok(());
    }

    let config = TrackerConfig::load(cli.config.as_deref())?;
    let client = IpcClient::new(config.socket_path());

    match command {
        Commands::Start(args) => {
            let state = client.start(&args.task).await?;
            Display::show_start_success(&state);
        }
        Commands::Pomodoro(args) => {
            let minutes = args.minutes.unwrap_or(config.work_minutes);
            let state = client
                .start_pomodoro(&args.task, u64::from(minutes) * 60)
                .await?;
            Display::show_start_success(&state);
        }
        Commands::Break(args) => {
            let minutes = match (args.minutes, args.long) {
                (Some(minutes), _) => minutes,
                (None, true) => config.long_break_minutes,
                (None, false) => config.break_minutes,
            };
            let state = client.start_break(u64::from(minutes) * 60).await?;
            Display::show_start_success(&state);
        }
        Commands::Stop(args) => {
            let stopped = client.stop().await?;
            let entry = if stopped.is_recordable() {
                Some(
                    client
                        .record_session(&stopped.task, stopped.duration_sec)
                        .await?,
                )
            } else {
                None
            };
            Display::show_stop_success(&stopped, entry.as_ref());

            if let (Some(entry), Some(url)) = (&entry, config.webhook_url()) {
                if !args.no_webhook {
                    post_to_webhook(url, entry).await;
                }
            }
        }
        Commands::Reset => {
            client.reset().await?;
            Display::show_reset_success();
        }
        Commands::Status => {
            let state = client.status().await?;
            Display::show_status(&state);
        }
        Commands::Watch => watch(&client).await?,
        Commands::History => {
            let sessions = client.list_sessions().await?;
            Display::show_history(&sessions);
        }
        Commands::Delete { position } => {
            let index = usize::try_from(position - 1).context("Position is too large")?;
            let (message, sessions) = client.delete_session(index).await?;
            Display::show_message(&message);
            Display::show_history(&sessions);
        }
        Commands::Export(args) => match client.export_csv().await? {
            Some(csv) => {
                let path = args.output.unwrap_or_else(default_export_path);
                std::fs::write(&path, &csv)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                Display::show_export_success(&path, csv.lines().count().saturating_sub(1));
            }
            None => Display::show_message(&StoreError::EmptyExport.to_string()),
        },
        Commands::Task { action } => match action {
            TaskCommands::Add { name } => {
                let (message, tasks) = client.add_task(&name).await?;
                Display::show_message(&message);
                Display::show_tasks(&tasks);
            }
            TaskCommands::List => {
                let tasks = client.list_tasks().await?;
                Display::show_tasks(&tasks);
            }
        },
        Commands::Daemon => daemon::run(&config).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Follows the daemon's push channel until it hangs up or Ctrl-C.
async fn watch(client: &IpcClient) -> Result<()> {
    let mut subscription = client.subscribe().await?;

    loop {
        tokio::select! {
            message = subscription.next_message() => match message? {
                Some(TimerMessage::TimerUpdate(state)) => Display::show_update(&state),
                Some(TimerMessage::TimerComplete(completion)) => {
                    Display::show_completion(&completion)
                }
                None => {
                    println!();
                    Display::show_message("Daemon disconnected");
                    return Ok(());
                }
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                return Ok(());
            }
        }
    }
}

/// Posts a recorded session; failures are reported, never fatal.
async fn post_to_webhook(url: &str, entry: &SessionEntry) {
    let result = match WebhookClient::new(url) {
        Ok(client) => client.post_session(entry).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => Display::show_webhook_success(url),
        Err(e) => Display::show_webhook_failure(&e.to_string()),
    }
}

/// `time-tracker-<YYYY-MM-DD>.csv` in the current directory, local date.
fn default_export_path() -> PathBuf {
    let date = chrono::Local::now().format("%Y-%m-%d");
    PathBuf::from(format!("time-tracker-{}.csv", date))
}

/// Generates shell completion scripts.
fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}

// ============================================================================
// Tests
// ============================================================================
