use anyhow::Result;
use clap::{CommandFactory, Parser};
use grounded::app::{Overrides, run_interactive};
use grounded::cli::{Cli, Commands};
use grounded::config::Config;
use grounded::daemon::run_daemon;
use grounded::diagnostics::run_checks;
use grounded::ipc::client::send_command;
use grounded::ipc::protocol::{Command, Response};
use grounded::ipc::server::IpcServer;
use owo_colors::OwoColorize;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    grounded::logging::init(cli.verbose, cli.quiet);

    let overrides = Overrides {
        backend: cli.backend.clone(),
        player: cli.player.clone(),
        inactivity_secs: cli.inactivity,
    };

    match cli.command {
        None => {
            let config = load_config(cli.config.as_deref(), overrides)?;
            run_interactive(config, cli.quiet).await?;
        }
        Some(Commands::Daemon { socket }) => {
            let config = load_config(cli.config.as_deref(), overrides)?;
            config.validate()?;
            run_daemon(config, socket).await?;
        }
        Some(Commands::Start { socket }) => {
            handle_ipc_command(socket, Command::Start).await?;
        }
        Some(Commands::Stop { socket }) => {
            handle_ipc_command(socket, Command::Stop).await?;
        }
        Some(Commands::Status { socket }) => {
            handle_ipc_command(socket, Command::Status).await?;
        }
        Some(Commands::Say {
            text,
            partial,
            socket,
        }) => {
            let command = Command::Transcript {
                text: text.join(" "),
                is_final: !partial,
            };
            handle_ipc_command(socket, command).await?;
        }
        Some(Commands::HeartRate { bpm, socket }) => {
            handle_ipc_command(socket, Command::HeartRate { bpm }).await?;
        }
        Some(Commands::Shutdown { socket }) => {
            handle_ipc_command(socket, Command::Shutdown).await?;
        }
        Some(Commands::Check) => {
            let config = load_config(cli.config.as_deref(), overrides)?;
            if !run_checks(&config).await {
                std::process::exit(1);
            }
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "grounded", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Load configuration: file (explicit or default path), then environment,
/// then command-line overrides.
fn load_config(custom_path: Option<&std::path::Path>, overrides: Overrides) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path()?)?,
    };
    Ok(overrides.apply(config.with_env_overrides()))
}

async fn handle_ipc_command(socket: Option<PathBuf>, command: Command) -> Result<()> {
    let socket_path = socket.unwrap_or_else(IpcServer::default_socket_path);

    match send_command(&socket_path, command).await {
        Ok(Response::Ok) => println!("{}", "ok".green()),
        Ok(Response::Status {
            phase,
            channel,
            turns,
            heart_rate,
        }) => {
            println!("Status:");
            println!("  {}   {}", "Version:".dimmed(), grounded::version_string());
            println!("  {}     {}", "Phase:".dimmed(), phase);
            println!(
                "  {}   {}",
                "Playing:".dimmed(),
                channel.as_deref().unwrap_or("nothing")
            );
            println!("  {}     {}", "Turns:".dimmed(), turns);
            match heart_rate {
                Some(bpm) => println!("  {} {} bpm", "Heart rate:".dimmed(), bpm),
                None => println!("  {} unknown", "Heart rate:".dimmed()),
            }
        }
        Ok(Response::Error { message }) => {
            eprintln!("{} {}", "error:".red(), message);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{} {}", "error:".red(), e);
            eprintln!("Is the daemon running? Start it with: grounded daemon");
            std::process::exit(1);
        }
    }

    Ok(())
}
