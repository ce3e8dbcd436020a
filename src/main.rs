use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use deskpilot::agent_engine::LoopOutcome;
use deskpilot::commands;
use deskpilot::config::load_config_or_default;
use deskpilot::errors::PilotResult;

#[derive(Parser, Debug)]
#[command(name = "deskpilot", version, about = "Drive the desktop with directives from a vision language model")]
struct Cli {
    /// Path to config.toml (default: next to the executable, then the working directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Let the model work on a task until it finishes, asks for help or fails
    Run {
        instruction: String,
    },
    /// Execute the directives contained in TEXT
    Exec {
        text: String,
    },
    /// Print the directives contained in TEXT as JSON without executing them
    Parse {
        text: String,
    },
    /// Interactive session on stdin
    Chat,
    /// Print the pointer position while it moves
    Track {
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,
        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        seconds: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    deskpilot::init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> PilotResult<ExitCode> {
    if let Command::Parse { text } = &cli.command {
        println!("{}", commands::parse_text(text)?);
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config_or_default(cli.config.as_deref())?;
    match cli.command {
        Command::Run { instruction } => {
            let outcome = commands::run_task(&config, &instruction).await?;
            Ok(match outcome {
                LoopOutcome::Finished | LoopOutcome::UserRequested => ExitCode::SUCCESS,
                LoopOutcome::Cancelled => ExitCode::from(130),
                LoopOutcome::Failed { .. } => ExitCode::FAILURE,
            })
        }
        Command::Exec { text } => {
            let report = commands::exec_text(&config, &text).await?;
            Ok(if report.all_succeeded() { ExitCode::SUCCESS } else { ExitCode::from(2) })
        }
        Command::Chat => {
            commands::chat(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Track { interval_ms, seconds } => {
            commands::track(&config, interval_ms, seconds).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Parse { .. } => Ok(ExitCode::SUCCESS),
    }
}
