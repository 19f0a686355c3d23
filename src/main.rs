use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use employee_actors::activities::DigestService;
use employee_actors::config::EngineConfig;
use employee_actors::domain::requests::{
    OnboardEmployeeRequest, RescheduleRequest, SetCurrentLocationRequest,
    UpdateEmployeeDetailsRequest,
};
use employee_actors::domain::types::{EmployeeId, Frequency};
use employee_actors::Engine;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "employee")]
#[command(about = "Durable employee lifecycle actors")]
#[command(version)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the actor journals (overrides the config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Onboard (or resume) an employee, then read commands from stdin
    Onboard {
        #[arg(long)]
        id: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        location: String,
        #[arg(long)]
        timezone: String,
    },
}

/// One line typed at the prompt.
#[derive(Debug, PartialEq)]
enum LineCommand {
    Details,
    Update { first_name: String, last_name: String },
    Schedule,
    Reschedule { frequency: Frequency, paused: bool },
    Location { location: String, timezone: String },
    Where,
    Offboard,
    Quit,
}

const HELP: &str = "commands: details | update <first> <last> | schedule | \
reschedule <NEVER|DAILY|MONDAY|FRIDAY> [paused] | location <location> <timezone> | \
where | offboard | quit";

fn parse_line(line: &str) -> Result<LineCommand> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let command = match words.as_slice() {
        ["details"] => LineCommand::Details,
        ["update", first, last] => LineCommand::Update {
            first_name: first.to_string(),
            last_name: last.to_string(),
        },
        ["schedule"] => LineCommand::Schedule,
        ["reschedule", frequency] => LineCommand::Reschedule {
            frequency: frequency.parse()?,
            paused: false,
        },
        ["reschedule", frequency, "paused"] => LineCommand::Reschedule {
            frequency: frequency.parse()?,
            paused: true,
        },
        ["location", location, timezone] => LineCommand::Location {
            location: location.to_string(),
            timezone: timezone.to_string(),
        },
        ["where"] => LineCommand::Where,
        ["offboard"] => LineCommand::Offboard,
        ["quit"] | ["exit"] => LineCommand::Quit,
        _ => bail!("unrecognized input '{}'", line.trim()),
    };
    Ok(command)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Applies one command; returns false once the session should end.
async fn run_line(engine: &Engine, id: &EmployeeId, command: LineCommand) -> Result<bool> {
    match command {
        LineCommand::Details => print_json(&engine.get_details(id).await?)?,
        LineCommand::Update {
            first_name,
            last_name,
        } => engine.update_details(
            id,
            UpdateEmployeeDetailsRequest {
                first_name,
                last_name,
            },
        )?,
        LineCommand::Schedule => print_json(&engine.get_notifications(id).await?)?,
        LineCommand::Reschedule { frequency, paused } => {
            engine.reschedule_notifications(id, RescheduleRequest { frequency, paused })?
        }
        LineCommand::Location { location, timezone } => engine.set_current_location(
            id,
            SetCurrentLocationRequest { location, timezone },
        )?,
        LineCommand::Where => print_json(&engine.get_location(id).await?)?,
        LineCommand::Offboard => {
            engine.offboard(id)?;
            engine.wait_for_completion(id).await?;
            println!("{} offboarded", id);
            return Ok(false);
        }
        LineCommand::Quit => return Ok(false),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    tracing::info!(data_dir = %config.data_dir.display(), "Starting employee engine");
    let engine = Engine::new(config, Arc::new(DigestService));

    let Command::Onboard {
        id,
        first_name,
        last_name,
        location,
        timezone,
    } = cli.command;
    let id = EmployeeId::from(id);

    let handle = engine
        .onboard(OnboardEmployeeRequest {
            id: id.clone(),
            first_name,
            last_name,
            default_location: location,
            default_timezone: timezone,
        })
        .await
        .with_context(|| format!("Failed to onboard '{}'", id))?;
    print_json(&handle.current_details())?;
    eprintln!("{}", HELP);

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_line(&line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{}\n{}", e, HELP);
                continue;
            }
        };
        match run_line(&engine, &id, command).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("error: {:#}", e),
        }
    }

    // No-op after offboarding; otherwise state resumes on the next onboard
    engine.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_commands() {
        assert_eq!(parse_line("details").unwrap(), LineCommand::Details);
        assert_eq!(
            parse_line("update Grace Hopper").unwrap(),
            LineCommand::Update {
                first_name: "Grace".to_string(),
                last_name: "Hopper".to_string(),
            }
        );
        assert_eq!(
            parse_line("reschedule friday paused").unwrap(),
            LineCommand::Reschedule {
                frequency: Frequency::Friday,
                paused: true,
            }
        );
        assert_eq!(
            parse_line("  reschedule NEVER ").unwrap(),
            LineCommand::Reschedule {
                frequency: Frequency::Never,
                paused: false,
            }
        );
        assert_eq!(parse_line("exit").unwrap(), LineCommand::Quit);
    }

    #[test]
    fn test_parse_line_rejects_unknown_input() {
        assert!(parse_line("reschedule WEDNESDAY").is_err());
        assert!(parse_line("update Grace").is_err());
        assert!(parse_line("dance").is_err());
    }
}
