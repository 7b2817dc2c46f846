//! sql-dal CLI - connection probes and ad-hoc commands against one backend.

use clap::{Parser, Subcommand};
use sql_dal::{Config, DalError, DataRepository, Dynamic, Parameter, SqlRepository, SqlValue};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "sql-dal")]
#[command(about = "Run commands through the sql-dal mapping engine")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test the database connection
    HealthCheck,

    /// Run a query and print each row as a JSON line
    Query {
        /// Command text, with @Name placeholders
        #[arg(long)]
        sql: String,

        /// Parameter as NAME=VALUE; the value `null` binds SQL NULL
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Comma-separated columns to read from each row
        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,
    },

    /// Run a write command and print the generated id
    Exec {
        /// Command text, with @Name placeholders
        #[arg(long)]
        sql: String,

        /// Parameter as NAME=VALUE; the value `null` binds SQL NULL
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, DalError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(DalError::Config)?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);
    info!("Using {}", config.provider.connection_string());

    let repo = SqlRepository::from_config(&config)?;

    match cli.command {
        Commands::HealthCheck => {
            if repo.is_available().await {
                println!("OK");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("FAILED");
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::Query {
            sql,
            params,
            columns,
        } => {
            let mut prototype = Dynamic::new();
            for column in &columns {
                prototype.insert_property(column.trim(), SqlValue::Null);
            }

            let rows = repo
                .read_dynamic(&prototype, &sql, &to_parameters(params))
                .await?;
            for row in &rows {
                let mut line = serde_json::Map::new();
                for column in &columns {
                    let column = column.trim();
                    line.insert(column.to_string(), serde_json::to_value(row.get_or_null(column))?);
                }
                println!("{}", serde_json::Value::Object(line));
            }
            info!("{} rows", rows.len());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Exec { sql, params } => {
            let id = repo.update(&sql, None, &to_parameters(params)).await?;
            println!("{}", id);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Split `NAME=VALUE` at the first `=`.
fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{}'", s)),
    }
}

fn to_parameters(params: Vec<(String, String)>) -> Vec<Parameter> {
    params
        .into_iter()
        .map(|(name, value)| {
            if value.eq_ignore_ascii_case("null") {
                Parameter::new(name, SqlValue::Null)
            } else {
                Parameter::new(name, value)
            }
        })
        .collect()
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries command output
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => {
            return Err(format!(
                "Invalid log format '{}'. Valid values: text, json",
                other
            ))
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param_splits_at_first_equals() {
        assert_eq!(
            parse_param("Filter=a=b").unwrap(),
            ("Filter".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_param("Name=").unwrap(), ("Name".to_string(), String::new()));
        assert!(parse_param("Name").is_err());
        assert!(parse_param("=value").is_err());
    }

    #[test]
    fn test_null_value_binds_null() {
        let params = to_parameters(vec![
            ("ID".into(), "7".into()),
            ("Email".into(), "NULL".into()),
        ]);
        assert_eq!(params[0].value, SqlValue::from("7"));
        assert_eq!(params[1].value, SqlValue::Null);
    }
}
