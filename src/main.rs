#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use babel_core::config::LoggingConfig;
use babel_core::{BabelConfig, Evaluator, LogFormat};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

mod commands;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn cli() -> Command {
    Command::new("perl6-babel")
        .version(VERSION)
        .about("Evaluate Perl 6 code blocks and return structured results")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file (default: environment)")
                .global(true),
        )
        .subcommand(
            Command::new("eval")
                .about("Evaluate one code block")
                .arg(
                    Arg::new("file")
                        .short('f')
                        .long("file")
                        .value_name("FILE")
                        .help("Read the code block from FILE")
                        .conflicts_with("code"),
                )
                .arg(
                    Arg::new("code")
                        .short('c')
                        .long("code")
                        .value_name("CODE")
                        .help("Code block given inline (default: stdin)"),
                )
                .arg(
                    Arg::new("session")
                        .short('s')
                        .long("session")
                        .value_name("SESSION")
                        .num_args(0..=1)
                        .default_missing_value("")
                        .help("Evaluate in a persistent session; without a name the document's session"),
                )
                .arg(
                    Arg::new("results")
                        .short('r')
                        .long("results")
                        .value_name("TYPE")
                        .value_parser(["value", "output"])
                        .default_value("value")
                        .help("Return the block's value or its printed output"),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .value_name("FORMAT")
                        .value_parser(["json", "literal"])
                        .default_value("json")
                        .help("How to print the result"),
                )
                .arg(
                    Arg::new("document")
                        .long("document")
                        .value_name("NAME")
                        .help("Name of the calling document, used as the default session name"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_name("SECS")
                        .value_parser(value_parser!(u64))
                        .help("Give up after SECS seconds"),
                ),
        )
        .subcommand(Command::new("serve").about("Serve JSON-RPC requests over stdin/stdout"))
        .subcommand(
            Command::new("repl")
                .about("Interactive session")
                .arg(
                    Arg::new("session")
                        .short('s')
                        .long("session")
                        .value_name("SESSION")
                        .help("Session to evaluate in"),
                )
                .arg(
                    Arg::new("quiet")
                        .short('q')
                        .long("quiet")
                        .action(ArgAction::SetTrue)
                        .help("Skip the banner"),
                ),
        )
}

fn load_config(matches: &ArgMatches) -> Result<BabelConfig> {
    let config = match matches.get_one::<String>("config") {
        Some(path) => BabelConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path))?,
        None => BabelConfig::from_env().context("invalid environment configuration")?,
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Logs go to stderr; stdout carries results and JSON-RPC responses.
fn init_logging(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);

    match config.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();

    let config = match load_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    };
    init_logging(&config.logging);

    let evaluator = match Evaluator::new(config) {
        Ok(evaluator) => evaluator,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    let outcome = match matches.subcommand() {
        Some(("eval", sub_matches)) => commands::eval::run(&evaluator, sub_matches).await,
        Some(("serve", _)) => commands::serve::run(&evaluator).await,
        Some(("repl", sub_matches)) => commands::repl::run(&evaluator, sub_matches).await,
        _ => {
            println!("perl6-babel v{}", VERSION);
            println!("Use --help for available commands");
            Ok(())
        }
    };

    evaluator.shutdown().await;
    if let Err(e) = outcome {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn test_eval_arguments() {
        let matches = cli()
            .try_get_matches_from(["perl6-babel", "eval", "-c", "1 + 1", "-s", "-r", "output"])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "eval");
        assert_eq!(sub.get_one::<String>("code").map(String::as_str), Some("1 + 1"));
        assert_eq!(sub.get_one::<String>("session").map(String::as_str), Some(""));
        assert_eq!(sub.get_one::<String>("results").map(String::as_str), Some("output"));
        assert_eq!(sub.get_one::<String>("format").map(String::as_str), Some("json"));
    }

    #[test]
    fn test_eval_rejects_unknown_result_type() {
        assert!(cli()
            .try_get_matches_from(["perl6-babel", "eval", "-c", "1", "-r", "table"])
            .is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let matches = cli()
            .try_get_matches_from(["perl6-babel", "serve", "--config", "babel.toml"])
            .unwrap();
        assert_eq!(
            matches.get_one::<String>("config").map(String::as_str),
            Some("babel.toml")
        );
    }
}
