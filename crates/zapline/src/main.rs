// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Zapline - real-time WhatsApp conversation sync for CRM agents.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod check;
mod serve;

use clap::{Parser, Subcommand};
use zapline_config::ZaplineConfig;

/// Zapline - real-time WhatsApp conversation sync for CRM agents.
#[derive(Parser, Debug)]
#[command(name = "zapline", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run sync sessions for the configured agents until interrupted.
    Serve,
    /// Print the effective configuration.
    Config {
        /// Show the API token instead of masking it.
        #[arg(long)]
        show_secrets: bool,
    },
    /// Validate configuration and probe the bridge.
    Check {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
}

const MASK: &str = "********";

/// Copy of `config` safe to print.
fn redacted(config: &ZaplineConfig) -> ZaplineConfig {
    let mut shown = config.clone();
    if shown.backend.api_token.is_some() {
        shown.backend.api_token = Some(MASK.to_string());
    }
    shown
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match zapline_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            zapline_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Config { show_secrets }) => {
            let shown = if show_secrets {
                config
            } else {
                redacted(&config)
            };
            match toml::to_string_pretty(&shown) {
                Ok(text) => {
                    print!("{text}");
                    Ok(())
                }
                Err(e) => Err(zapline_core::ZaplineError::Internal(format!(
                    "failed to render configuration: {e}"
                ))),
            }
        }
        Some(Commands::Check { plain }) => check::run_check(&config, plain).await,
        None => {
            println!("zapline: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Only jemalloc supports advancing the epoch.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn config_defaults_are_valid() {
        let config = zapline_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.agent.log_level, "info");
    }

    #[test]
    fn api_token_is_masked() {
        let mut config = ZaplineConfig::default();
        config.backend.api_token = Some("super-secret".into());

        let text = toml::to_string_pretty(&redacted(&config)).unwrap();
        assert!(!text.contains("super-secret"));
        assert!(text.contains(MASK));
        assert_eq!(config.backend.api_token.as_deref(), Some("super-secret"));
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["zapline", "check", "--plain"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Check { plain: true })));
        let cli = Cli::try_parse_from(["zapline", "config", "--show-secrets"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Config { show_secrets: true })));
    }
}
