//! CLI module for the API keyring
//!
//! Administrative subcommands over the `api_keys` table:
//! - `migrate`: apply, revert or inspect schema migrations
//! - `create` / `verify` / `grant` / `revoke-all` / `delete` / `list`: key management
//! - `generate-key`: produce a fresh encryption key for configuration

pub mod keys;
pub mod migrate;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::logging;

/// API keyring - admin API keys with per-resource access levels
#[derive(Parser)]
#[command(name = "api-keyring")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage schema migrations
    Migrate(migrate::MigrateArgs),

    /// Issue a new API key and print its secret once
    Create(keys::CreateArgs),

    /// Check an identifier/token pair
    Verify(keys::VerifyArgs),

    /// Set the access level of one resource kind
    Grant(keys::GrantArgs),

    /// Drop every grant of a key back to no access
    RevokeAll(keys::IdentifierArgs),

    /// Delete an API key
    Delete(keys::IdentifierArgs),

    /// List API keys
    List(keys::ListArgs),

    /// Print a new base64 encryption key for `encryption.key`
    GenerateKey,
}

/// Load `.env` and configuration, then install logging
pub fn init() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    logging::init_logging(&config.logging);

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create() {
        let cli = Cli::try_parse_from([
            "api-keyring",
            "create",
            "--owner",
            "42",
            "--memo",
            "ci-bot",
            "--allowed-ip",
            "10.0.0.0/8",
            "--grant",
            "servers=2",
        ])
        .unwrap();

        let Command::Create(args) = cli.command else {
            panic!("expected create");
        };
        assert_eq!(args.owner, 42);
        assert_eq!(args.memo, "ci-bot");
        assert_eq!(args.allowed_ips, vec!["10.0.0.0/8"]);
        assert_eq!(args.grants, vec![("servers".to_string(), 2)]);
    }

    #[test]
    fn test_parse_migrate_status() {
        let cli = Cli::try_parse_from(["api-keyring", "migrate", "status"]).unwrap();

        assert!(matches!(
            cli.command,
            Command::Migrate(migrate::MigrateArgs {
                action: migrate::MigrateAction::Status
            })
        ));
    }

    #[test]
    fn test_parse_rejects_bad_grant() {
        assert!(
            Cli::try_parse_from([
                "api-keyring",
                "create",
                "--owner",
                "42",
                "--memo",
                "m",
                "--grant",
                "servers"
            ])
            .is_err()
        );
    }
}
