//! Migrate command - applies, reverts and lists schema migrations

use clap::{Args, Subcommand};
use tracing::info;

use crate::infrastructure::storage::{Migrator, PostgresMigrator};

#[derive(Args, Debug)]
pub struct MigrateArgs {
    #[command(subcommand)]
    pub action: MigrateAction,
}

#[derive(Subcommand, Debug)]
pub enum MigrateAction {
    /// Apply all pending migrations
    Up,

    /// Revert the most recent migration
    Down,

    /// Show applied and pending migrations
    Status,
}

pub async fn run(args: MigrateArgs) -> anyhow::Result<()> {
    let config = super::init()?;
    let pool = crate::connect(&config).await?;
    let migrator = PostgresMigrator::new(pool);

    match args.action {
        MigrateAction::Up => {
            let applied = migrator.run().await?;
            info!("Applied {} migration(s)", applied);
            println!("Applied {} migration(s)", applied);
        }
        MigrateAction::Down => match migrator.revert().await? {
            Some(version) => println!("Reverted migration {}", version),
            None => println!("Nothing to revert"),
        },
        MigrateAction::Status => {
            let applied = migrator.applied_versions().await?;

            for migration in migrator.migrations() {
                let state = if applied.contains(&migration.version) {
                    "applied"
                } else {
                    "pending"
                };
                println!("{:>4}  {:<8} {}", migration.version, state, migration.description);
            }
        }
    }

    Ok(())
}
