use api_keyring::cli::{self, Cli, Command};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Migrate(args) => cli::migrate::run(args).await,
        Command::Create(args) => cli::keys::create(args).await,
        Command::Verify(args) => cli::keys::verify(args).await,
        Command::Grant(args) => cli::keys::grant(args).await,
        Command::RevokeAll(args) => cli::keys::revoke_all(args).await,
        Command::Delete(args) => cli::keys::delete(args).await,
        Command::List(args) => cli::keys::list(args).await,
        Command::GenerateKey => cli::keys::generate_key(),
    }
}
