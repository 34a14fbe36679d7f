//! Key management commands

use anyhow::bail;
use clap::Args;
use serde::Serialize;

use crate::infrastructure::api_key::{ApiKeyService, CreateApiKeyRequest, PostgresApiKeyRepository};
use crate::infrastructure::encryption::EncryptionKey;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Owning user id
    #[arg(long)]
    pub owner: i64,

    /// Free-text label (max 500 characters)
    #[arg(long)]
    pub memo: String,

    /// Restrict use to an address or CIDR network (repeatable)
    #[arg(long = "allowed-ip")]
    pub allowed_ips: Vec<String>,

    /// Initial grant as `resource=level` (repeatable)
    #[arg(long = "grant", value_parser = parse_grant)]
    pub grants: Vec<(String, i64)>,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    #[arg(long)]
    pub identifier: String,

    #[arg(long)]
    pub token: String,
}

#[derive(Args, Debug)]
pub struct GrantArgs {
    #[arg(long)]
    pub identifier: String,

    /// Resource kind, e.g. `servers`
    #[arg(long)]
    pub resource: String,

    /// 0 none, 1 read, 2 read+write, 3 read+write+delete
    #[arg(long)]
    pub level: i64,
}

#[derive(Args, Debug)]
pub struct IdentifierArgs {
    #[arg(long)]
    pub identifier: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only keys of this user
    #[arg(long)]
    pub owner: Option<i64>,
}

fn parse_grant(value: &str) -> Result<(String, i64), String> {
    let (kind, level) = value
        .split_once('=')
        .ok_or_else(|| format!("expected resource=level, got '{}'", value))?;

    let level = level
        .trim()
        .parse()
        .map_err(|_| format!("invalid level '{}'", level))?;

    Ok((kind.trim().to_string(), level))
}

async fn service() -> anyhow::Result<ApiKeyService<PostgresApiKeyRepository>> {
    let config = super::init()?;
    let pool = crate::connect(&config).await?;

    Ok(crate::create_api_key_service(&config, pool)?)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn create(args: CreateArgs) -> anyhow::Result<()> {
    let service = service().await?;

    let mut request = CreateApiKeyRequest::new(args.owner, args.memo);
    if !args.allowed_ips.is_empty() {
        request = request.with_allowed_ips(args.allowed_ips);
    }
    for (kind, level) in args.grants {
        request = request.with_permission(kind, level);
    }

    let issued = service.create(request).await?;

    print_json(&issued.api_key.exposed_view())?;
    println!();
    println!("Token (shown only once): {}", issued.secret.expose_secret());

    Ok(())
}

pub async fn verify(args: VerifyArgs) -> anyhow::Result<()> {
    let service = service().await?;

    if !service.verify(&args.identifier, &args.token).await? {
        bail!("API key rejected");
    }

    println!("API key accepted");
    Ok(())
}

pub async fn grant(args: GrantArgs) -> anyhow::Result<()> {
    let service = service().await?;

    let api_key = service
        .grant(&args.identifier, &args.resource, args.level)
        .await?;

    print_json(&api_key.exposed_view())
}

pub async fn revoke_all(args: IdentifierArgs) -> anyhow::Result<()> {
    let service = service().await?;

    let api_key = service.revoke_all(&args.identifier).await?;

    print_json(&api_key.exposed_view())
}

pub async fn delete(args: IdentifierArgs) -> anyhow::Result<()> {
    let service = service().await?;

    if !service.delete(&args.identifier).await? {
        bail!("API key '{}' not found", args.identifier);
    }

    println!("Deleted API key {}", args.identifier);
    Ok(())
}

pub async fn list(args: ListArgs) -> anyhow::Result<()> {
    let service = service().await?;

    let views: Vec<_> = service
        .list(args.owner)
        .await?
        .iter()
        .map(|key| key.exposed_view())
        .collect();

    print_json(&views)
}

pub fn generate_key() -> anyhow::Result<()> {
    println!("{}", EncryptionKey::generate().to_base64());
    Ok(())
}
