//! API key validation rules
//!
//! Two tiers, checked in order:
//!
//! 1. creation-required fields ([`check_required_fields`]), failing with
//!    `DomainError::MissingField`
//! 2. storage integrity ([`check_integrity`]), failing with
//!    `DomainError::IntegrityViolation` or `DomainError::UnknownResourceKind`
//!
//! Uniqueness of the identifier and existence of the owner need storage
//! access and live in [`super::ValidationPolicy`].

use serde_json::Value;

use super::entity::{AllowedIp, AllowedIps};
use super::record::ApiKeyRecord;
use crate::domain::acl::PermissionSet;
use crate::domain::DomainError;

/// Length of public key identifiers
pub const IDENTIFIER_LENGTH: usize = 16;

/// Length of the plaintext secret token at generation
pub const KEY_LENGTH: usize = 32;

/// Maximum memo length, in characters
pub const MAX_MEMO_LENGTH: usize = 500;

/// Validate an identifier's format.
///
/// Rules:
/// - Exactly 16 characters
/// - ASCII letters and digits only
pub fn validate_identifier(identifier: &str) -> Result<(), DomainError> {
    if let Some(c) = identifier.chars().find(|c| !c.is_ascii_alphanumeric()) {
        return Err(DomainError::integrity(
            "identifier",
            format!("contains invalid character '{}'", c),
        ));
    }

    if identifier.len() != IDENTIFIER_LENGTH {
        return Err(DomainError::integrity(
            "identifier",
            format!("must be exactly {} characters", IDENTIFIER_LENGTH),
        ));
    }

    Ok(())
}

/// Validate memo length
pub fn validate_memo(memo: &str) -> Result<(), DomainError> {
    if memo.chars().count() > MAX_MEMO_LENGTH {
        return Err(DomainError::integrity(
            "memo",
            format!("must not exceed {} characters", MAX_MEMO_LENGTH),
        ));
    }

    Ok(())
}

/// Parse the structured `allowed_ips` value: a JSON list of IP address or
/// CIDR strings.
///
/// The list is a set: repeated networks are dropped, first occurrence wins.
pub fn parse_allowed_ips(value: &Value) -> Result<AllowedIps, DomainError> {
    let entries = value
        .as_array()
        .ok_or_else(|| DomainError::integrity("allowed_ips", "must be a JSON list"))?;

    let mut parsed = Vec::with_capacity(entries.len());

    for entry in entries {
        let raw = entry
            .as_str()
            .ok_or_else(|| DomainError::integrity("allowed_ips", "entries must be strings"))?;

        let ip = AllowedIp::parse(raw).ok_or_else(|| {
            DomainError::integrity(
                "allowed_ips",
                format!("'{}' is not an IP address or CIDR network", raw),
            )
        })?;

        if !parsed.iter().any(|seen: &AllowedIp| seen.same_network(&ip)) {
            parsed.push(ip);
        }
    }

    Ok(AllowedIps::new(parsed))
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

/// Creation-required tier: identifier, memo, owner and token must be
/// present and non-empty
pub fn check_required_fields(record: &ApiKeyRecord) -> Result<(), DomainError> {
    if is_blank(record.identifier.as_deref()) {
        return Err(DomainError::missing_field("identifier"));
    }

    if is_blank(record.memo.as_deref()) {
        return Err(DomainError::missing_field("memo"));
    }

    if record.owner_id.is_none() {
        return Err(DomainError::missing_field("owner_id"));
    }

    if record.token.as_ref().map(|t| t.is_empty()).unwrap_or(true) {
        return Err(DomainError::missing_field("token"));
    }

    Ok(())
}

/// Integrity tier, without the checks that need storage.
///
/// Runs against the full record on every write. Fields that are absent
/// are left to the required tier.
pub fn check_integrity(record: &ApiKeyRecord) -> Result<(), DomainError> {
    if let Some(identifier) = &record.identifier {
        validate_identifier(identifier)?;
    }

    if let Some(token) = &record.token {
        if token.is_empty() {
            return Err(DomainError::integrity("token", "must not be empty"));
        }
    }

    if let Some(memo) = &record.memo {
        validate_memo(memo)?;
    }

    if let Some(allowed_ips) = &record.allowed_ips {
        if !allowed_ips.is_null() {
            parse_allowed_ips(allowed_ips)?;
        }
    }

    PermissionSet::from_raw(&record.permissions)?;

    Ok(())
}
