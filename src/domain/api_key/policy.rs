//! Validation policy applied before every API key write

use std::sync::Arc;

use super::entity::KeyIdentifier;
use super::record::ApiKeyRecord;
use super::repository::ApiKeyRepository;
use super::validation::{check_integrity, check_required_fields};
use crate::domain::user::{UserDirectory, UserId};
use crate::domain::DomainError;

/// Constraint text reported when an identifier is already in use
pub const IDENTIFIER_TAKEN: &str = "has already been taken";

/// Kind of write being validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Create,
    Update,
}

/// Both validation tiers plus the checks that need storage: identifier
/// uniqueness and owner existence.
///
/// Updates are validated against the full entity, not the changed fields,
/// so an update path cannot skip a rule that only ran at creation.
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    users: Arc<dyn UserDirectory>,
}

impl ValidationPolicy {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }

    pub async fn validate<R>(
        &self,
        record: &ApiKeyRecord,
        write: WriteKind,
        keys: &R,
    ) -> Result<(), DomainError>
    where
        R: ApiKeyRepository + ?Sized,
    {
        if write == WriteKind::Create {
            check_required_fields(record)?;
        }

        check_integrity(record)?;

        if let Some(identifier) = &record.identifier {
            let identifier = KeyIdentifier::new(identifier.clone())?;
            let taken = keys.exists(&identifier).await?;

            match write {
                WriteKind::Create if taken => {
                    return Err(DomainError::integrity("identifier", IDENTIFIER_TAKEN));
                }
                WriteKind::Update if !taken => {
                    return Err(DomainError::not_found(format!(
                        "API key '{}' not found",
                        identifier
                    )));
                }
                _ => {}
            }
        }

        if let Some(owner_id) = record.owner_id {
            if !self.users.exists(UserId::new(owner_id)).await? {
                return Err(DomainError::integrity(
                    "owner_id",
                    format!("user {} does not exist", owner_id),
                ));
            }
        }

        Ok(())
    }
}
