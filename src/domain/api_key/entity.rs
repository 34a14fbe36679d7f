//! API Key entity and related types

use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use super::record::ApiKeyRecord;
use super::secret::EncryptedToken;
use super::validation::{
    check_integrity, check_required_fields, parse_allowed_ips, validate_identifier,
};
use crate::domain::acl::{PermissionLevel, PermissionSet, ResourceKind};
use crate::domain::user::UserId;
use crate::domain::DomainError;

/// Public key identifier - exactly 16 ASCII alphanumeric characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyIdentifier(String);

impl KeyIdentifier {
    /// Create a new KeyIdentifier after validation
    pub fn new(identifier: impl Into<String>) -> Result<Self, DomainError> {
        let identifier = identifier.into();
        validate_identifier(&identifier)?;
        Ok(Self(identifier))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for KeyIdentifier {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<KeyIdentifier> for String {
    fn from(identifier: KeyIdentifier) -> Self {
        identifier.0
    }
}

impl std::fmt::Display for KeyIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One `allowed_ips` entry: a single address or a CIDR network.
///
/// The original text is kept so the stored list round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedIp {
    raw: String,
    network: IpNet,
}

impl AllowedIp {
    /// Parse `"10.0.0.1"` or `"10.0.0.0/8"`; `None` when neither
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();

        let network = IpNet::from_str(trimmed)
            .ok()
            .or_else(|| IpAddr::from_str(trimmed).ok().map(IpNet::from))?;

        Some(Self {
            raw: trimmed.to_string(),
            network,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.network.contains(addr)
    }

    /// `10.0.0.1` and `10.0.0.1/32` are the same entry
    pub fn same_network(&self, other: &AllowedIp) -> bool {
        self.network == other.network
    }
}

/// Ordered IP/CIDR restriction set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedIps(Vec<AllowedIp>);

impl AllowedIps {
    pub fn new(entries: Vec<AllowedIp>) -> Self {
        Self(entries)
    }

    /// Parse string entries, failing on the first malformed one
    pub fn parse<I, S>(entries: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let value = serde_json::Value::Array(
            entries
                .into_iter()
                .map(|s| serde_json::Value::String(s.into()))
                .collect(),
        );

        parse_allowed_ips(&value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AllowedIp> {
        self.0.iter()
    }

    /// An empty list places no restriction
    pub fn allows(&self, addr: &IpAddr) -> bool {
        self.0.is_empty() || self.0.iter().any(|ip| ip.contains(addr))
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(|ip| ip.raw.clone()).collect()
    }

    /// Structured form stored in the `allowed_ips` column
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::from(self.to_strings())
    }
}

/// Fields an update writes. Columns not listed keep their stored value,
/// so concurrent edits of different fields do not overwrite each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyChanges {
    pub memo: bool,
    pub allowed_ips: bool,
    pub permissions: Vec<ResourceKind>,
}

impl KeyChanges {
    /// A single grant
    pub fn permission(kind: ResourceKind) -> Self {
        Self::default().with_permission(kind)
    }

    /// Every grant, as written by a revoke-all
    pub fn all_permissions() -> Self {
        Self {
            permissions: ResourceKind::ALL.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_permission(mut self, kind: ResourceKind) -> Self {
        if !self.permissions.contains(&kind) {
            self.permissions.push(kind);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.memo && !self.allowed_ips && self.permissions.is_empty()
    }
}

/// API Key entity
///
/// Holds the encrypted secret only. The plaintext exists solely as the
/// `SecretToken` returned when the key is issued.
#[derive(Debug, Clone)]
pub struct ApiKey {
    /// Public lookup identifier, immutable
    identifier: KeyIdentifier,
    /// Ciphertext of the secret token, immutable
    token: EncryptedToken,
    /// Owning user
    owner_id: UserId,
    /// Source address restriction (None = unrestricted)
    allowed_ips: Option<AllowedIps>,
    /// Free-text label
    memo: String,
    /// Access level per resource kind
    permissions: PermissionSet,
    /// Last successful authentication
    last_used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Externally facing projection of an API key. Never contains the token.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyView {
    pub identifier: String,
    pub owner_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_ips: Option<Vec<String>>,
    pub memo: String,
    pub permissions: PermissionSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiKey {
    /// Create a new API key with no permissions
    pub fn new(
        identifier: KeyIdentifier,
        token: EncryptedToken,
        owner_id: UserId,
        memo: impl Into<String>,
    ) -> Self {
        let now = Utc::now();

        Self {
            identifier,
            token,
            owner_id,
            allowed_ips: None,
            memo: memo.into(),
            permissions: PermissionSet::default(),
            last_used_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the IP restriction list
    pub fn with_allowed_ips(mut self, allowed_ips: Option<AllowedIps>) -> Self {
        self.allowed_ips = allowed_ips;
        self
    }

    /// Set permissions
    pub fn with_permissions(mut self, permissions: PermissionSet) -> Self {
        self.permissions = permissions;
        self
    }

    /// Build an entity from its raw form, running both validation tiers
    /// that do not need storage. Used for new keys.
    pub fn from_record(record: ApiKeyRecord) -> Result<Self, DomainError> {
        check_required_fields(&record)?;
        Self::restore(record)
    }

    /// Rehydrate a stored row.
    ///
    /// Only the integrity tier applies: the creation-required tier is not
    /// re-run on rows that were already accepted, so a stored null memo
    /// loads as an empty one.
    pub fn restore(record: ApiKeyRecord) -> Result<Self, DomainError> {
        check_integrity(&record)?;

        let ApiKeyRecord {
            identifier,
            token,
            owner_id,
            allowed_ips,
            memo,
            permissions,
            last_used_at,
            created_at,
            updated_at,
        } = record;

        let identifier = identifier.ok_or_else(|| DomainError::missing_field("identifier"))?;
        let token = token.ok_or_else(|| DomainError::missing_field("token"))?;
        let owner_id = owner_id.ok_or_else(|| DomainError::missing_field("owner_id"))?;

        let allowed_ips = match allowed_ips {
            Some(value) if !value.is_null() => Some(parse_allowed_ips(&value)?),
            _ => None,
        };

        let now = Utc::now();

        Ok(Self {
            identifier: KeyIdentifier::new(identifier)?,
            token: EncryptedToken::new(token),
            owner_id: UserId::new(owner_id),
            allowed_ips,
            memo: memo.unwrap_or_default(),
            permissions: PermissionSet::from_raw(&permissions)?,
            last_used_at,
            created_at: created_at.unwrap_or(now),
            updated_at: updated_at.unwrap_or(now),
        })
    }

    /// Full raw form, used to re-validate the whole entity on every write
    pub fn to_record(&self) -> ApiKeyRecord {
        ApiKeyRecord {
            identifier: Some(self.identifier.as_str().to_string()),
            token: Some(self.token.as_bytes().to_vec()),
            owner_id: Some(self.owner_id.as_i64()),
            allowed_ips: self.allowed_ips.as_ref().map(AllowedIps::to_json),
            memo: Some(self.memo.clone()),
            permissions: self.permissions.to_raw(),
            last_used_at: self.last_used_at,
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
        }
    }

    // Getters

    pub fn identifier(&self) -> &KeyIdentifier {
        &self.identifier
    }

    pub fn token(&self) -> &EncryptedToken {
        &self.token
    }

    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }

    pub fn allowed_ips(&self) -> Option<&AllowedIps> {
        self.allowed_ips.as_ref()
    }

    pub fn memo(&self) -> &str {
        &self.memo
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    pub fn permission(&self, kind: ResourceKind) -> PermissionLevel {
        self.permissions.get(kind)
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // Checks

    /// Whether this key's grant on `kind` covers `required`
    pub fn can(&self, kind: ResourceKind, required: PermissionLevel) -> bool {
        self.permissions.allows(kind, required)
    }

    /// Whether a request from `addr` passes the IP restriction
    pub fn allows_ip(&self, addr: &IpAddr) -> bool {
        self.allowed_ips
            .as_ref()
            .map(|ips| ips.allows(addr))
            .unwrap_or(true)
    }

    // Mutators

    /// Grant a level on a resource kind given by name.
    ///
    /// Fails with `UnknownResourceKind` for an unregistered name and with
    /// `IntegrityViolation` for a level outside 0..=3.
    pub fn grant(&mut self, kind: &str, level: i64) -> Result<(), DomainError> {
        let kind: ResourceKind = kind.parse()?;
        let level = PermissionLevel::parse(kind.column(), level)?;
        self.set_permission(kind, level);
        Ok(())
    }

    /// Grant a level on a resource kind
    pub fn set_permission(&mut self, kind: ResourceKind, level: PermissionLevel) {
        self.permissions.set(kind, level);
        self.touch();
    }

    /// Drop every grant back to no access
    pub fn revoke_all(&mut self) {
        self.permissions.revoke_all();
        self.touch();
    }

    /// Update the memo. A memo stays required after creation, so a blank
    /// one is rejected and the current memo kept.
    pub fn set_memo(&mut self, memo: impl Into<String>) -> Result<(), DomainError> {
        let memo = memo.into();

        if memo.trim().is_empty() {
            return Err(DomainError::integrity("memo", "must not be empty"));
        }

        self.memo = memo;
        self.touch();
        Ok(())
    }

    /// Update the IP restriction list
    pub fn set_allowed_ips(&mut self, allowed_ips: Option<AllowedIps>) {
        self.allowed_ips = allowed_ips;
        self.touch();
    }

    /// Record key usage
    pub fn record_usage(&mut self) {
        self.record_usage_at(Utc::now());
    }

    pub fn record_usage_at(&mut self, at: DateTime<Utc>) {
        self.last_used_at = Some(at);
    }

    /// Copy the fields named in `changes` from `source`, plus its
    /// `updated_at`. Everything else keeps this entity's value.
    pub fn apply_changes(&mut self, source: &ApiKey, changes: &KeyChanges) {
        if changes.memo {
            self.memo = source.memo.clone();
        }

        if changes.allowed_ips {
            self.allowed_ips = source.allowed_ips.clone();
        }

        for kind in &changes.permissions {
            self.permissions.set(*kind, source.permission(*kind));
        }

        self.updated_at = source.updated_at;
    }

    /// Projection safe to hand to callers and serializers
    pub fn exposed_view(&self) -> ApiKeyView {
        ApiKeyView {
            identifier: self.identifier.as_str().to_string(),
            owner_id: self.owner_id,
            allowed_ips: self.allowed_ips.as_ref().map(AllowedIps::to_strings),
            memo: self.memo.clone(),
            permissions: self.permissions,
            last_used_at: self.last_used_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn create_test_api_key() -> ApiKey {
        let identifier = KeyIdentifier::new("TestKey000000001").unwrap();
        ApiKey::new(
            identifier,
            EncryptedToken::new(vec![7u8; 48]),
            UserId::new(42),
            "ci-bot",
        )
    }

    #[test]
    fn test_key_identifier_valid() {
        let id = KeyIdentifier::new("abcdEFGH12345678").unwrap();
        assert_eq!(id.as_str(), "abcdEFGH12345678");
    }

    #[test]
    fn test_key_identifier_invalid() {
        assert!(KeyIdentifier::new("").is_err());
        assert!(KeyIdentifier::new("abc").is_err());
        assert!(KeyIdentifier::new("abcdEFGH1234567-").is_err());
        assert!(serde_json::from_str::<KeyIdentifier>("\"too-short\"").is_err());
    }

    #[test]
    fn test_new_key_has_no_access() {
        let key = create_test_api_key();

        for kind in ResourceKind::ALL {
            assert_eq!(key.permission(kind), PermissionLevel::None);
        }
        assert!(key.last_used_at().is_none());
        assert!(key.allowed_ips().is_none());
    }

    #[test]
    fn test_grant_by_name() {
        let mut key = create_test_api_key();

        key.grant("servers", 2).unwrap();

        assert_eq!(key.permission(ResourceKind::Servers), PermissionLevel::Write);
        assert!(key.can(ResourceKind::Servers, PermissionLevel::Read));
        assert!(!key.can(ResourceKind::Servers, PermissionLevel::Delete));
        for kind in ResourceKind::ALL.iter().filter(|k| **k != ResourceKind::Servers) {
            assert_eq!(key.permission(*kind), PermissionLevel::None);
        }
    }

    #[test]
    fn test_grant_rejects_out_of_range_level() {
        let mut key = create_test_api_key();

        for level in [-1, 4, 100] {
            let err = key.grant("nodes", level).unwrap_err();
            assert!(matches!(err, DomainError::IntegrityViolation { .. }));
        }
        assert_eq!(key.permission(ResourceKind::Nodes), PermissionLevel::None);
    }

    #[test]
    fn test_grant_rejects_unknown_kind() {
        let mut key = create_test_api_key();

        let err = key.grant("widgets", 1).unwrap_err();
        assert!(matches!(err, DomainError::UnknownResourceKind { .. }));
    }

    #[test]
    fn test_revoke_all() {
        let mut key = create_test_api_key();
        key.grant("users", 3).unwrap();
        key.grant("eggs", 1).unwrap();

        key.revoke_all();
        assert_eq!(*key.permissions(), PermissionSet::new());
    }

    #[test]
    fn test_allowed_ips() {
        let any: IpAddr = "203.0.113.9".parse().unwrap();
        let inside: IpAddr = "10.1.2.3".parse().unwrap();

        let mut key = create_test_api_key();
        assert!(key.allows_ip(&any));

        key.set_allowed_ips(Some(AllowedIps::parse(["10.0.0.0/8", "192.168.1.10"]).unwrap()));
        assert!(key.allows_ip(&inside));
        assert!(key.allows_ip(&"192.168.1.10".parse().unwrap()));
        assert!(!key.allows_ip(&any));

        key.set_allowed_ips(Some(AllowedIps::default()));
        assert!(key.allows_ip(&any));
    }

    #[test]
    fn test_record_usage() {
        let mut key = create_test_api_key();
        let updated_at = key.updated_at();

        key.record_usage();
        assert!(key.last_used_at().is_some());
        assert_eq!(key.updated_at(), updated_at);
    }

    #[test]
    fn test_exposed_view_omits_token() {
        let mut key = create_test_api_key();
        key.grant("servers", 2).unwrap();

        let value = serde_json::to_value(key.exposed_view()).unwrap();
        let object = value.as_object().unwrap();

        assert!(!object.contains_key("token"));
        assert_eq!(value["identifier"], "TestKey000000001");
        assert_eq!(value["owner_id"], 42);
        assert_eq!(value["permissions"]["servers"], 2);
        assert!(!object.contains_key("last_used_at"));
    }

    #[test]
    fn test_record_roundtrip_preserves_entity() {
        let mut key = create_test_api_key();
        key.grant("databases", 1).unwrap();
        key.set_allowed_ips(Some(AllowedIps::parse(["127.0.0.1"]).unwrap()));

        let restored = ApiKey::from_record(key.to_record()).unwrap();

        assert_eq!(restored.identifier(), key.identifier());
        assert_eq!(restored.token(), key.token());
        assert_eq!(restored.permissions(), key.permissions());
        assert_eq!(restored.allowed_ips(), key.allowed_ips());
        assert_eq!(restored.created_at(), key.created_at());
    }

    #[test]
    fn test_set_memo_rejects_blank() {
        let mut key = create_test_api_key();

        for blank in ["", "   "] {
            let err = key.set_memo(blank).unwrap_err();
            assert_eq!(err.field(), Some("memo"));
        }
        assert_eq!(key.memo(), "ci-bot");

        key.set_memo("renamed").unwrap();
        assert_eq!(key.memo(), "renamed");
    }

    #[test]
    fn test_restore_accepts_stored_row_without_memo() {
        let record = ApiKeyRecord {
            identifier: Some("TestKey000000001".to_string()),
            token: Some(vec![1]),
            owner_id: Some(42),
            memo: None,
            permissions: BTreeMap::from([("servers".to_string(), 2)]),
            ..Default::default()
        };

        let key = ApiKey::restore(record.clone()).unwrap();
        assert_eq!(key.memo(), "");
        assert_eq!(key.permission(ResourceKind::Servers), PermissionLevel::Write);

        let blank = ApiKeyRecord {
            memo: Some(String::new()),
            ..record
        };
        assert!(ApiKey::restore(blank).is_ok());
    }

    #[test]
    fn test_restore_still_checks_integrity() {
        let mut record = create_test_api_key().to_record();
        record.permissions = BTreeMap::from([("servers".to_string(), 7)]);

        let err = ApiKey::restore(record).unwrap_err();
        assert!(matches!(err, DomainError::IntegrityViolation { .. }));
    }

    #[test]
    fn test_apply_changes_copies_only_listed_fields() {
        let mut stored = create_test_api_key();
        stored.grant("nodes", 1).unwrap();

        // stale copy that grants servers only
        let mut edited = create_test_api_key();
        edited.grant("servers", 3).unwrap();
        edited.set_memo("other").unwrap();

        stored.apply_changes(&edited, &KeyChanges::permission(ResourceKind::Servers));

        assert_eq!(stored.permission(ResourceKind::Servers), PermissionLevel::Delete);
        assert_eq!(stored.permission(ResourceKind::Nodes), PermissionLevel::Read);
        assert_eq!(stored.memo(), "ci-bot");
        assert_eq!(stored.updated_at(), edited.updated_at());
    }

    #[test]
    fn test_key_changes() {
        assert!(KeyChanges::default().is_empty());
        assert_eq!(KeyChanges::all_permissions().permissions.len(), ResourceKind::COUNT);

        let changes = KeyChanges::permission(ResourceKind::Eggs).with_permission(ResourceKind::Eggs);
        assert_eq!(changes.permissions, vec![ResourceKind::Eggs]);
        assert!(!changes.is_empty());
    }

    #[test]
    fn test_from_record_rejects_missing_memo() {
        let record = ApiKeyRecord {
            identifier: Some("TestKey000000001".to_string()),
            token: Some(vec![1]),
            owner_id: Some(42),
            permissions: BTreeMap::new(),
            ..Default::default()
        };

        let err = ApiKey::from_record(record).unwrap_err();
        assert!(matches!(err, DomainError::MissingField { ref field } if field == "memo"));
    }
}
