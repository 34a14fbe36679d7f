//! Raw, unvalidated form of an API key row

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

/// Flat field-by-field view of an API key, as it arrives from a create
/// request or a database row.
///
/// Every field is optional so the validation policy can report exactly
/// which one is missing or malformed. `permissions` is keyed by resource
/// kind name; kinds not present are treated as level 0.
#[derive(Clone, Default)]
pub struct ApiKeyRecord {
    pub identifier: Option<String>,
    pub token: Option<Vec<u8>>,
    pub owner_id: Option<i64>,
    pub allowed_ips: Option<serde_json::Value>,
    pub memo: Option<String>,
    pub permissions: BTreeMap<String, i64>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for ApiKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyRecord")
            .field("identifier", &self.identifier)
            .field("token", &self.token.as_ref().map(|t| format!("<{} bytes>", t.len())))
            .field("owner_id", &self.owner_id)
            .field("allowed_ips", &self.allowed_ips)
            .field("memo", &self.memo)
            .field("permissions", &self.permissions)
            .field("last_used_at", &self.last_used_at)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_token_bytes() {
        let record = ApiKeyRecord {
            token: Some(b"ciphertext-bytes".to_vec()),
            ..Default::default()
        };

        let debug = format!("{:?}", record);
        assert!(debug.contains("<16 bytes>"));
        assert!(!debug.contains("99, 105"));
    }
}
