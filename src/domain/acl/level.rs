//! Ordinal permission levels

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Highest grantable level
pub const MAX_PERMISSION_LEVEL: u8 = 3;

/// Cumulative access level for one resource kind.
///
/// A level implies every capability of the levels below it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "u8")]
pub enum PermissionLevel {
    #[default]
    None = 0,
    Read = 1,
    Write = 2,
    Delete = 3,
}

impl PermissionLevel {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn can_read(&self) -> bool {
        *self >= Self::Read
    }

    pub fn can_write(&self) -> bool {
        *self >= Self::Write
    }

    pub fn can_delete(&self) -> bool {
        *self >= Self::Delete
    }

    /// Whether this grant covers an action that needs `required`
    pub fn allows(&self, required: PermissionLevel) -> bool {
        *self >= required
    }

    /// Parse a raw stored or requested value, naming `field` on failure
    pub fn parse(field: &str, value: i64) -> Result<Self, DomainError> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Read),
            2 => Ok(Self::Write),
            3 => Ok(Self::Delete),
            other => Err(DomainError::integrity(
                field,
                format!(
                    "permission level {} is outside 0..={}",
                    other, MAX_PERMISSION_LEVEL
                ),
            )),
        }
    }
}

impl TryFrom<i64> for PermissionLevel {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::parse("permission", value)
    }
}

impl From<PermissionLevel> for u8 {
    fn from(level: PermissionLevel) -> Self {
        level.as_u8()
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// The ordinal ceiling of the permission scale
pub fn max_permission_level() -> PermissionLevel {
    PermissionLevel::Delete
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_cumulative() {
        assert!(!PermissionLevel::None.can_read());
        assert!(PermissionLevel::Read.can_read());
        assert!(!PermissionLevel::Read.can_write());
        assert!(PermissionLevel::Write.can_read());
        assert!(PermissionLevel::Write.can_write());
        assert!(!PermissionLevel::Write.can_delete());
        assert!(PermissionLevel::Delete.can_delete());
        assert!(PermissionLevel::Delete.allows(PermissionLevel::Read));
    }

    #[test]
    fn test_parse_range() {
        for value in 0..=3 {
            assert_eq!(PermissionLevel::parse("r_nodes", value).unwrap().as_u8() as i64, value);
        }

        for value in [-1, 4, 255] {
            let err = PermissionLevel::parse("r_nodes", value).unwrap_err();
            assert!(matches!(err, DomainError::IntegrityViolation { ref field, .. } if field == "r_nodes"));
        }
    }

    #[test]
    fn test_max_level() {
        assert_eq!(max_permission_level().as_u8(), MAX_PERMISSION_LEVEL);
    }

    #[test]
    fn test_serde_as_integer() {
        let json = serde_json::to_string(&PermissionLevel::Write).unwrap();
        assert_eq!(json, "2");

        let level: PermissionLevel = serde_json::from_str("1").unwrap();
        assert_eq!(level, PermissionLevel::Read);
        assert!(serde_json::from_str::<PermissionLevel>("7").is_err());
    }
}
