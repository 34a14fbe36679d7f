//! Administrative resource kinds

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// An administrative object type subject to permission grants.
///
/// Every consumer matches on this enum exhaustively, so adding a kind
/// forces the storage column, validation and capability checks to be
/// extended together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Users,
    Allocations,
    Databases,
    Eggs,
    Locations,
    Nests,
    Nodes,
    Packs,
    Servers,
}

impl ResourceKind {
    /// Number of registered resource kinds
    pub const COUNT: usize = 9;

    /// All kinds, in registry order
    pub const ALL: [ResourceKind; Self::COUNT] = [
        Self::Users,
        Self::Allocations,
        Self::Databases,
        Self::Eggs,
        Self::Locations,
        Self::Nests,
        Self::Nodes,
        Self::Packs,
        Self::Servers,
    ];

    /// Stable name used in requests and serialized permission maps
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Allocations => "allocations",
            Self::Databases => "databases",
            Self::Eggs => "eggs",
            Self::Locations => "locations",
            Self::Nests => "nests",
            Self::Nodes => "nodes",
            Self::Packs => "packs",
            Self::Servers => "servers",
        }
    }

    /// Column holding this kind's grant in the `api_keys` table
    pub fn column(&self) -> &'static str {
        match self {
            Self::Users => "r_users",
            Self::Allocations => "r_allocations",
            Self::Databases => "r_databases",
            Self::Eggs => "r_eggs",
            Self::Locations => "r_locations",
            Self::Nests => "r_nests",
            Self::Nodes => "r_nodes",
            Self::Packs => "r_packs",
            Self::Servers => "r_servers",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| DomainError::unknown_resource_kind(s))
    }
}

/// Registered resource kinds in registry order
pub fn list_resource_kinds() -> &'static [ResourceKind] {
    &ResourceKind::ALL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_complete_and_ordered() {
        let kinds = list_resource_kinds();
        assert_eq!(kinds.len(), 9);
        assert_eq!(kinds[0], ResourceKind::Users);
        assert_eq!(kinds[8], ResourceKind::Servers);

        for (position, kind) in kinds.iter().enumerate() {
            assert_eq!(kind.index(), position);
        }
    }

    #[test]
    fn test_parse_known_kind() {
        assert_eq!("servers".parse::<ResourceKind>().unwrap(), ResourceKind::Servers);
        assert_eq!("eggs".parse::<ResourceKind>().unwrap(), ResourceKind::Eggs);
    }

    #[test]
    fn test_parse_unknown_kind() {
        let err = "widgets".parse::<ResourceKind>().unwrap_err();
        assert!(matches!(err, DomainError::UnknownResourceKind { ref kind } if kind == "widgets"));

        // names are case sensitive, same as the stored column suffixes
        assert!("Servers".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_columns_follow_names() {
        for kind in list_resource_kinds() {
            assert_eq!(kind.column(), format!("r_{}", kind.as_str()));
        }
    }
}
