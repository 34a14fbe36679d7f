//! Per-resource permission grants

use std::collections::BTreeMap;

use serde::ser::{Serialize, Serializer};

use super::level::PermissionLevel;
use super::resource::ResourceKind;
use crate::domain::DomainError;

/// One grant per registered resource kind; unset kinds are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PermissionSet([PermissionLevel; ResourceKind::COUNT]);

impl PermissionSet {
    /// No access to anything
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ResourceKind) -> PermissionLevel {
        self.0[kind.index()]
    }

    pub fn set(&mut self, kind: ResourceKind, level: PermissionLevel) {
        self.0[kind.index()] = level;
    }

    pub fn with(mut self, kind: ResourceKind, level: PermissionLevel) -> Self {
        self.set(kind, level);
        self
    }

    /// Reset every grant to `None`
    pub fn revoke_all(&mut self) {
        self.0 = [PermissionLevel::None; ResourceKind::COUNT];
    }

    /// Whether the grant for `kind` covers `required`
    pub fn allows(&self, kind: ResourceKind, required: PermissionLevel) -> bool {
        self.get(kind).allows(required)
    }

    /// Grants in registry order
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, PermissionLevel)> + '_ {
        ResourceKind::ALL
            .iter()
            .map(move |kind| (*kind, self.get(*kind)))
    }

    /// Build from raw `{name: level}` input.
    ///
    /// Unknown names fail with `UnknownResourceKind`, out of range levels
    /// with `IntegrityViolation` on the kind's column. Kinds absent from the
    /// input stay at `None`.
    pub fn from_raw(raw: &BTreeMap<String, i64>) -> Result<Self, DomainError> {
        let mut permissions = Self::new();

        for (name, value) in raw {
            let kind: ResourceKind = name.parse()?;
            permissions.set(kind, PermissionLevel::parse(kind.column(), *value)?);
        }

        Ok(permissions)
    }

    /// Raw `{name: level}` form covering every registered kind
    pub fn to_raw(&self) -> BTreeMap<String, i64> {
        self.iter()
            .map(|(kind, level)| (kind.as_str().to_string(), level.as_u8() as i64))
            .collect()
    }
}

impl Serialize for PermissionSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(self.iter().map(|(kind, level)| (kind.as_str(), level.as_u8())))
    }
}
