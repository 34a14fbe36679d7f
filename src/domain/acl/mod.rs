//! Admin ACL registry
//!
//! The fixed set of administrative resource kinds an API key can be granted
//! access to, and the ordinal scale those grants are measured on.

mod level;
mod permissions;
mod resource;

pub use level::{max_permission_level, PermissionLevel, MAX_PERMISSION_LEVEL};
pub use permissions::PermissionSet;
pub use resource::{list_resource_kinds, ResourceKind};
