//! Principal domain
//!
//! API keys are owned by users of the panel. This core only needs to know
//! whether an owner exists, so the user store is reduced to that contract.

mod entity;
mod repository;

pub use entity::UserId;
pub use repository::UserDirectory;
