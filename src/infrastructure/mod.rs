//! Infrastructure layer - Storage, encryption and service implementations

pub mod api_key;
pub mod encryption;
pub mod logging;
pub mod storage;
pub mod user;
