pub mod host;
pub mod metadata;
pub mod user;
