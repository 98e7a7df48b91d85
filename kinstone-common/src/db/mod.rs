//! Database models, schema and row decoding

pub mod init;
pub mod migrations;
pub mod models;
pub mod rows;

pub use init::*;
pub use migrations::*;
pub use models::*;
