pub mod aggregates;
pub mod connection;
pub mod items;
pub mod models;
pub mod rating_config;
pub mod reviews;
pub mod setup;
pub mod store;

pub use connection::{create_pool, get_connection, DbConn, DbPool};
pub use models::*;
pub use store::SqliteStore;
