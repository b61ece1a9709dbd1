//! MongoDB-backed poll store.

mod connection;
mod error;
mod models;
/// Store configuration parsed from a connection URI.
pub mod config;
/// The store implementation itself.
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoPollStore;

use crate::dao::poll_store::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
