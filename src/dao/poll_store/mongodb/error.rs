use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Errors raised by the MongoDB poll store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to insert poll `{id}`")]
    InsertPoll {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load poll `{id}`")]
    LoadPoll {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to list polls")]
    ListPolls {
        #[source]
        source: MongoError,
    },
    #[error("failed to apply transition to poll `{id}`")]
    TransitionPoll {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to record vote on poll `{id}`")]
    RecordVote {
        id: Uuid,
        #[source]
        source: MongoError,
    },
}
