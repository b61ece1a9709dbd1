use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, doc},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoPollDocument, doc_id},
};
use crate::dao::{
    models::{PollEntity, PollState},
    poll_store::{
        ActivationOutcome, PollStore, StorageResult, TransitionOutcome, VoteOutcome,
    },
};

const POLL_COLLECTION_NAME: &str = "polls";

/// Poll store backed by a MongoDB collection.
///
/// Lifecycle transitions and vote counting are expressed as conditional
/// `findAndModify` updates, so concurrent writers are serialized by the
/// database rather than by process-local locks. A partial unique index on
/// `state == "live"` enforces the single-live-poll invariant even across
/// several backend instances.
#[derive(Clone)]
pub struct MongoPollStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoPollStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.collection().await;

        // At most one document may carry state == "live"; this backs the
        // single-live-poll invariant at the storage boundary.
        let live_index = IndexModel::builder()
            .keys(doc! {"state": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("single_live_poll_idx".to_owned()))
                    .unique(Some(true))
                    .partial_filter_expression(Some(doc! {"state": "live"}))
                    .build(),
            )
            .build();

        collection
            .create_index(live_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: POLL_COLLECTION_NAME,
                index: "state(live)",
                source,
            })?;

        let creator_index = IndexModel::builder()
            .keys(doc! {"created_by": 1, "created_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("poll_creator_idx".to_owned()))
                    .build(),
            )
            .build();

        collection
            .create_index(creator_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: POLL_COLLECTION_NAME,
                index: "created_by,created_at",
                source,
            })?;

        Ok(())
    }

    async fn collection(&self) -> Collection<MongoPollDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoPollDocument>(POLL_COLLECTION_NAME)
    }

    async fn insert_poll(&self, poll: PollEntity) -> MongoResult<()> {
        let id = poll.id;
        let document: MongoPollDocument = poll.into();
        let collection = self.collection().await;
        collection
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::InsertPoll { id, source })?;
        Ok(())
    }

    async fn find_poll(&self, id: Uuid) -> MongoResult<Option<PollEntity>> {
        let collection = self.collection().await;
        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadPoll { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn find_by_state(&self, state: PollState) -> MongoResult<Vec<PollEntity>> {
        let collection = self.collection().await;
        let documents: Vec<MongoPollDocument> = collection
            .find(doc! {"state": state.to_string()})
            .sort(doc! {"created_at": -1})
            .await
            .map_err(|source| MongoDaoError::ListPolls { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListPolls { source })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn list_polls(&self) -> MongoResult<Vec<PollEntity>> {
        let collection = self.collection().await;
        let documents: Vec<MongoPollDocument> = collection
            .find(doc! {})
            .sort(doc! {"created_at": -1})
            .await
            .map_err(|source| MongoDaoError::ListPolls { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListPolls { source })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn begin_live(&self, id: Uuid, now: SystemTime) -> MongoResult<ActivationOutcome> {
        let collection = self.collection().await;
        let stamp = DateTime::from_system_time(now);

        let mut draft_filter = doc_id(id);
        draft_filter.insert("state", "draft");
        let promote = doc! {"$set": {"state": "live", "activated_at": stamp}};

        // Promote the target first, conditioned on it being a draft. The
        // partial unique index rejects a second live document, so this only
        // succeeds while nothing else is live. A rejected activation must
        // never touch the currently live poll.
        match collection
            .find_one_and_update(draft_filter.clone(), promote.clone())
            .return_document(ReturnDocument::After)
            .await
        {
            Ok(Some(document)) => {
                return Ok(ActivationOutcome::Activated {
                    poll: document.into(),
                    superseded: None,
                });
            }
            Ok(None) => {
                // Target missing or not a draft; nothing was modified.
                return match self.find_poll(id).await? {
                    None => Ok(ActivationOutcome::NotFound),
                    Some(existing) => Ok(ActivationOutcome::NotDraft(existing.state)),
                };
            }
            // The target is a valid draft but the live slot is taken.
            Err(err) if is_duplicate_key(&err) => {}
            Err(source) => return Err(MongoDaoError::TransitionPoll { id, source }),
        }

        // End the poll holding the live slot, then promote again.
        let superseded: Option<PollEntity> = collection
            .find_one_and_update(
                doc! {"state": "live"},
                doc! {"$set": {"state": "ended", "ended_at": stamp}},
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::TransitionPoll { id, source })?
            .map(Into::into);

        match collection
            .find_one_and_update(draft_filter, promote)
            .return_document(ReturnDocument::After)
            .await
        {
            Ok(Some(document)) => Ok(ActivationOutcome::Activated {
                poll: document.into(),
                superseded,
            }),
            Ok(None) => match self.find_poll(id).await? {
                None => Ok(ActivationOutcome::NotFound),
                Some(existing) => Ok(ActivationOutcome::NotDraft(existing.state)),
            },
            // Another process slipped a live poll in between the two steps.
            Err(err) if is_duplicate_key(&err) => Ok(ActivationOutcome::LiveConflict),
            Err(source) => Err(MongoDaoError::TransitionPoll { id, source }),
        }
    }

    async fn end_live(&self, id: Uuid, now: SystemTime) -> MongoResult<TransitionOutcome> {
        let collection = self.collection().await;
        let stamp = DateTime::from_system_time(now);

        let mut filter = doc_id(id);
        filter.insert("state", "live");

        let ended: Option<PollEntity> = collection
            .find_one_and_update(
                filter,
                doc! {"$set": {"state": "ended", "ended_at": stamp}},
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::TransitionPoll { id, source })?
            .map(Into::into);

        match ended {
            Some(poll) => Ok(TransitionOutcome::Ended(poll)),
            None => match self.find_poll(id).await? {
                None => Ok(TransitionOutcome::NotFound),
                Some(existing) => Ok(TransitionOutcome::NotLive(existing.state)),
            },
        }
    }

    async fn record_vote(
        &self,
        id: Uuid,
        voter: String,
        option_index: usize,
    ) -> MongoResult<VoteOutcome> {
        let collection = self.collection().await;

        let mut filter = doc_id(id);
        filter.insert("state", "live");
        filter.insert("voted_users", doc! {"$ne": voter.clone()});

        let tally_field = format!("tallies.{option_index}");
        let updated: Option<PollEntity> = collection
            .find_one_and_update(
                filter,
                doc! {"$inc": {tally_field: 1}, "$push": {"voted_users": voter.clone()}},
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::RecordVote { id, source })?
            .map(Into::into);

        if let Some(poll) = updated {
            return Ok(VoteOutcome::Recorded(poll));
        }

        // The conditional update matched nothing; read back to tell the
        // caller exactly which precondition failed.
        match self.find_poll(id).await? {
            None => Ok(VoteOutcome::NotFound),
            Some(existing) if existing.state != PollState::Live => {
                Ok(VoteOutcome::NotLive(existing.state))
            }
            Some(_) => Ok(VoteOutcome::DuplicateVote),
        }
    }
}

impl PollStore for MongoPollStore {
    fn insert_poll(&self, poll: PollEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_poll(poll).await.map_err(Into::into) })
    }

    fn find_poll(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<PollEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_poll(id).await.map_err(Into::into) })
    }

    fn find_by_state(
        &self,
        state: PollState,
    ) -> BoxFuture<'static, StorageResult<Vec<PollEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_by_state(state).await.map_err(Into::into) })
    }

    fn list_polls(&self) -> BoxFuture<'static, StorageResult<Vec<PollEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_polls().await.map_err(Into::into) })
    }

    fn begin_live(
        &self,
        id: Uuid,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<ActivationOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.begin_live(id, now).await.map_err(Into::into) })
    }

    fn end_live(
        &self,
        id: Uuid,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<TransitionOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.end_live(id, now).await.map_err(Into::into) })
    }

    fn record_vote(
        &self,
        id: Uuid,
        voter: String,
        option_index: usize,
    ) -> BoxFuture<'static, StorageResult<VoteOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .record_vote(id, voter, option_index)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_err)) => write_err.code == 11000,
        ErrorKind::Command(command_err) => command_err.code == 11000,
        _ => false,
    }
}
