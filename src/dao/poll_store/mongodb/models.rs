use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{PollEntity, PollState};

/// Wire representation of a poll inside the `polls` collection.
///
/// Tallies stay positional so votes can be counted with a single `$inc` on
/// `tallies.<index>`; the voted set is an array targeted by `$ne`/`$push`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPollDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    question: String,
    options: Vec<String>,
    state: PollState,
    created_by: String,
    tallies: Vec<i64>,
    voted_users: Vec<String>,
    created_at: DateTime,
    activated_at: Option<DateTime>,
    ended_at: Option<DateTime>,
    duration_secs: Option<u64>,
}

impl From<PollEntity> for MongoPollDocument {
    fn from(value: PollEntity) -> Self {
        Self {
            id: value.id,
            question: value.question,
            options: value.options,
            state: value.state,
            created_by: value.created_by,
            tallies: value.tallies.into_iter().map(|count| count as i64).collect(),
            voted_users: value.voted_users,
            created_at: DateTime::from_system_time(value.created_at),
            activated_at: value.activated_at.map(DateTime::from_system_time),
            ended_at: value.ended_at.map(DateTime::from_system_time),
            duration_secs: value.duration_secs,
        }
    }
}

impl From<MongoPollDocument> for PollEntity {
    fn from(value: MongoPollDocument) -> Self {
        Self {
            id: value.id,
            question: value.question,
            options: value.options,
            state: value.state,
            created_by: value.created_by,
            tallies: value
                .tallies
                .into_iter()
                .map(|count| count.max(0) as u64)
                .collect(),
            voted_users: value.voted_users,
            created_at: value.created_at.to_system_time(),
            activated_at: value.activated_at.map(DateTime::to_system_time),
            ended_at: value.ended_at.map(DateTime::to_system_time),
            duration_secs: value.duration_secs,
        }
    }
}

pub fn uuid_as_binary(id: Uuid) -> Binary {
    Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.into_bytes().to_vec(),
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": uuid_as_binary(id)}
}
