//! Poll lifecycle engine.
//!
//! Every operation checks the caller's role, loads through the installed
//! [`PollStore`](crate::dao::poll_store::PollStore), and maps storage outcomes
//! to precise [`ServiceError`] variants. Races are resolved by the store's
//! conditional updates; this module decides and reports, it does not lock.

use std::time::SystemTime;

use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{
        models::{PollEntity, PollState},
        poll_store::{ActivationOutcome, TransitionOutcome, VoteOutcome},
    },
    dto::poll::CreatePollRequest,
    error::ServiceError,
    services::credential_service::{Identity, Role},
    state::SharedState,
};

/// Result of a successful activation.
#[derive(Debug, Clone)]
pub struct ActivatedPoll {
    /// The poll that just went live.
    pub poll: PollEntity,
    /// The previously live poll that was force-ended, if any.
    pub superseded: Option<PollEntity>,
}

fn ensure_role(identity: &Identity, required: Role, action: &str) -> Result<(), ServiceError> {
    if identity.role == required {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(format!(
            "only a {required} may {action}"
        )))
    }
}

/// Create a draft poll. Teacher only.
pub async fn create_poll(
    state: &SharedState,
    identity: &Identity,
    request: CreatePollRequest,
) -> Result<PollEntity, ServiceError> {
    ensure_role(identity, Role::Teacher, "create a poll")?;

    request
        .validate()
        .map_err(|err| ServiceError::InvalidInput(format!("validation failed: {err}")))?;

    let question = request.question.trim().to_owned();
    if question.is_empty() {
        return Err(ServiceError::InvalidInput("question must not be blank".into()));
    }

    let mut options = Vec::with_capacity(request.options.len());
    for option in &request.options {
        let trimmed = option.trim();
        if trimmed.is_empty() {
            return Err(ServiceError::InvalidInput("options must not be blank".into()));
        }
        if options.iter().any(|existing: &String| existing == trimmed) {
            return Err(ServiceError::InvalidInput(format!(
                "duplicate option `{trimmed}`"
            )));
        }
        options.push(trimmed.to_owned());
    }

    let poll = PollEntity::new(
        question,
        options,
        identity.user_id.clone(),
        request.duration_secs,
    );

    let store = state.require_poll_store().await?;
    store.insert_poll(poll.clone()).await?;

    info!(poll = %poll.id, creator = %identity.user_id, "poll created");
    Ok(poll)
}

/// Promote a draft to live, force-ending any currently live poll. Teacher
/// only.
pub async fn activate_poll(
    state: &SharedState,
    identity: &Identity,
    poll_id: Uuid,
) -> Result<ActivatedPoll, ServiceError> {
    ensure_role(identity, Role::Teacher, "activate a poll")?;

    let store = state.require_poll_store().await?;
    match store.begin_live(poll_id, SystemTime::now()).await? {
        ActivationOutcome::Activated { poll, superseded } => {
            if let Some(previous) = &superseded {
                info!(poll = %poll.id, superseded = %previous.id, "poll activated, previous live poll ended");
            } else {
                info!(poll = %poll.id, "poll activated");
            }
            Ok(ActivatedPoll { poll, superseded })
        }
        ActivationOutcome::NotFound => {
            Err(ServiceError::NotFound(format!("poll {poll_id} does not exist")))
        }
        ActivationOutcome::NotDraft(from) => Err(ServiceError::InvalidState(format!(
            "cannot activate a poll that is {from}"
        ))),
        ActivationOutcome::LiveConflict => Err(ServiceError::InvalidState(
            "another poll went live concurrently".into(),
        )),
    }
}

/// End the live poll, freezing its results. Teacher only.
pub async fn end_poll(
    state: &SharedState,
    identity: &Identity,
    poll_id: Uuid,
) -> Result<PollEntity, ServiceError> {
    ensure_role(identity, Role::Teacher, "end a poll")?;

    let store = state.require_poll_store().await?;
    match store.end_live(poll_id, SystemTime::now()).await? {
        TransitionOutcome::Ended(poll) => {
            info!(poll = %poll.id, total_votes = poll.total_votes(), "poll ended");
            Ok(poll)
        }
        TransitionOutcome::NotFound => {
            Err(ServiceError::NotFound(format!("poll {poll_id} does not exist")))
        }
        TransitionOutcome::NotLive(from) => Err(ServiceError::InvalidState(format!(
            "cannot end a poll that is {from}"
        ))),
    }
}

/// Cast a vote on a live poll. Student only.
pub async fn submit_vote(
    state: &SharedState,
    identity: &Identity,
    poll_id: Uuid,
    option: &str,
) -> Result<PollEntity, ServiceError> {
    submit_vote_at(state, identity, poll_id, option, SystemTime::now()).await
}

/// Vote with an explicit clock. Preconditions are checked in a fixed order
/// (existence, liveness, deadline, duplicate, option) so a request failing
/// several at once reports the most fundamental one.
pub(crate) async fn submit_vote_at(
    state: &SharedState,
    identity: &Identity,
    poll_id: Uuid,
    option: &str,
    now: SystemTime,
) -> Result<PollEntity, ServiceError> {
    ensure_role(identity, Role::Student, "vote")?;

    let store = state.require_poll_store().await?;
    let poll = store
        .find_poll(poll_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("poll {poll_id} does not exist")))?;

    if poll.state != PollState::Live {
        return Err(ServiceError::InvalidState(format!(
            "cannot vote on a poll that is {}",
            poll.state
        )));
    }

    if poll.is_expired(now) {
        // The window elapsed before the sweeper noticed; end the poll here
        // and hand the final snapshot back so the gateway can broadcast it.
        return match store.end_live(poll_id, now).await? {
            TransitionOutcome::Ended(ended) => Err(ServiceError::Expired(Box::new(ended))),
            _ => Err(ServiceError::InvalidState(
                "cannot vote on a poll that is ended".into(),
            )),
        };
    }

    if poll.has_voted(&identity.user_id) {
        return Err(ServiceError::DuplicateVote(format!(
            "{} has already voted on poll {poll_id}",
            identity.user_id
        )));
    }

    let option_index = poll.option_index(option).ok_or_else(|| {
        ServiceError::InvalidInput(format!("`{option}` is not an option of poll {poll_id}"))
    })?;

    match store
        .record_vote(poll_id, identity.user_id.clone(), option_index)
        .await?
    {
        VoteOutcome::Recorded(poll) => {
            info!(poll = %poll.id, voter = %identity.user_id, "vote recorded");
            Ok(poll)
        }
        VoteOutcome::NotFound => {
            Err(ServiceError::NotFound(format!("poll {poll_id} does not exist")))
        }
        VoteOutcome::NotLive(from) => Err(ServiceError::InvalidState(format!(
            "cannot vote on a poll that is {from}"
        ))),
        VoteOutcome::DuplicateVote => Err(ServiceError::DuplicateVote(format!(
            "{} has already voted on poll {poll_id}",
            identity.user_id
        ))),
    }
}

/// End the live poll if its deadline has passed. Returns the ended snapshot
/// when a transition happened. Used by the expiry sweeper.
pub async fn end_if_expired(
    state: &SharedState,
    now: SystemTime,
) -> Result<Option<PollEntity>, ServiceError> {
    let store = state.require_poll_store().await?;
    let live = store.find_by_state(PollState::Live).await?;

    for poll in live {
        if !poll.is_expired(now) {
            continue;
        }
        match store.end_live(poll.id, now).await? {
            TransitionOutcome::Ended(ended) => {
                info!(poll = %ended.id, "poll ended by deadline");
                return Ok(Some(ended));
            }
            // Lost the race to a manual end or another sweeper; fine.
            TransitionOutcome::NotFound | TransitionOutcome::NotLive(_) => {}
        }
    }
    Ok(None)
}

/// List polls visible to the caller: teachers see everything, students see
/// only the live poll.
pub async fn list_polls(
    state: &SharedState,
    identity: &Identity,
) -> Result<Vec<PollEntity>, ServiceError> {
    let store = state.require_poll_store().await?;
    match identity.role {
        Role::Teacher => Ok(store.list_polls().await?),
        Role::Student => Ok(store.find_by_state(PollState::Live).await?),
    }
}

async fn load_poll(state: &SharedState, poll_id: Uuid) -> Result<PollEntity, ServiceError> {
    let store = state.require_poll_store().await?;
    store
        .find_poll(poll_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("poll {poll_id} does not exist")))
}

/// Fetch a single poll. Students only see a poll while it is live or after
/// they voted on it.
pub async fn fetch_poll(
    state: &SharedState,
    identity: &Identity,
    poll_id: Uuid,
) -> Result<PollEntity, ServiceError> {
    let poll = load_poll(state, poll_id).await?;

    match identity.role {
        Role::Teacher => Ok(poll),
        Role::Student => {
            if poll.state == PollState::Live || poll.has_voted(&identity.user_id) {
                Ok(poll)
            } else {
                // Hidden polls do not reveal their existence.
                Err(ServiceError::NotFound(format!("poll {poll_id} does not exist")))
            }
        }
    }
}

/// Fetch aggregated results. Students only see results of a poll they voted
/// on or one that has ended.
pub async fn fetch_results(
    state: &SharedState,
    identity: &Identity,
    poll_id: Uuid,
) -> Result<PollEntity, ServiceError> {
    let poll = load_poll(state, poll_id).await?;

    if identity.role == Role::Teacher {
        return Ok(poll);
    }

    match poll.state {
        PollState::Ended => Ok(poll),
        PollState::Live if poll.has_voted(&identity.user_id) => Ok(poll),
        PollState::Live => Err(ServiceError::Unauthorized(
            "vote before viewing live results".into(),
        )),
        PollState::Draft => Err(ServiceError::NotFound(format!(
            "poll {poll_id} does not exist"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::poll_store::memory::MemoryPollStore,
        state::AppState,
    };

    async fn test_state() -> SharedState {
        let state = AppState::new(AppConfig::default());
        state
            .install_poll_store(Arc::new(MemoryPollStore::default()))
            .await;
        state
    }

    fn teacher() -> Identity {
        Identity {
            user_id: "teacher-1".into(),
            role: Role::Teacher,
        }
    }

    fn student(n: u32) -> Identity {
        Identity {
            user_id: format!("student-{n}"),
            role: Role::Student,
        }
    }

    fn color_poll() -> CreatePollRequest {
        CreatePollRequest {
            question: "Color?".into(),
            options: vec!["Red".into(), "Blue".into()],
            duration_secs: None,
        }
    }

    async fn live_poll(state: &SharedState, request: CreatePollRequest) -> PollEntity {
        let poll = create_poll(state, &teacher(), request).await.unwrap();
        activate_poll(state, &teacher(), poll.id).await.unwrap().poll
    }

    #[tokio::test]
    async fn teacher_creates_a_draft() {
        let state = test_state().await;
        let poll = create_poll(&state, &teacher(), color_poll()).await.unwrap();
        assert_eq!(poll.state, PollState::Draft);
        assert_eq!(poll.options, vec!["Red".to_string(), "Blue".to_string()]);
        assert_eq!(poll.created_by, "teacher-1");
    }

    #[tokio::test]
    async fn student_cannot_create() {
        let state = test_state().await;
        let err = create_poll(&state, &student(1), color_poll())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn duplicate_options_are_rejected() {
        let state = test_state().await;
        let request = CreatePollRequest {
            question: "Color?".into(),
            options: vec!["Red".into(), " Red ".into()],
            duration_secs: None,
        };
        let err = create_poll(&state, &teacher(), request).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn too_few_options_are_rejected() {
        let state = test_state().await;
        let request = CreatePollRequest {
            question: "Color?".into(),
            options: vec!["Red".into()],
            duration_secs: None,
        };
        let err = create_poll(&state, &teacher(), request).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn out_of_range_duration_is_rejected() {
        let state = test_state().await;
        let request = CreatePollRequest {
            duration_secs: Some(5),
            ..color_poll()
        };
        let err = create_poll(&state, &teacher(), request).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn activation_supersedes_the_live_poll() {
        let state = test_state().await;
        let first = live_poll(&state, color_poll()).await;

        let second = create_poll(&state, &teacher(), color_poll()).await.unwrap();
        let activated = activate_poll(&state, &teacher(), second.id).await.unwrap();

        assert_eq!(activated.poll.state, PollState::Live);
        let superseded = activated.superseded.unwrap();
        assert_eq!(superseded.id, first.id);
        assert_eq!(superseded.state, PollState::Ended);
    }

    #[tokio::test]
    async fn failed_activation_leaves_the_live_poll_running() {
        let state = test_state().await;
        let poll = live_poll(&state, color_poll()).await;

        // Double-clicked activate: the second call targets a poll that is
        // already live.
        let err = activate_poll(&state, &teacher(), poll.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let err = activate_poll(&state, &teacher(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let current = fetch_poll(&state, &teacher(), poll.id).await.unwrap();
        assert_eq!(current.state, PollState::Live);
        assert!(current.ended_at.is_none());
    }

    #[tokio::test]
    async fn ended_poll_cannot_be_reactivated() {
        let state = test_state().await;
        let poll = live_poll(&state, color_poll()).await;
        end_poll(&state, &teacher(), poll.id).await.unwrap();

        let err = activate_poll(&state, &teacher(), poll.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn ending_twice_fails() {
        let state = test_state().await;
        let poll = live_poll(&state, color_poll()).await;
        end_poll(&state, &teacher(), poll.id).await.unwrap();

        let err = end_poll(&state, &teacher(), poll.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn votes_accumulate_per_option() {
        let state = test_state().await;
        let poll = live_poll(&state, color_poll()).await;

        submit_vote(&state, &student(1), poll.id, "Red").await.unwrap();
        submit_vote(&state, &student(2), poll.id, "Red").await.unwrap();
        let latest = submit_vote(&state, &student(3), poll.id, "Blue")
            .await
            .unwrap();

        assert_eq!(latest.tallies, vec![2, 1]);
        assert_eq!(latest.total_votes(), 3);
    }

    #[tokio::test]
    async fn second_vote_by_same_student_is_rejected() {
        let state = test_state().await;
        let poll = live_poll(&state, color_poll()).await;

        submit_vote(&state, &student(1), poll.id, "Red").await.unwrap();
        let err = submit_vote(&state, &student(1), poll.id, "Blue")
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::DuplicateVote(_)));
        let latest = fetch_poll(&state, &teacher(), poll.id).await.unwrap();
        assert_eq!(latest.total_votes(), 1);
    }

    #[tokio::test]
    async fn teacher_cannot_vote() {
        let state = test_state().await;
        let poll = live_poll(&state, color_poll()).await;
        let err = submit_vote(&state, &teacher(), poll.id, "Red")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn vote_on_draft_is_rejected() {
        let state = test_state().await;
        let poll = create_poll(&state, &teacher(), color_poll()).await.unwrap();
        let err = submit_vote(&state, &student(1), poll.id, "Red")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn vote_for_unknown_option_is_rejected() {
        let state = test_state().await;
        let poll = live_poll(&state, color_poll()).await;
        let err = submit_vote(&state, &student(1), poll.id, "Green")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn late_vote_force_ends_the_poll() {
        let state = test_state().await;
        let request = CreatePollRequest {
            duration_secs: Some(15),
            ..color_poll()
        };
        let poll = live_poll(&state, request).await;

        let after_deadline = SystemTime::now() + Duration::from_secs(20);
        let err = submit_vote_at(&state, &student(1), poll.id, "Red", after_deadline)
            .await
            .unwrap_err();

        let ServiceError::Expired(ended) = err else {
            panic!("expected the expired variant, got {err:?}");
        };
        assert_eq!(ended.id, poll.id);
        assert_eq!(ended.state, PollState::Ended);

        let stored = fetch_poll(&state, &teacher(), poll.id).await.unwrap();
        assert_eq!(stored.state, PollState::Ended);
        assert_eq!(stored.total_votes(), 0);
    }

    #[tokio::test]
    async fn sweeper_ends_expired_polls_only() {
        let state = test_state().await;
        let request = CreatePollRequest {
            duration_secs: Some(15),
            ..color_poll()
        };
        let poll = live_poll(&state, request).await;

        assert!(end_if_expired(&state, SystemTime::now()).await.unwrap().is_none());

        let swept = end_if_expired(&state, SystemTime::now() + Duration::from_secs(20))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(swept.id, poll.id);
        assert_eq!(swept.state, PollState::Ended);
    }

    #[tokio::test]
    async fn students_only_list_the_live_poll() {
        let state = test_state().await;
        let draft = create_poll(&state, &teacher(), color_poll()).await.unwrap();
        let live = live_poll(&state, color_poll()).await;

        let seen_by_student = list_polls(&state, &student(1)).await.unwrap();
        assert_eq!(seen_by_student.len(), 1);
        assert_eq!(seen_by_student[0].id, live.id);

        let seen_by_teacher = list_polls(&state, &teacher()).await.unwrap();
        assert_eq!(seen_by_teacher.len(), 2);

        let err = fetch_poll(&state, &student(1), draft.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn live_results_require_a_vote_from_students() {
        let state = test_state().await;
        let poll = live_poll(&state, color_poll()).await;

        let err = fetch_results(&state, &student(1), poll.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        submit_vote(&state, &student(1), poll.id, "Red").await.unwrap();
        let results = fetch_results(&state, &student(1), poll.id).await.unwrap();
        assert_eq!(results.total_votes(), 1);

        end_poll(&state, &teacher(), poll.id).await.unwrap();
        let after_end = fetch_results(&state, &student(2), poll.id).await;
        assert!(after_end.is_ok());
    }

    #[tokio::test]
    async fn operations_fail_while_degraded() {
        let state = AppState::new(AppConfig::default());
        let err = create_poll(&state, &teacher(), color_poll())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
    }
}
