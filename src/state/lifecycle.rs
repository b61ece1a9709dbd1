//! Pure transition rules for the poll lifecycle.
//!
//! Transitions are one-directional: draft → live → ended. A poll never
//! returns to draft, and an ended poll accepts no further events.

use thiserror::Error;

use crate::dao::models::PollState;

/// Events that can be applied to a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A teacher (or a superseding activation) takes the poll live.
    Activate,
    /// A teacher ends the poll, or the deadline forces it to end.
    End,
    /// A student casts a vote; the state is unchanged but must be live.
    Vote,
}

/// Error returned when an event is not legal in the current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {event} a poll that is {from}")]
pub struct InvalidTransition {
    /// State the poll was in when the event arrived.
    pub from: PollState,
    /// The rejected event.
    pub event: LifecycleEvent,
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LifecycleEvent::Activate => "activate",
            LifecycleEvent::End => "end",
            LifecycleEvent::Vote => "vote on",
        };
        f.write_str(label)
    }
}

/// Compute the state after applying `event`, or reject the transition.
pub fn next_state(from: PollState, event: LifecycleEvent) -> Result<PollState, InvalidTransition> {
    match (from, event) {
        (PollState::Draft, LifecycleEvent::Activate) => Ok(PollState::Live),
        (PollState::Live, LifecycleEvent::End) => Ok(PollState::Ended),
        (PollState::Live, LifecycleEvent::Vote) => Ok(PollState::Live),
        (from, event) => Err(InvalidTransition { from, event }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_one_directional() {
        let live = next_state(PollState::Draft, LifecycleEvent::Activate).unwrap();
        assert_eq!(live, PollState::Live);
        let ended = next_state(live, LifecycleEvent::End).unwrap();
        assert_eq!(ended, PollState::Ended);
    }

    #[test]
    fn voting_keeps_the_poll_live() {
        assert_eq!(
            next_state(PollState::Live, LifecycleEvent::Vote),
            Ok(PollState::Live)
        );
    }

    #[test]
    fn ended_is_terminal() {
        for event in [
            LifecycleEvent::Activate,
            LifecycleEvent::End,
            LifecycleEvent::Vote,
        ] {
            assert!(next_state(PollState::Ended, event).is_err());
        }
    }

    #[test]
    fn draft_rejects_votes_and_ending() {
        assert!(next_state(PollState::Draft, LifecycleEvent::Vote).is_err());
        assert!(next_state(PollState::Draft, LifecycleEvent::End).is_err());
    }

    #[test]
    fn rejection_names_state_and_event() {
        let err = next_state(PollState::Ended, LifecycleEvent::Vote).unwrap_err();
        assert_eq!(err.to_string(), "cannot vote on a poll that is ended");
    }
}
