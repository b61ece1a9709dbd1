//! Background task ending live polls whose vote window has elapsed.

use std::time::SystemTime;

use tracing::{info, warn};

use crate::{services::gateway_events::broadcast_poll_ended, services::poll_service, state::SharedState};

/// Run the expiry sweep forever. One tick checks the live poll's deadline
/// and, when it has passed, ends the poll and broadcasts the result.
pub async fn run(state: SharedState) {
    let mut interval = tokio::time::interval(state.config().sweep_interval);
    info!(every = ?state.config().sweep_interval, "expiry sweeper started");

    loop {
        interval.tick().await;

        if state.is_degraded().await {
            continue;
        }

        // Same gate as gateway dispatch, so the sweep's end event cannot
        // interleave with a transition being fanned out.
        let _ordering = state.dispatch_gate().lock().await;
        match poll_service::end_if_expired(&state, SystemTime::now()).await {
            Ok(Some(ended)) => broadcast_poll_ended(&state, &ended),
            Ok(None) => {}
            Err(error) => warn!(%error, "expiry sweep failed, will retry next tick"),
        }
    }
}
