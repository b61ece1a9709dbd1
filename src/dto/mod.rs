//! Data transfer objects exchanged over the REST and websocket surfaces.

pub mod auth;
pub mod health;
pub mod poll;
pub mod ws;

use std::time::SystemTime;

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Render a timestamp as RFC 3339 for client payloads.
pub fn format_system_time(value: SystemTime) -> String {
    let datetime = OffsetDateTime::from(value);
    datetime
        .format(&Rfc3339)
        .unwrap_or_else(|_| datetime.to_string())
}
