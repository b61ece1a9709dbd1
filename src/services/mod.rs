/// Session credential issuing and verification.
pub mod credential_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Event fan-out to connected clients.
pub mod gateway_events;
/// WebSocket connection and action handling.
pub mod gateway_service;
/// Health check service.
pub mod health_service;
/// Poll lifecycle engine.
pub mod poll_service;
/// Storage connection supervisor.
pub mod storage_supervisor;
/// Deadline sweep for live polls.
pub mod sweeper;
