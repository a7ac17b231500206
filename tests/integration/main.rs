//! Integration test binary -- all integration tests consolidated into a single
//! binary to keep link times down.

// Allow unwrap/expect in test code
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

mod alarm_delivery;
mod calendar_commands;
mod conversation;
mod degraded_collaborators;
mod session_ownership;
