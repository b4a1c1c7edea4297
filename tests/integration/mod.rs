//! Integration Tests Module
//!
//! End-to-end tests for Agent Timeline: event sequences through the reducer,
//! abort coordination under paused time, metadata reconstruction, and the
//! command surface with recording transport doubles.

// Event sequences applied through the channel reducer
mod reducer_scenarios_test;

// Abort request, acknowledgement, and local timeout
mod abort_test;

// Execution rebuild and history seeding
mod reconstruct_test;

// Commands and the channel manager
mod commands_test;
