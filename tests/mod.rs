//! Integration tests for swarmplay
//!
//! Tests are organized by component:
//! - session_test: lifecycle, ready race, exit decisions, shutdown
//! - telemetry_test: snapshot formulas against a live fake swarm
//! - render_test: snapshot-to-layout pipeline and peer windowing
//! - player_test: local player supervision and cast non-fatality
//!
//! Shared fake collaborators (engine, content server, player locator) live
//! in common/.

// Note: Each test file is a separate integration test crate
// Tests are run individually by cargo, not via mod.rs
