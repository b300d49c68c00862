//! Unit tests for the volume sizing operator
//!
//! This suite covers:
//! - The sizing engine's decision table and clamping behavior
//! - Budget accounting across the rolling 24h window
//! - Maintenance window evaluation
//! - Policy validation and status serialization

#[path = "../common/fixtures.rs"]
mod fixtures;

mod budget;
mod sizing;
mod status;
mod window;
