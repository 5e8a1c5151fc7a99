//! Integration test suite for Switchyard.
//!
//! These tests drive the public API from a task batch through routing,
//! planning and execution, checking that the pieces agree with each other.
//!
//! # Test Categories
//!
//! - `routing`: classification and worker selection over the default roster
//! - `planning`: group layout, tier barrier and planning errors
//! - `coordination`: concurrent execution, retries, timeouts and aborts
//!
//! # CI Compatibility
//!
//! Workers are scripted in-process dispatchers; nothing is spawned and no
//! network calls are made.

mod fixtures;

mod coordination;
mod planning;
mod routing;
