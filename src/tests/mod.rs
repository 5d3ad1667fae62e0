//! Scenario tests for the eviction engine.
//!
//! Each case drives a real engine over the in-memory block store: page
//! state transitions, selection rules, assisted eviction and the worker
//! pool.

mod cases_assist_test;
mod cases_selection_test;
mod cases_state_machine_test;

pub mod support;
