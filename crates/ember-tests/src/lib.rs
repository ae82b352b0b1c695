//! Shared helpers for the Ember integration test suite.

pub mod helpers;
