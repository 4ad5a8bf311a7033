//! Test utilities for SessionVault integration tests
//!
//! - SessionFixture: a manager wired to an isolated on-disk store
//! - EventRecorder: listener that records every notification it sees

pub mod session_fixture;
