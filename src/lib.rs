//! TDD agent loop runner.
//!
//! This crate drives an iterative "write tests, implement, verify" loop over a
//! target project. Generated diffs from local model agents are sanitized,
//! applied, and checked against the project's own quality gates until they
//! pass or the iteration budget runs out. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (diff sanitization and parsing,
//!   retrieval scoring, context encoding). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (process execution, git, patch
//!   application, gates, state persistence, agent invocation). Isolated behind
//!   traits to enable scripted doubles in tests.
//!
//! The orchestration module ([`pipeline`]) coordinates core logic with I/O to
//! implement the resumable plan/test/gate/diagnose/implement state machine.

pub mod adapters;
pub mod config;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
