//! Stable exit codes for the pipeline CLI.

/// Run completed (gates green, or iteration budget exhausted with a warning).
pub const OK: i32 = 0;
/// Generic failure (state, git, or internal error).
pub const FAILURE: i32 = 1;
/// A precondition failed before any mutation (missing path, dirty tree, no adapter).
pub const PRECONDITION: i32 = 2;
/// A generated diff could not be validated or applied.
pub const APPLY: i32 = 3;
/// An agent invocation failed after retry exhaustion.
pub const AGENT: i32 = 4;
