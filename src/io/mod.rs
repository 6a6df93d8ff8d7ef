//! Side-effecting adapters for the pipeline.

pub mod agent;
pub mod gates;
pub mod git;
pub mod patch;
pub mod process;
pub mod prompt;
pub mod retrieval;
pub mod state;
