// Library interface for runprobe
// Exposes the orchestration building blocks for integration tests and custom harnesses

pub mod assertions;
pub mod ci;
pub mod cli;
pub mod config;
pub mod docker;
pub mod errors;
pub mod orchestrator;
pub mod report;
pub mod script;
pub mod suggestions;
pub mod volume;
