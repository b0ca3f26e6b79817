//! Scout Engine Library
//!
//! Orchestration loop, capabilities, evidence fusion and persistence behind
//! the `scout` binary. Also used by the integration tests.

/// Configuration management module
pub mod config;

/// Database persistence module
pub mod db;

/// Reasoning engine abstraction layer
pub mod llm;

/// Evidence fusion, contact deduplication and scoring
pub mod fusion;

/// HTTP enrichment providers
pub mod enrichment;

/// Capability registry and the built-in capabilities
pub mod capabilities;

/// Bounded orchestration loop
pub mod orchestrator;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
