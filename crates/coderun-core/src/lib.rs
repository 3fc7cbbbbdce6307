//! Sandboxed execution of untrusted source code.
//!
//! This crate accepts arbitrary user-submitted programs, runs them in
//! throwaway least-privilege containers, bounds their resource consumption,
//! classifies the outcome and keeps answering when the local container engine
//! is down by failing over to a remote Judge0-compatible backend.
//!
//! # Architecture Overview
//!
//! - **Language catalog**: data-driven profiles with command templates
//! - **Safety pre-check**: static deny-list scan run before any allocation
//! - **Container engine**: typed boundary over the Docker daemon
//! - **Sandbox runner**: scratch directory, compile-then-run, classification
//! - **Remote backend**: Judge0 submission and polling
//! - **Orchestrator**: validation, method selection, failover, records
//! - **Configuration**: YAML with environment overrides

pub mod config;
pub mod core_types;
pub mod errors;
pub mod executors;
pub mod guardrails;
pub mod languages;
pub mod orchestrator;
pub mod sink;

pub use config::*;
pub use core_types::*;
pub use errors::{EngineError, ExecutionError};
pub use executors::CodeExecutor;
pub use guardrails::{CodeSafetyChecker, SafetyVerdict};
pub use languages::{CodeLanguage, LanguageProfile, LanguageRegistry};
pub use orchestrator::{ExecutionOrchestrator, ExecutorStats, OrchestratorBuilder};
pub use sink::{ExecutionSink, JsonLinesSink};

#[cfg(test)]
pub mod test_utils;
