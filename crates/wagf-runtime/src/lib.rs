//! Experiment runner and audit trail
//!
//! Drives the broker over years x agents against an injected simulation
//! engine, stages approved effects so iteration order cannot leak between
//! agents, triggers end-of-year reflection, and writes the audit files that
//! make every decision re-playable offline.

mod audit;
mod config;
mod demo;
mod hooks;
mod runner;

pub use audit::{AuditSink, RunSummary};
pub use config::{
    AgentTypeConfig, AgentTypesFile, ExperimentConfig, GlobalConfig, GovernanceSection, LlmParams,
    SharedConfig,
};
pub use demo::DemoSimulation;
pub use hooks::{CompositeHooks, ExperimentHooks, LoggingHooks, NoopHooks};
pub use runner::{ExperimentBuilder, ExperimentRunner};
