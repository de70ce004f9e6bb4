//! Model adapter: invocation, preprocessing and robust reply parsing
//!
//! The core consumes a single injected `LlmInvoke` capability; everything
//! here is about surviving what comes back. Parsing is five tiers deep and
//! an unparseable reply is a normal outcome, never a panic.

mod adapter;
mod config;
mod mock;
mod parser;
mod preprocess;

pub use adapter::ModelAdapter;
pub use config::{ParsingConfig, ResponseFormat};
pub use mock::MockLlm;
pub use parser::SkillParser;
pub use preprocess::Preprocessor;
