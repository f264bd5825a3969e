//! Core engine: types, policy, decisions, generation, execution.

pub mod codegen;
pub mod decision;
pub mod executor;
pub mod parser;
pub mod policy;
pub mod resolver;
pub mod state;
pub mod types;
