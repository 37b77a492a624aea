//! Core engine — types, parsing, recipe expansion, evaluation, planning, execution.

pub mod codegen;
pub mod content;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod parser;
pub mod planner;
pub mod recipe;
pub mod resolver;
pub mod state;
pub mod types;
pub mod values;
