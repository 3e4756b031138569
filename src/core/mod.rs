//! Core compiler logic - types, rules, code generation, planning, execution.

pub mod codegen;
pub mod context;
pub mod executor;
pub mod formula;
pub mod parser;
pub mod planner;
pub mod recalc;
pub mod rules;
pub mod sink;
pub mod types;
pub mod verify;
pub mod worker;
