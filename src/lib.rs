//! Prodtree - production hierarchy compiler.
//!
//! Compiles an authored project/episode/sequence/shot/asset tree into an
//! ordered commit plan with derived codes and paths, then commits it to a
//! remote store and verifies the result.

pub mod cli;
pub mod core;
pub mod error;
pub mod ledger;
pub mod store;

pub use error::{Error, Result};
