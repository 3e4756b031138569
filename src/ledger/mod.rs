//! PT-014: Commit ledger - content hashing and the append-only event log.

pub mod eventlog;
pub mod hasher;
