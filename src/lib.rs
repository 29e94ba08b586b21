//! coindex - A strict, deterministic compiler for hand-authored record corpora
//!
//! Loads a directory tree of entity records, validates each against a strict
//! schema, and produces one consolidated document.

pub mod cli;
pub mod config;
pub mod corpus;
pub mod observability;
pub mod schema;
