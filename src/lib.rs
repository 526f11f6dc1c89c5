//! Sandboxed grading engine for user-submitted Go solutions: frames each
//! submission with its hidden test suite into a tar archive, executes it
//! in a throwaway resource-capped container, and aggregates the
//! `go test -json` event stream into a structured verdict.

pub mod archive;
pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod parser;
pub mod sandbox;
pub mod store;
pub mod submit;
