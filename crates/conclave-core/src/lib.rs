//! Core types and error definitions for the Conclave workspace.
//!
//! This crate provides the error type shared by the orchestration engine,
//! its execution patterns and the command-line front end.
//!
//! # Main types
//!
//! - [`ConclaveError`] — Unified error enum for all Conclave subsystems.
//! - [`ConclaveResult`] — Convenience alias for `Result<T, ConclaveError>`.

mod error;

pub use error::{ConclaveError, ConclaveResult};
