//! Use-case services built on top of the repository contract.
//!
//! # Responsibility
//! - Provide stable task lifecycle entry points for callers.
//! - Stay storage-agnostic; never bypass repository validation.

pub mod task_service;
