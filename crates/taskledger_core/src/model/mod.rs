//! Domain model for persisted task records.
//!
//! # Responsibility
//! - Define the canonical task record shared by every storage engine.
//! - Enforce field invariants before any persistence happens.
//!
//! # Invariants
//! - Every record is identified by a stable `TaskId`, never reused.
//! - `updated_at >= created_at` for every valid record.

pub mod task;
