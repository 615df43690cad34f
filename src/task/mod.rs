//! Task lifecycle management for Gantry.
//!
//! A task is one unit of database change work: creating a database, applying
//! schema DDL, applying data DML, taking a backup, or restoring one. This
//! module owns the task aggregate and its execution history, the payload
//! codec that interprets the per-type payload contract, the status state
//! machine, and the check-run gating engine that decides when a task may
//! leave `PendingApproval`. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
