//! Pipeline and stage records for Gantry.
//!
//! A pipeline is an ordered sequence of stages; a stage is an ordered
//! sequence of tasks, typically scoped to one environment. Both are arenas
//! of records referencing each other by identifier only: pipelines hold
//! stage identifiers, stages hold task identifiers, and tasks point back by
//! identifier, so the ownership graph stays acyclic.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]

pub mod adapters;
pub mod domain;
pub mod ports;

#[cfg(test)]
mod tests;
