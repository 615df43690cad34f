//! Domain model for pipelines and stages.

mod records;

pub use records::{Pipeline, Stage};
