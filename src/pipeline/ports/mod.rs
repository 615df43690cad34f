//! Port contracts for pipeline persistence.

pub mod repository;

pub use repository::{
    NewPipeline, NewStage, PipelineRepository, PipelineRepositoryError, PipelineRepositoryResult,
};
