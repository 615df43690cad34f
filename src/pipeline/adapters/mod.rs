//! Adapter implementations of the pipeline ports.

pub mod memory;

pub use memory::InMemoryPipelineRepository;
