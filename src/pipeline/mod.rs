pub mod extractor;
pub mod image_processor;
pub mod job_runner;
pub mod orchestrator;
pub mod stamp;
