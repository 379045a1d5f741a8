pub mod codec;
pub mod config;
pub mod engine;
pub mod progress;
pub mod queue;
pub mod scheduler;
pub mod worker;

pub use codec::CodecError;
pub use config::EngineConfig;
pub use engine::EmbeddingEngine;
pub use queue::WorkQueue;
pub use scheduler::{RunReport, Scheduler};
pub use worker::InferenceWorker;
