//! Response generation: the streaming generator seam and its Ollama adapter.

pub mod generator;
pub mod ollama;

pub use generator::{Generator, MockGenerator, collect_response};
pub use ollama::{GenerationOptions, NdjsonDecoder, OllamaGenerator};
