//! Text-to-speech: the streaming synthesizer seam and its HTTP sidecar adapter.

pub mod http;
pub mod synthesizer;

pub use http::{HttpSynthesizer, PcmChunker};
pub use synthesizer::{MockSynthesizer, SynthesisEngine, SynthesisRequest, Synthesizer};
