//! Accumulates client PCM until there is enough to transcribe.

use crate::defaults;

/// Byte buffer with a transcription threshold.
#[derive(Debug, Clone)]
pub struct AudioIngestBuffer {
    bytes: Vec<u8>,
    threshold: usize,
}

impl AudioIngestBuffer {
    pub fn new(threshold: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(threshold),
            threshold,
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// True once at least `threshold` bytes are buffered.
    pub fn ready(&self) -> bool {
        self.bytes.len() >= self.threshold
    }

    /// Take everything buffered and reset to empty.
    pub fn drain(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

impl Default for AudioIngestBuffer {
    fn default() -> Self {
        Self::new(defaults::MIN_AUDIO_BYTES)
    }
}

/// Decode little-endian 16-bit PCM into samples. An unpaired final byte is ignored.
pub fn pcm16_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(defaults::PCM16_BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
