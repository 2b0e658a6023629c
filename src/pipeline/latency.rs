//! Per-turn stage timing.

use std::time::{Duration, Instant};

/// Timestamps collected while one turn runs.
#[derive(Debug, Clone)]
pub struct TurnTiming {
    started: Instant,
    transcribed: Option<Instant>,
    generated: Option<Instant>,
    first_audio: Option<Instant>,
    /// Duration of the input audio, zero for text input.
    pub audio_duration: Duration,
}

impl TurnTiming {
    pub fn start(audio_duration: Duration) -> Self {
        Self {
            started: Instant::now(),
            transcribed: None,
            generated: None,
            first_audio: None,
            audio_duration,
        }
    }

    pub fn mark_transcribed(&mut self) {
        self.transcribed = Some(Instant::now());
    }

    pub fn mark_generated(&mut self) {
        self.generated = Some(Instant::now());
    }

    /// Only the first call counts.
    pub fn mark_first_audio(&mut self) {
        if self.first_audio.is_none() {
            self.first_audio = Some(Instant::now());
        }
    }

    pub fn transcription_latency(&self) -> Option<Duration> {
        self.transcribed.map(|t| t.duration_since(self.started))
    }

    /// Time spent in generation, measured from the end of transcription.
    pub fn generation_latency(&self) -> Option<Duration> {
        let from = self.transcribed.unwrap_or(self.started);
        self.generated.map(|t| t.duration_since(from))
    }

    /// Delay until the client heard the first audio.
    pub fn time_to_first_audio(&self) -> Option<Duration> {
        self.first_audio.map(|t| t.duration_since(self.started))
    }

    /// Transcription time relative to input length. Below 1.0 is faster than real time.
    pub fn realtime_factor(&self) -> f64 {
        match self.transcription_latency() {
            Some(latency) if !self.audio_duration.is_zero() => {
                latency.as_secs_f64() / self.audio_duration.as_secs_f64()
            }
            _ => 0.0,
        }
    }

    pub fn total(&self) -> Duration {
        self.started.elapsed()
    }
}

fn millis(duration: Option<Duration>) -> u64 {
    duration.map(|d| d.as_millis() as u64).unwrap_or(0)
}

impl TurnTiming {
    pub fn log(&self, session: &uuid::Uuid) {
        tracing::debug!(
            session = %session,
            transcription_ms = millis(self.transcription_latency()),
            generation_ms = millis(self.generation_latency()),
            first_audio_ms = millis(self.time_to_first_audio()),
            total_ms = self.total().as_millis() as u64,
            rtf = self.realtime_factor(),
            "Turn timing"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmarked_stages_are_none() {
        let timing = TurnTiming::start(Duration::ZERO);
        assert!(timing.transcription_latency().is_none());
        assert!(timing.generation_latency().is_none());
        assert!(timing.time_to_first_audio().is_none());
        assert_eq!(timing.realtime_factor(), 0.0);
    }

    #[test]
    fn test_first_audio_is_only_recorded_once() {
        let mut timing = TurnTiming::start(Duration::from_millis(500));
        timing.mark_first_audio();
        let first = timing.time_to_first_audio().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        timing.mark_first_audio();
        assert_eq!(timing.time_to_first_audio().unwrap(), first);
    }

    #[test]
    fn test_generation_measured_from_transcription() {
        let mut timing = TurnTiming::start(Duration::from_millis(500));
        timing.mark_transcribed();
        timing.mark_generated();
        assert!(timing.generation_latency().unwrap() <= timing.total());
        assert!(timing.realtime_factor() >= 0.0);
    }
}
