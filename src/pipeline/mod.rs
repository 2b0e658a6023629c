//! Turn execution and the outbound event channel.

pub mod events;
pub mod latency;
pub mod turn;

pub use events::EventSender;
pub use latency::TurnTiming;
pub use turn::{TurnInput, TurnOutcome, TurnPipeline};
