//! Long-term conversational memory.

pub mod mem0;
pub mod store;

pub use mem0::Mem0Client;
pub use store::{DisabledMemory, MemoryStore, MockMemory, format_memories};
