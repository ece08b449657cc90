pub mod cobalt;
#[cfg(feature = "serde")]
pub mod config;
pub mod error;
pub mod packet;
pub mod queue;
pub mod time;
pub mod utils;

pub use cobalt::{
    on_queue_empty, on_queue_full, should_drop, CobaltPacket, CobaltParams, CobaltVars, Verdict,
};
pub use queue::{CobaltQueue, CobaltQueueConfig, CobaltQueueStats, PacketQueue};
