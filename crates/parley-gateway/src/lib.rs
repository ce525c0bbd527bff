/// Parley gateway: the real-time messaging and presence engine.
///
/// `ConnectionHub` owns live connections and presence, `DeliveryPipeline`
/// persists and fans out messages, `ReactionAggregator` and `TypingRelay`
/// handle the smaller signals, and `ChatEngine` routes decoded gateway
/// commands to them. `connection` pumps a WebSocket into the engine.

pub mod connection;
pub mod engine;
pub mod error;
pub mod hub;
pub mod pipeline;
pub mod presence;
pub mod reactions;
pub mod typing;

#[cfg(test)]
mod testing;

pub use engine::{ChatEngine, EngineConfig};
pub use error::ChatError;
pub use hub::ConnectionHub;
pub use pipeline::{DeliveryPipeline, DeliveryResult, StatusPolicy};
pub use presence::{ConnectionId, PresenceRegistry};
pub use reactions::{ReactionAggregator, ReactionResult};
pub use typing::TypingRelay;
