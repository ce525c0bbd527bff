/// Shared wire and domain types for Parley.
///
/// Everything that crosses a crate boundary or the WebSocket lives here so the
/// store, the gateway and the HTTP layer agree on a single shape.

pub mod api;
pub mod chat_id;
pub mod events;
pub mod models;

pub use chat_id::{ChatId, IdentityError, validate_user_id};
pub use events::{ErrorKind, GatewayCommand, GatewayEvent};
pub use models::{Message, MessageStatus, PresenceStatus, Reaction, UserPresence};
