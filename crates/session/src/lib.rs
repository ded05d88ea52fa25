#![deny(unsafe_code)]

/// Wires settings into backend clients and opens sessions.
pub mod bootstrap;
/// Turn lifecycle, rendering and the display contract.
pub mod chat;
pub mod error;
/// Layered settings persistence.
pub mod settings;
pub mod terminal;

pub use bootstrap::SessionServices;
pub use chat::{ChatSession, ChatSurface, SessionController, SubmitOutcome, SubmitRejection};
pub use error::{SessionError, SessionResult};
