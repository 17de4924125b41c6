//! Serde models for the realtime voice API wire protocol.
//!
//! Only the slice of the protocol the companion actually speaks is modeled
//! here: session configuration, audio buffering, conversation items, tool
//! (function) calls and the server events the orchestrator consumes.

pub mod audio;
pub mod events;
pub mod session;
pub mod tools;
mod content;

pub use content::items::{FunctionCallItem, FunctionCallOutputItem, Item, ItemStatus};
pub use content::message::{Content, MessageItem, MessageRole};
pub use events::{ClientEvent, ServerEvent};
pub use session::Session;
