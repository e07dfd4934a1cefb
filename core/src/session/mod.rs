//! Session state: in-memory store, on-disk persistence, message types

mod persistence;
mod store;
mod types;

pub use persistence::SessionPersistence;
pub use store::SessionStore;
pub use types::{Message, Session, StoreStats, ToolCallRequest};
