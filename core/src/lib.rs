//! # toolgate Core
//!
//! Core library for toolgate - a gateway and conversation engine for
//! LLM tool orchestration.
//!
//! This library provides the building blocks for running tool-using
//! conversations: a gateway that supervises heterogeneous tool
//! providers behind one flat catalog, a bounded conversation loop, and
//! a session store with on-disk persistence.

// Core modules
pub mod config;
pub mod conversation;
pub mod error;
pub mod gateway;
pub mod inference;
pub mod provider;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use conversation::{ConversationLoop, ConversationOutcome};
pub use error::{Error, Result};
pub use gateway::{InvocationContext, ToolGateway};
pub use inference::{InferenceClient, OpenAiCompatClient};
pub use session::{Session, SessionPersistence, SessionStore};

/// Current version of the toolgate-core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for the library
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

/// Initialize tracing with a specific debug mode
pub fn init_tracing_with_debug(debug: bool) {
    let filter = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();
}
