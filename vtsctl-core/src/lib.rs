//! vtsctl-core: Shared library for driving VTube Studio expressions
//!
//! This crate provides:
//! - Protocol types for the VTube Studio Public API
//! - Token persistence
//! - The operator's expression catalog
//! - Session state machine (handshake, discovery, activation)
//! - Chat client for a local model server
//! - Tracing setup shared by the binaries

pub mod catalog;
pub mod chat;
pub mod config;
pub mod credentials;
pub mod logging;
pub mod protocol;
pub mod session;

pub use catalog::{CatalogEntry, ExpressionCatalog};
pub use chat::ChatClient;
pub use config::Config;
pub use credentials::{CredentialStore, Token};
pub use protocol::{Inbound, Outbound, Request, Response};
pub use session::{Command, Session, SessionEvent, SessionState, Transition};

/// Default VTube Studio API endpoint
pub const DEFAULT_API_URL: &str = "ws://127.0.0.1:8001";

/// Default LM Studio chat completions endpoint
pub const DEFAULT_CHAT_URL: &str = "http://localhost:1234/v1/chat/completions";

/// Token file name inside the config directory
pub const DEFAULT_TOKEN_FILE: &str = "vtube_token.txt";
