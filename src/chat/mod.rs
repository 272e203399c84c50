//! Chat with the content assistant: streaming ingest, client and sessions

pub mod client;
pub mod context;
pub mod frame;
pub mod ingest;
pub mod message;
pub mod session;

pub use client::{ChatBackend, ChatClient, ChatRequest};
pub use context::site_content;
pub use ingest::{ingest_stream, StreamEvent, StreamIngest};
pub use message::{apply_delta, ChatMessage, Role, WireMessage};
pub use session::{ChatSession, RejectedPlan, TurnOutcome};
