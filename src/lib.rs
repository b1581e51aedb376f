//! tailgen - Tailwind/HTML generator with a live preview
//!
//! Prompts go to an OpenAI-compatible chat completions API; the generated
//! markup streams into a preview document that is rewritten at most about
//! once a second while fragments arrive.

pub mod client;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod credential;
pub mod prompt;
pub mod renderer;
pub mod store;
pub mod ui;

pub use client::{ChatRequest, ClientError, CompletionBackend, OpenAiClient, Sampling, StreamEvent};
pub use config::Config;
pub use controller::{Exchange, FormController, FormState, FormSurface, IgnoreReason, Settings, Submit};
pub use conversation::{Conversation, Message, Role};
pub use credential::{CredentialPrompt, CREDENTIAL_KEY};
pub use renderer::{Debouncer, FilePreview, PreviewSurface, StreamingRenderer};
pub use store::{FileStore, KeyValueStore, MemoryStore};
