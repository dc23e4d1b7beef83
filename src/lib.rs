//! Voice conversational agent.
//!
//! Callers reach the agent through a console or HTTP webhooks; each
//! utterance becomes one exchange with a hosted text-generation model,
//! retried with exponential backoff, and the reply can be voiced through a
//! speech service.

pub mod comms;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod logger;
pub mod orchestrator;
pub mod store;
pub mod voice;
