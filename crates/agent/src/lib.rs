//! Conversation Agent - LLM-backed message understanding and orchestration
//!
//! This crate is the conversational front of the pedido system:
//! - Classifies inbound messages into a closed intent set (`classifier`)
//! - Extracts structured order candidates from free text (`extractor`)
//! - Drives the per-customer conversation loop (`orchestrator`)
//! - Renders customer-facing replies (`replies`)
//!
//! # Safety Principle
//!
//! The LLM is strictly a translator. It never creates orders, moves their
//! status, or decides prices. Those are deterministic decisions made by the
//! order core; anything the model emits outside its JSON contract is treated
//! as an unusable response and degraded, never trusted.

pub mod classifier;
pub mod extractor;
pub mod http;
pub mod llm;
pub mod orchestrator;
pub mod replies;

pub use classifier::{Classification, Classifier, ClassifyError};
pub use extractor::{ExtractError, ExtractionResult, Extractor};
pub use http::HttpLlmClient;
pub use llm::{LlmClient, ScriptedLlmClient};
pub use orchestrator::ConversationRuntime;
