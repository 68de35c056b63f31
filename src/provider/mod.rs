//! LLM Provider layer
//!
//! OpenAI-compatible provider for chat completions with tool calling and
//! strict structured output. Works against any API implementing the OpenAI
//! chat completions spec; OpenRouter is the production endpoint.

mod client;
mod config;

pub use client::*;
pub use config::*;
