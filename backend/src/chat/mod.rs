//! Conversational core: text in, structured `ChatResponse` out.
//!
//! `pipeline::ChatPipeline` is the entry point; everything else is a stage
//! it drives in order.

pub mod analytics;
pub mod builder;
pub mod compliance;
pub mod context;
pub mod dispatcher;
pub mod extractor;
pub mod glossary;
pub mod handlers;
pub mod narrative;
pub mod nicknames;
pub mod normalizer;
pub mod paraphraser;
pub mod pipeline;
pub mod resolver;
pub mod router;
pub mod schema;

pub use pipeline::{ChatInput, ChatPipeline};
