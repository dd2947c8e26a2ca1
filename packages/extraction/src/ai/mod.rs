//! Extractor implementations backed by LLM providers.

mod schema;

pub mod openai;

pub use openai::OpenAI;
pub use schema::openai_schema;
