// Answer generation: prompt rendering and the chat model client

pub mod chat;
pub mod prompt;

pub use chat::ChatClient;
pub use prompt::{DEFAULT_TEMPLATE, PromptTemplate};
