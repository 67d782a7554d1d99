pub mod client;
pub mod extract;
pub mod fallback;
pub mod prompts;

pub use client::{ChatClient, ChatSettings, ModelClient, ModelError, ModelFuture};
pub use extract::extract_code;
pub use fallback::{GenerativeFixer, GENERATIVE_CONFIDENCE};
