//! learnpath-core — Schema contracts, prompts, response parsing and the
//! session workflow.
//!
//! This crate holds everything that does not talk to the network directly.
//! LLM and search backends plug in through the traits in [`traits`].

pub mod config;
pub mod error;
pub mod gateway;
pub mod prompt;
pub mod registry;
pub mod response;
pub mod schema;
pub mod session;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use config::{LevelPolicy, SessionConfig};
pub use error::{ProviderError, TutorError, UserInputError};
pub use gateway::{GenerationSettings, ModelGateway};
pub use registry::SessionRegistry;
pub use response::ResponseParser;
pub use session::{SessionState, Stage, TutorSession};
