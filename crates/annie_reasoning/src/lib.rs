pub mod api_types;
pub mod engine;
pub mod llm;
pub mod lorebook;
pub mod prompts;
pub mod providers;
pub mod social;
pub mod tags;
pub mod trigger;

pub use engine::{ChatEngine, ImageJob, TurnOutcome};
pub use llm::{ClientFactory, FixedClient, LlmClient};
pub use providers::ProviderDispatcher;
pub use trigger::{Trigger, VisualSource};
