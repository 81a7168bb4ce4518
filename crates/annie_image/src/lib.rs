//! Client for a local ComfyUI diffusion server.

pub mod client;
pub mod endpoint;
mod error;
pub mod graph;
pub mod presets;
pub mod probe;
pub mod resources;

pub use client::{ComfyClient, PollPolicy};
pub use error::{ImageError, Result};
pub use graph::{build_workflow, Node, Workflow};
pub use presets::{PromptPreset, WorkflowPreset, POSITIVE_PROMPT_PRESETS, WORKFLOW_PRESETS};
pub use probe::{ProbeOutcome, ProbeReport};
pub use resources::ComfyResources;
