pub mod server;
pub mod types;

pub use server::{GatewayServer, GatewayState};
pub use types::{ApiError, ChatTurnResponse, TriggerBody};
