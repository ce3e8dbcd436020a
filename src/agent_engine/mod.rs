pub mod engine;
pub mod event_bus;
pub mod history;
pub mod loop_control;
pub mod session;
pub mod state;
pub mod tracker;

pub use engine::AgentEngine;
pub use session::Session;
pub use state::{LoopOutcome, LoopState};
