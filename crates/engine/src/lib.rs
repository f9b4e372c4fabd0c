pub mod engine;
pub mod events;
pub mod export;
pub mod runner;
pub mod session;

pub use engine::{AssistantFactory, SessionEngine};
pub use events::{EngineEvent, EngineState};
pub use export::export_session;
pub use session::{ModelSession, View};
