pub mod keyboard_input;

mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use keyboard_input::{KeyAction, KeyboardInputHandler};
pub use orchestrator::MapeoApp;
pub use types::{ComponentState, RunOptions, ShutdownReason, SourceChoice};
