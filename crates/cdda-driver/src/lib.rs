pub mod cli;
pub mod command_string;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod runtime;

pub use dispatcher::{CommandDispatcher, DeviceState};
pub use error::CommandError;
