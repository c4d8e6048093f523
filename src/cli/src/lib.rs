pub mod commands;
pub mod config;
pub mod launcher;
pub mod logging;
mod process_command;

pub use process_command::process_command;
