// Scour library exports

pub mod cli;
pub mod config;
pub mod file_manager;
pub mod runner;

pub use cli::Args;
pub use config::Config;
pub use file_manager::{FileManager, Source};
pub use runner::{run, Outcome};
