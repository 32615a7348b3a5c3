// Configuration management module
// TOML settings, injected into the clients and stores at construction time

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{Config, ConfigError, OllamaConfig, RagConfig};
