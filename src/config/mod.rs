// Configuration management module
// TOML settings stored in the knowledge base directory

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    API_KEY_ENV_VAR, Config, ConfigError, DEFAULT_BASE_DIR, GeminiConfig, OllamaConfig,
    RetrievalConfig,
};
