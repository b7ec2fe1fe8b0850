// Configuration management module
// TOML settings in the data directory plus the interactive editor

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, EmbeddingConfig, GenerationConfig, ProviderConfig, RetrievalConfig,
    SourceConfig, StoreConfig,
};

/// Resolve the data directory, falling back to `~/.wiki-rag`
#[inline]
pub fn resolve_data_dir(
    override_dir: Option<std::path::PathBuf>,
) -> Result<std::path::PathBuf, ConfigError> {
    override_dir.map_or_else(Config::default_dir, Ok)
}
