
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;

use super::{Config, ConfigError, ProviderConfig};

#[inline]
pub fn run_interactive_config(data_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 wiki-rag Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(data_dir);

    eprintln!("{}", style("Document Source").bold().yellow());
    configure_source(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Inference Provider").bold().yellow());
    eprintln!("Any OpenAI-compatible endpoint works, including a local Ollama.");
    eprintln!();
    configure_provider(&mut config.provider)?;
    configure_models(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_provider_connection(&config.provider) {
        eprintln!("{}", style("✓ Provider reachable!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not reach the provider").yellow()
        );
        eprintln!("You can continue, but indexing and answering will fail until it is reachable.");
    }

    if config.api_key().is_none() {
        eprintln!(
            "{}",
            style(format!(
                "⚠ {} is not set in the environment",
                config.provider.api_key_env
            ))
            .yellow()
        );
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(data_dir: &Path) -> Result<()> {
    let config = Config::load(data_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Source:").bold().yellow());
    eprintln!("  Topic: {}", style(&config.source.topic).cyan());
    eprintln!("  Wikipedia: {}", style(&config.source.wikipedia_url).cyan());

    eprintln!();
    eprintln!("{}", style("Provider:").bold().yellow());
    match config.provider_url() {
        Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
    }
    let key_state = if config.api_key().is_some() {
        style("set").green()
    } else {
        style("not set").red()
    };
    eprintln!(
        "  API key: {} ({})",
        style(&config.provider.api_key_env).cyan(),
        key_state
    );
    eprintln!("  Embedding Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Chat Model: {}", style(&config.generation.model).cyan());
    eprintln!(
        "  Temperature: {}",
        style(config.generation.temperature).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Pipeline:").bold().yellow());
    eprintln!(
        "  Chunk Size / Overlap: {} / {}",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.chunk_overlap).cyan()
    );
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());
    eprintln!(
        "  Distance: {}",
        style(config.retrieval.distance_metric).cyan()
    );
    eprintln!(
        "  Collection: {}",
        style(&config.store.collection_name).cyan()
    );
    eprintln!(
        "  Store: {}",
        style(config.vector_database_path().display()).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(data_dir: &Path) -> Config {
    Config::load(data_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No valid configuration found. Using defaults.").yellow()
            );
            Config {
                base_dir: data_dir.to_path_buf(),
                ..Config::default()
            }
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn configure_source(config: &mut Config) -> Result<()> {
    let topic: String = Input::new()
        .with_prompt("Topic to index")
        .default(config.source.topic.clone())
        .interact_text()?;

    config.source.set_topic(topic);
    Ok(())
}

fn configure_provider(provider: &mut ProviderConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == provider.protocol)
        .unwrap_or(1);

    let protocol_index = Select::new()
        .with_prompt("Provider protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Provider host")
        .default(provider.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = ProviderConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..ProviderConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Provider port")
        .default(provider.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let api_key_env: String = Input::new()
        .with_prompt("Environment variable holding the API key")
        .default(provider.api_key_env.clone())
        .interact_text()?;

    provider.set_protocol(protocol)?;
    provider.set_host(host)?;
    provider.set_port(port)?;
    provider.set_api_key_env(api_key_env)?;

    Ok(())
}

fn configure_models(config: &mut Config) -> Result<()> {
    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(config.embedding.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let chat_model: String = Input::new()
        .with_prompt("Chat model")
        .default(config.generation.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let top_k: usize = Input::new()
        .with_prompt("Chunks retrieved per question")
        .default(config.retrieval.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=100).contains(input) {
                Ok(())
            } else {
                Err("Must be between 1 and 100")
            }
        })
        .interact_text()?;

    config.embedding.set_model(embedding_model)?;
    config.generation.set_model(chat_model)?;
    config.retrieval.set_top_k(top_k)?;

    Ok(())
}

fn test_provider_connection(provider: &ProviderConfig) -> bool {
    let Ok(base) = provider.provider_url() else {
        return false;
    };
    let Ok(url) = base.join("/v1/models") else {
        return false;
    };

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    // Any HTTP answer (even 401 without a key) means the endpoint is up
    match agent.get(url.as_str()).call() {
        Ok(_) | Err(ureq::Error::StatusCode(_)) => true,
        Err(_) => false,
    }
}
