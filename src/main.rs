use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use wiki_rag::commands::{
    ask_question, delete_topic, index_topic, list_topics, report_error, run_chat, show_status,
};
use wiki_rag::config::{resolve_data_dir, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "wiki-rag")]
#[command(about = "Answer questions about a Wikipedia article with retrieval-augmented generation")]
#[command(version)]
struct Cli {
    /// Data directory holding config.toml and the indexes (default: ~/.wiki-rag)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the article source, provider and models
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Fetch, split and embed the topic's article
    Index {
        /// Topic to index instead of the configured one
        #[arg(long)]
        topic: Option<String>,
        /// Drop the topic's stored chunks and index it again
        #[arg(long)]
        rebuild: bool,
    },
    /// Answer a single question
    Ask {
        question: String,
        /// Topic to ask about instead of the configured one
        #[arg(long)]
        topic: Option<String>,
        /// Number of chunks to retrieve as context
        #[arg(long)]
        top_k: Option<usize>,
        /// Print the retrieved chunks after the answer
        #[arg(long)]
        show_sources: bool,
    },
    /// Interactive question loop with example questions
    Chat {
        /// Topic to chat about instead of the configured one
        #[arg(long)]
        topic: Option<String>,
    },
    /// List indexed topics
    List,
    /// Delete a topic's stored chunks and record
    Delete {
        /// Topic name as it was indexed
        topic: String,
    },
    /// Show provider, store and metadata status
    Status,
}

async fn run(command: Commands, data_dir: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Config { show } => {
            if show {
                show_config(data_dir)?;
            } else {
                run_interactive_config(data_dir)?;
            }
        }
        Commands::Index { topic, rebuild } => {
            index_topic(data_dir, topic, rebuild).await?;
        }
        Commands::Ask {
            question,
            topic,
            top_k,
            show_sources,
        } => {
            ask_question(data_dir, &question, topic, top_k, show_sources).await?;
        }
        Commands::Chat { topic } => {
            run_chat(data_dir, topic).await?;
        }
        Commands::List => {
            list_topics(data_dir).await?;
        }
        Commands::Delete { topic } => {
            delete_topic(data_dir, &topic).await?;
        }
        Commands::Status => {
            show_status(data_dir).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let data_dir = match resolve_data_dir(cli.data_dir) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("An error occurred: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli.command, &data_dir).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e, &data_dir);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["wiki-rag", "list"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::List));
            assert_eq!(parsed.data_dir, None);
        }
    }

    #[test]
    fn global_data_dir() {
        let parsed = Cli::try_parse_from(["wiki-rag", "status", "--data-dir", "/tmp/wiki"])
            .expect("should parse");
        assert_eq!(parsed.data_dir, Some(PathBuf::from("/tmp/wiki")));
        assert!(matches!(parsed.command, Commands::Status));

        let parsed = Cli::try_parse_from(["wiki-rag", "--data-dir", "/tmp/wiki", "list"])
            .expect("should parse");
        assert_eq!(parsed.data_dir, Some(PathBuf::from("/tmp/wiki")));
    }

    #[test]
    fn index_command_flags() {
        let parsed = Cli::try_parse_from(["wiki-rag", "index"]).expect("should parse");
        if let Commands::Index { topic, rebuild } = parsed.command {
            assert_eq!(topic, None);
            assert!(!rebuild);
        } else {
            panic!("expected index command");
        }

        let parsed = Cli::try_parse_from(["wiki-rag", "index", "--topic", "Calavera", "--rebuild"])
            .expect("should parse");
        if let Commands::Index { topic, rebuild } = parsed.command {
            assert_eq!(topic.as_deref(), Some("Calavera"));
            assert!(rebuild);
        } else {
            panic!("expected index command");
        }
    }

    #[test]
    fn ask_command_with_options() {
        let parsed = Cli::try_parse_from([
            "wiki-rag",
            "ask",
            "When is Day of the Dead observed?",
            "--top-k",
            "2",
            "--show-sources",
        ])
        .expect("should parse");

        if let Commands::Ask {
            question,
            topic,
            top_k,
            show_sources,
        } = parsed.command
        {
            assert_eq!(question, "When is Day of the Dead observed?");
            assert_eq!(topic, None);
            assert_eq!(top_k, Some(2));
            assert!(show_sources);
        } else {
            panic!("expected ask command");
        }
    }

    #[test]
    fn ask_requires_question() {
        let result = Cli::try_parse_from(["wiki-rag", "ask"]);
        assert!(result.is_err());
        if let Err(e) = result {
            assert_eq!(e.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn invalid_top_k_rejected() {
        let result = Cli::try_parse_from(["wiki-rag", "ask", "q", "--top-k", "many"]);
        assert!(result.is_err());
        if let Err(e) = result {
            assert_eq!(e.kind(), ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn delete_command() {
        let parsed = Cli::try_parse_from(["wiki-rag", "delete", "Day of the Dead"])
            .expect("should parse");
        if let Commands::Delete { topic } = parsed.command {
            assert_eq!(topic, "Day of the Dead");
        } else {
            panic!("expected delete command");
        }
    }

    #[test]
    fn chat_and_config_commands() {
        let parsed =
            Cli::try_parse_from(["wiki-rag", "chat", "--topic", "Calavera"]).expect("should parse");
        assert!(matches!(parsed.command, Commands::Chat { topic: Some(_) }));

        let parsed = Cli::try_parse_from(["wiki-rag", "config", "--show"]).expect("should parse");
        assert!(matches!(parsed.command, Commands::Config { show: true }));
    }

    #[test]
    fn invalid_command() {
        let result = Cli::try_parse_from(["wiki-rag", "serve"]);
        assert!(result.is_err());
        if let Err(e) = result {
            assert_eq!(e.kind(), ErrorKind::InvalidSubcommand);
        }
    }
}
