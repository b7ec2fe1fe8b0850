use anyhow::{Context, Result};
use console::style;
use dialoguer::{Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use crate::config::Config;
use crate::config::settings::DEFAULT_API_KEY_ENV;
use crate::database::lancedb::SearchResult;
use crate::pipeline::Indexer;
use crate::provider::ProviderClient;
use crate::session::{EMPTY_QUESTION_WARNING, EXAMPLE_QUESTIONS, QaSession, Reply};

const OWN_QUESTION: &str = "Ask your own question";
const QUIT: &str = "Quit";
const SPINNER_TICK: Duration = Duration::from_millis(100);

fn load_config(data_dir: &Path, topic: Option<String>) -> Result<Config> {
    let mut config = Config::load(data_dir).context("Failed to load configuration")?;
    if let Some(topic) = topic {
        config.source.set_topic(topic);
    }
    Ok(config)
}

fn spinner() -> ProgressBar {
    if console::user_attended_stderr() {
        let bar = ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg}").expect("style template is valid"),
        );
        bar.enable_steady_tick(SPINNER_TICK);
        bar
    } else {
        ProgressBar::hidden()
    }
}

/// Print an error caught at the command boundary, with a hint about the
/// API key variable
#[inline]
pub fn report_error(error: &anyhow::Error, data_dir: &Path) {
    error!("{:#}", error);
    let api_key_env = Config::load(data_dir)
        .map(|config| config.provider.api_key_env)
        .unwrap_or_else(|_| DEFAULT_API_KEY_ENV.to_string());

    eprintln!("{}", style(format!("An error occurred: {error:#}")).red());
    eprintln!("Please make sure {api_key_env} is set correctly.");
}

/// Build (or with `rebuild`, rebuild) the index for the configured topic
#[inline]
pub async fn index_topic(data_dir: &Path, topic: Option<String>, rebuild: bool) -> Result<()> {
    let config = load_config(data_dir, topic)?;
    let topic = config.source.topic.clone();
    info!("Indexing topic: {}", topic);

    let mut indexer = Indexer::new(config)
        .await
        .context("Failed to initialize pipeline")?;

    let bar = spinner();
    let result = indexer
        .build_index_with_progress(&topic, rebuild, |stage| bar.set_message(stage.message()))
        .await;
    bar.finish_and_clear();
    let index = result?;

    match (&index.title, &index.source) {
        (Some(title), Some(source)) => {
            println!("Indexed '{}' ({} chunks)", title, index.chunk_count);
            println!("Source: {source}");
        }
        _ => println!("No Wikipedia article found for '{topic}'"),
    }

    Ok(())
}

/// Answer a single question and print the answer
#[inline]
pub async fn ask_question(
    data_dir: &Path,
    question: &str,
    topic: Option<String>,
    top_k: Option<usize>,
    show_sources: bool,
) -> Result<()> {
    let mut config = load_config(data_dir, topic)?;
    if let Some(top_k) = top_k {
        config.retrieval.set_top_k(top_k)?;
    }

    let indexer = Indexer::new(config)
        .await
        .context("Failed to initialize pipeline")?;
    let mut session = QaSession::from_config(indexer);

    if question.trim().is_empty() {
        eprintln!("{}", style(EMPTY_QUESTION_WARNING).yellow());
        return Ok(());
    }

    prepare_session(&mut session).await?;
    answer_with_spinner(&mut session, question, show_sources).await
}

/// Interactive loop over the configured topic with the preset questions
#[inline]
pub async fn run_chat(data_dir: &Path, topic: Option<String>) -> Result<()> {
    let config = load_config(data_dir, topic)?;
    let indexer = Indexer::new(config)
        .await
        .context("Failed to initialize pipeline")?;
    let mut session = QaSession::from_config(indexer);

    eprintln!(
        "{}",
        style(format!("💀 Ask me about {}", session.topic()))
            .bold()
            .cyan()
    );
    eprintln!();

    let mut items = vec![OWN_QUESTION];
    items.extend(EXAMPLE_QUESTIONS);
    items.push(QUIT);

    loop {
        let selection = Select::new()
            .with_prompt("Choose a question")
            .items(&items)
            .default(0)
            .interact()?;

        let question = match items[selection] {
            QUIT => break,
            OWN_QUESTION => Input::<String>::new()
                .with_prompt("Your question")
                .allow_empty(true)
                .interact_text()?,
            example => example.to_string(),
        };

        if question.trim().is_empty() {
            eprintln!("{}", style(EMPTY_QUESTION_WARNING).yellow());
            continue;
        }

        let result = match prepare_session(&mut session).await {
            Ok(()) => answer_with_spinner(&mut session, &question, false).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            report_error(&e, data_dir);
        }
        println!();
    }

    Ok(())
}

async fn prepare_session(session: &mut QaSession) -> Result<()> {
    if session.is_ready() {
        return Ok(());
    }

    let bar = spinner();
    let result = session
        .ensure_index_with_progress(|stage| bar.set_message(stage.message()))
        .await;
    bar.finish_and_clear();

    let index = result?;
    if index.is_empty() {
        eprintln!(
            "{}",
            style(format!(
                "⚠ No Wikipedia article found for '{}', answers will have no context",
                session.topic()
            ))
            .yellow()
        );
    }
    Ok(())
}

async fn answer_with_spinner(
    session: &mut QaSession,
    question: &str,
    show_sources: bool,
) -> Result<()> {
    let bar = spinner();
    bar.set_message("Thinking...");
    let reply = session.ask(question).await;
    bar.finish_and_clear();

    match reply? {
        Reply::EmptyQuestion => eprintln!("{}", style(EMPTY_QUESTION_WARNING).yellow()),
        Reply::Answer(answer) => {
            println!("{}", style("Answer:").bold().green());
            println!("{}", answer.text);
            if show_sources {
                println!();
                println!("{}", style("Sources:").bold().yellow());
                for line in format_sources(&answer.sources) {
                    println!("{line}");
                }
            }
        }
    }
    Ok(())
}

/// One line per retrieved chunk: rank, score and text
fn format_sources(sources: &[SearchResult]) -> Vec<String> {
    sources
        .iter()
        .enumerate()
        .map(|(i, result)| {
            format!(
                "  [{}] ({:.3}) {}",
                i + 1,
                result.similarity_score,
                result.chunk_metadata.content.replace('\n', " ")
            )
        })
        .collect()
}

/// List indexed topics with their status
#[inline]
pub async fn list_topics(data_dir: &Path) -> Result<()> {
    let config = load_config(data_dir, None)?;
    let indexer = Indexer::new(config)
        .await
        .context("Failed to initialize pipeline")?;

    let topics = indexer
        .list_topics()
        .await
        .context("Failed to list topics")?;

    if topics.is_empty() {
        println!("No topics have been indexed yet.");
        println!("Use 'wiki-rag index' to index the configured topic.");
        return Ok(());
    }

    println!("Indexed Topics ({} total):", topics.len());
    println!();

    for topic in &topics {
        println!("📚 {} (ID: {})", topic.topic, topic.id);
        if let Some(title) = &topic.title {
            println!("   Article: {title}");
        }
        if let Some(url) = &topic.source_url {
            println!("   URL: {url}");
        }
        println!("   Status: {}", topic.status);
        println!("   Chunks: {}", topic.chunk_count);

        if let Some(indexed_date) = topic.indexed_date {
            println!(
                "   Last Indexed: {}",
                indexed_date.format("%Y-%m-%d %H:%M:%S")
            );
        }
        if let Some(error) = &topic.error_message {
            println!("   ⚠️  Error: {error}");
        }
        println!(
            "   Created: {}",
            topic.created_date.format("%Y-%m-%d %H:%M:%S")
        );
        println!();
    }

    println!("Summary:");
    println!(
        "  Completed: {}",
        topics.iter().filter(|t| t.is_completed()).count()
    );
    println!(
        "  Currently Indexing: {}",
        topics.iter().filter(|t| t.is_indexing()).count()
    );
    println!(
        "  Failed: {}",
        topics.iter().filter(|t| t.is_failed()).count()
    );

    Ok(())
}

/// Delete a topic's stored chunks and its record
#[inline]
pub async fn delete_topic(data_dir: &Path, topic: &str) -> Result<()> {
    let config = load_config(data_dir, None)?;
    let mut indexer = Indexer::new(config)
        .await
        .context("Failed to initialize pipeline")?;

    match indexer.delete_topic(topic).await? {
        Some(removed) => {
            println!("Deleted topic '{topic}'");
            println!("✓ {removed} embeddings removed");
        }
        None => anyhow::bail!("Topic not found: {topic}"),
    }

    Ok(())
}

/// Show provider, store and metadata health
#[inline]
pub async fn show_status(data_dir: &Path) -> Result<()> {
    let config = load_config(data_dir, None)?;

    println!("📊 wiki-rag Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Provider Status:");
    match ProviderClient::new(&config) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!("   ✅ Provider: Connected ({})", client.base_url());
                println!("   📋 Embedding Model: {}", config.embedding.model);
                println!("   💬 Chat Model: {}", config.generation.model);
            }
            Err(e) => println!("   ⚠️  Provider: Unreachable - {e:#}"),
        },
        Err(e) => println!("   ❌ Provider: Invalid configuration - {e:#}"),
    }
    if config.api_key().is_none() {
        println!("   ⚠️  {} is not set", config.provider.api_key_env);
    }

    println!();
    let indexer = match Indexer::new(config).await {
        Ok(indexer) => indexer,
        Err(e) => {
            println!("🗄️  Storage: ❌ Failed to open - {e}");
            return Ok(());
        }
    };

    println!("🔍 Storage Status:");
    let stats = indexer.stats().await?;
    if stats.store_healthy {
        println!(
            "   ✅ LanceDB: '{}' ({} metric)",
            indexer.vector_store().table_name(),
            indexer.vector_store().metric()
        );
    } else {
        println!("   ❌ LanceDB: Integrity check failed");
    }
    println!("   ✅ SQLite: Connected");
    println!("   📊 Embeddings: {}", stats.total_embeddings);

    println!();
    println!("📚 Topic Overview:");
    println!("   📊 Total Topics: {}", stats.total_topics);
    println!("   ✅ Completed: {}", stats.completed_topics);
    println!("   🔄 Currently Indexing: {}", stats.indexing_topics);
    println!("   ❌ Failed: {}", stats.failed_topics);

    println!();
    println!("🔍 Consistency:");
    if stats.is_consistent() {
        println!("   ✅ Metadata and vector store agree");
    } else {
        for topic in stats.topics.iter().filter(|t| !t.is_consistent()) {
            println!(
                "   ⚠️  {}: {} recorded, {} stored",
                topic.topic, topic.recorded_chunks, topic.stored_embeddings
            );
        }
        if stats.untracked_embeddings > 0 {
            println!(
                "   👻 Untracked embeddings: {}",
                stats.untracked_embeddings
            );
        }
        println!("   Use 'wiki-rag index --rebuild' to rebuild the configured topic.");
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'wiki-rag index' to index the configured topic");
    println!("   • Use 'wiki-rag ask \"<question>\"' for a one-shot answer");
    println!("   • Use 'wiki-rag chat' for the interactive session");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::lancedb::ChunkMetadata;

    fn result(content: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk_metadata: ChunkMetadata {
                source: "https://en.wikipedia.org/wiki/Day_of_the_Dead".to_string(),
                title: "Day of the Dead".to_string(),
                content: content.to_string(),
                chunk_index: 0,
                created_at: "2024-01-01T00:00:00Z".to_string(),
            },
            similarity_score: score,
            distance: 1.0 - score,
        }
    }

    #[test]
    fn sources_are_ranked_and_flattened() {
        let lines = format_sources(&[
            result("Observed on\nNovember 2.", 0.9),
            result("Marigolds.", 0.5),
        ]);
        assert_eq!(
            lines,
            [
                "  [1] (0.900) Observed on November 2.",
                "  [2] (0.500) Marigolds."
            ]
        );
    }

    #[test]
    fn no_sources_no_lines() {
        assert!(format_sources(&[]).is_empty());
    }

    #[test]
    fn topic_override_is_trimmed() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let config =
            load_config(dir.path(), Some("  Calavera ".to_string())).expect("config should load");
        assert_eq!(config.source.topic, "Calavera");

        let config = load_config(dir.path(), None).expect("config should load");
        assert_eq!(config.source.topic, "Day of the Dead");
    }
}
