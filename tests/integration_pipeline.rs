#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! End-to-end tests for the question-answering pipeline
//!
//! Wikipedia, the embedding endpoint and the chat endpoint are served by a
//! wiremock server:
//! - embeddings are hashed bag-of-words vectors
//! - the chat model answers from the context lines in its prompt and says
//!   it does not know when none of them share a word with the question

use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use wiki_rag::RagError;
use wiki_rag::config::{Config, EmbeddingConfig, ProviderConfig, SourceConfig};
use wiki_rag::pipeline::Indexer;
use wiki_rag::session::{IndexState, QaSession, Reply};

const TOPIC: &str = "Day of the Dead";
const ARTICLE_URL: &str = "https://en.wikipedia.org/wiki/Day_of_the_Dead";
const DONT_KNOW: &str = "I don't know.";
const DIMENSION: usize = 64;
const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const ARTICLE: &str = "The Day of the Dead (Spanish: Día de Muertos) is a holiday traditionally celebrated in Mexico.

The Day of the Dead is observed on November 1 and November 2.

The multi-day holiday involves family and friends gathering to pay respects and to remember friends and family members who have died.

== Traditions ==
Families build private altars called ofrendas, honoring the deceased using calaveras, marigolds, and the favorite foods and beverages of the departed.

Sugar skulls and the elegant skeleton La Calavera Catrina are traditional symbols of the celebration.

== Origins ==
Scholars trace the origins of the modern holiday to indigenous observances dating back hundreds of years and to an Aztec festival dedicated to the goddess Mictecacihuatl.";

struct BagOfWordsEmbedder;

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; DIMENSION];
    vector[0] = 0.1;
    for word in words(text) {
        let slot = word.bytes().map(usize::from).sum::<usize>() % (DIMENSION - 1) + 1;
        vector[slot] += 1.0;
    }
    vector
}

impl Respond for BagOfWordsEmbedder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = request.body_json().expect("request body should be json");
        let data: Vec<Value> = body["input"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(i, input)| {
                json!({"index": i, "embedding": bag_of_words(input.as_str().unwrap_or_default())})
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({"data": data}))
    }
}

/// Records every prompt and answers from the matching context line
#[derive(Clone, Default)]
struct ContextReadingModel {
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ContextReadingModel {
    fn last_prompt(&self) -> String {
        self.prompts
            .lock()
            .expect("prompt log should not be poisoned")
            .last()
            .cloned()
            .unwrap_or_default()
    }
}

fn fake_answer(prompt: &str) -> String {
    let (context, question) = prompt
        .rsplit_once("\n\nQuestion: ")
        .unwrap_or((prompt, ""));
    let keywords: Vec<String> = words(question).filter(|w| w.chars().count() >= 5).collect();

    context
        .lines()
        .skip(2)
        .find(|line| {
            let line = line.to_lowercase();
            keywords.iter().any(|k| line.contains(k.as_str()))
        })
        .map_or_else(
            || DONT_KNOW.to_string(),
            |line| format!("According to the article: {}", line.trim()),
        )
}

impl Respond for ContextReadingModel {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = request.body_json().expect("request body should be json");
        let prompt = body["messages"][0]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let answer = fake_answer(&prompt);
        self.prompts
            .lock()
            .expect("prompt log should not be poisoned")
            .push(prompt);

        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": answer}}]
        }))
    }
}

async fn start_services(model: ContextReadingModel) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("gsrsearch", TOPIC))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "batchcomplete": true,
            "query": {"pages": [{"title": TOPIC, "extract": ARTICLE, "fullurl": ARTICLE_URL}]}
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"batchcomplete": true})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(BagOfWordsEmbedder)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(model)
        .mount(&server)
        .await;
    server
}

fn create_test_config(server: &MockServer) -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let uri = Url::parse(&server.uri()).expect("mock server uri should parse");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        source: SourceConfig {
            wikipedia_url: server.uri(),
            ..SourceConfig::default()
        },
        provider: ProviderConfig {
            protocol: "http".to_string(),
            host: uri.host_str().unwrap_or("127.0.0.1").to_string(),
            port: uri.port().expect("mock server has a port"),
            ..ProviderConfig::default()
        },
        embedding: EmbeddingConfig {
            embedding_dimension: DIMENSION as u32,
            ..EmbeddingConfig::default()
        },
        ..Config::default()
    };
    (config, temp_dir)
}

#[tokio::test]
async fn observed_date_scenario() {
    let model = ContextReadingModel::default();
    let server = start_services(model.clone()).await;
    let (config, _temp_dir) = create_test_config(&server);
    let mut indexer = Indexer::new(config).await.expect("indexer should build");

    let answer = indexer
        .answer(TOPIC, "When is Day of the Dead observed?", 4)
        .await
        .expect("answer should succeed");

    assert!(!answer.sources.is_empty());
    assert!(
        answer
            .sources
            .iter()
            .any(|r| MONTHS.iter().any(|m| r.chunk_metadata.content.contains(m))),
        "a retrieved chunk should mention a month"
    );
    assert!(!answer.text.is_empty());
    assert!(answer.text.contains("November"), "answer: {}", answer.text);
}

#[tokio::test]
async fn unrelated_question_scenario() {
    let model = ContextReadingModel::default();
    let server = start_services(model.clone()).await;
    let (config, _temp_dir) = create_test_config(&server);
    let mut indexer = Indexer::new(config).await.expect("indexer should build");

    let answer = indexer
        .answer(TOPIC, "What is the boiling point of mercury?", 4)
        .await
        .expect("answer should succeed");

    assert_eq!(answer.text, DONT_KNOW);
    assert!(
        model
            .last_prompt()
            .contains("If you don't know the answer, simply state that you don't know."),
        "the prompt should carry the disclaimer instruction"
    );
}

#[tokio::test]
async fn retrieved_chunks_appear_in_prompt() {
    let model = ContextReadingModel::default();
    let server = start_services(model.clone()).await;
    let (config, _temp_dir) = create_test_config(&server);
    let mut indexer = Indexer::new(config).await.expect("indexer should build");

    let answer = indexer
        .answer(TOPIC, "What are the traditional symbols of Day of the Dead?", 4)
        .await
        .expect("answer should succeed");

    let prompt = model.last_prompt();
    assert!(prompt.starts_with("You are a bot that answers questions about Day of the Dead"));
    assert!(prompt.ends_with("Question: What are the traditional symbols of Day of the Dead?"));
    for result in &answer.sources {
        assert!(
            prompt.contains(&result.chunk_metadata.content),
            "chunk missing from prompt: {}",
            result.chunk_metadata.content
        );
    }
}

#[tokio::test]
async fn retrieval_respects_k_and_order() {
    let server = start_services(ContextReadingModel::default()).await;
    let (config, _temp_dir) = create_test_config(&server);
    let mut indexer = Indexer::new(config).await.expect("indexer should build");

    let index = indexer.build_index(TOPIC, false).await.expect("build");
    for k in 1..=index.chunk_count + 2 {
        let results = indexer
            .retrieve(TOPIC, "How is Day of the Dead celebrated?", k)
            .await
            .expect("retrieve should succeed");
        assert_eq!(results.len(), k.min(index.chunk_count));
        assert!(
            results
                .windows(2)
                .all(|w| w[0].similarity_score >= w[1].similarity_score)
        );
    }
}

#[tokio::test]
async fn rebuilding_keeps_entry_count() {
    let server = start_services(ContextReadingModel::default()).await;
    let (config, temp_dir) = create_test_config(&server);

    let first = {
        let mut indexer = Indexer::new(config.clone())
            .await
            .expect("indexer should build");
        indexer.build_index(TOPIC, false).await.expect("first build")
    };

    // A fresh process over the same directory, forcing a rebuild
    let mut indexer = Indexer::new(config).await.expect("indexer should reopen");
    let rebuilt = indexer.build_index(TOPIC, true).await.expect("rebuild");

    assert_eq!(first.chunk_count, rebuilt.chunk_count);
    assert_eq!(
        indexer
            .vector_store()
            .count_embeddings()
            .await
            .expect("count should succeed"),
        first.chunk_count
    );
    assert!(temp_dir.path().join("Wiki_DDM").exists());
}

#[tokio::test]
async fn empty_and_missing_topics_ingest_nothing() {
    let server = start_services(ContextReadingModel::default()).await;
    let (config, _temp_dir) = create_test_config(&server);
    let indexer = Indexer::new(config).await.expect("indexer should build");

    assert!(indexer.ingest("").expect("blank topic").is_empty());
    assert!(
        indexer
            .ingest("Qwxyz Not An Article")
            .expect("missing topic")
            .is_empty()
    );
}

#[tokio::test]
async fn session_answers_after_first_build() {
    let server = start_services(ContextReadingModel::default()).await;
    let (config, _temp_dir) = create_test_config(&server);
    let indexer = Indexer::new(config).await.expect("indexer should build");
    let mut session = QaSession::from_config(indexer);

    assert_eq!(session.ask("").await.expect("blank"), Reply::EmptyQuestion);
    assert_eq!(session.state(), &IndexState::NotBuilt);

    let reply = session
        .ask("When is Day of the Dead observed?")
        .await
        .expect("ask should succeed");
    assert!(matches!(reply, Reply::Answer(ref answer) if answer.text.contains("November")));
    assert!(session.is_ready());
}

#[tokio::test]
async fn provider_errors_reach_the_caller() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "query": {"pages": [{"title": TOPIC, "extract": ARTICLE, "fullurl": ARTICLE_URL}]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(BagOfWordsEmbedder)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": {"message": "Incorrect API key provided"}})),
        )
        .mount(&server)
        .await;

    let (config, _temp_dir) = create_test_config(&server);
    let mut indexer = Indexer::new(config).await.expect("indexer should build");

    let result = indexer
        .answer(TOPIC, "When is Day of the Dead observed?", 4)
        .await;
    assert!(matches!(result, Err(RagError::Generation(_))));

    // The index itself was built and stays usable
    assert!(indexer.built_index(TOPIC).is_some());
}
