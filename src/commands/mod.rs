
use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use std::fs;
use std::path::Path;
use tracing::{error, info};

use crate::config::{API_KEY_ENV_VAR, Config};
use crate::embeddings::{Embedder, OllamaClient};
use crate::engine::{BuildOutcome, EngineCell, RetrievalEngine};
use crate::extractor::{FileProcessor, TextExtractor};
use crate::generation::{GeminiClient, ResponseGenerator, format_context};
use crate::store::IndexPersistence;

/// Reply when retrieval finds nothing to ground an answer on
pub const NO_RELEVANT_INFORMATION: &str = "No relevant information found";
/// Reply when the generation service fails
pub const GENERATION_FAILED: &str = "Error processing request";

/// A generated answer and the sources it was grounded on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub response: String,
    pub sources: Vec<String>,
}

/// Retrieve context for `question` and ask `generator` to answer from it.
///
/// Never fails: an empty retrieval or a generation error produce fixed
/// user-facing replies.
#[inline]
pub fn answer_question<E, X, G>(
    engine: &RetrievalEngine<E, X>,
    generator: &G,
    question: &str,
    top_k: usize,
    max_context_chars: usize,
) -> Answer
where
    E: Embedder,
    X: TextExtractor,
    G: ResponseGenerator,
{
    let result = engine.query(question, top_k);
    if result.is_empty() {
        info!("No documents retrieved for question");
        return Answer {
            response: NO_RELEVANT_INFORMATION.to_string(),
            sources: Vec::new(),
        };
    }

    let sources = result
        .metadatas()
        .into_iter()
        .map(|m| m.source.clone())
        .collect();
    let context = format_context(&result, max_context_chars);

    match generator.generate(question, &context) {
        Ok(response) => Answer { response, sources },
        Err(e) => {
            error!("Response generation failed: {:#}", e);
            Answer {
                response: GENERATION_FAILED.to_string(),
                sources,
            }
        }
    }
}

fn open_engine(config: &Config) -> Result<RetrievalEngine<OllamaClient>> {
    let embedder =
        OllamaClient::new(&config.ollama).context("Failed to create Ollama embedding client")?;
    Ok(RetrievalEngine::from_config(config, embedder))
}

/// Build the index, or reuse the persisted one unless `rebuild` is set
#[inline]
pub fn index_documents(base_dir: &Path, rebuild: bool) -> Result<()> {
    let config = Config::load(base_dir).context("Failed to load configuration")?;
    let mut engine = open_engine(&config)?;

    let outcome = if rebuild {
        engine.rebuild()
    } else {
        engine.build_or_load()
    }
    .context("Failed to build the document index")?;

    match outcome {
        BuildOutcome::Reused { documents } => {
            println!(
                "{} Reused existing index with {} documents",
                style("✓").green(),
                documents
            );
            println!("Run with --rebuild to index the documents folder again.");
        }
        BuildOutcome::Built { documents, skipped } => {
            println!(
                "{} Indexed {} documents from {}",
                style("✓").green(),
                documents,
                engine.documents_dir().display()
            );
            if skipped > 0 {
                println!(
                    "{} {} files could not be processed (see logs)",
                    style("⚠").yellow(),
                    skipped
                );
            }
        }
    }

    Ok(())
}

/// Print the documents retrieved for `text`
#[inline]
pub fn query_documents(base_dir: &Path, text: &str, top_k: Option<usize>) -> Result<()> {
    let config = Config::load(base_dir).context("Failed to load configuration")?;
    let mut engine = open_engine(&config)?;
    engine
        .build_or_load()
        .context("Failed to build the document index")?;

    let result = engine.query(text, top_k.unwrap_or(config.retrieval.top_k));
    if result.is_empty() {
        println!("{}", NO_RELEVANT_INFORMATION);
        return Ok(());
    }

    for (rank, hit) in result.iter().enumerate() {
        println!(
            "{}. {} {}",
            rank + 1,
            style(&hit.metadata.source).bold().cyan(),
            style(format!("(distance {:.4})", hit.distance)).dim()
        );
        let preview: String = hit.text.chars().take(200).collect();
        println!("   {}", preview.split_whitespace().collect::<Vec<_>>().join(" "));
    }

    Ok(())
}

/// Answer a single question from the indexed documents
#[inline]
pub fn ask_question(base_dir: &Path, question: &str, top_k: Option<usize>) -> Result<()> {
    let config = Config::load(base_dir).context("Failed to load configuration")?;
    let generator = GeminiClient::new(&config.gemini)
        .with_context(|| format!("Set {API_KEY_ENV_VAR} to enable answers"))?;

    let mut engine = open_engine(&config)?;
    engine
        .build_or_load()
        .context("Failed to build the document index")?;

    let answer = answer_question(
        &engine,
        &generator,
        question,
        top_k.unwrap_or(config.retrieval.top_k),
        config.retrieval.max_context_chars,
    );
    print_answer(&answer);
    Ok(())
}

/// Interactive question loop; `exit` or `quit` leaves
#[inline]
pub fn chat(base_dir: &Path) -> Result<()> {
    let config = Config::load(base_dir).context("Failed to load configuration")?;
    let generator = GeminiClient::new(&config.gemini)
        .with_context(|| format!("Set {API_KEY_ENV_VAR} to enable answers"))?;

    let engine_cell: EngineCell<OllamaClient> = EngineCell::new();

    eprintln!("{}", style("📄 Document Q&A").bold().cyan());
    eprintln!("Ask questions about your documents. Type 'exit' to quit.");
    eprintln!();

    loop {
        let question: String = Input::new()
            .with_prompt("Question")
            .allow_empty(true)
            .interact_text()?;
        let question = question.trim();

        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        let engine = engine_cell
            .get_or_build(|| Ok(open_engine(&config)?))
            .context("Failed to build the document index")?;

        let answer = answer_question(
            engine,
            &generator,
            question,
            config.retrieval.top_k,
            config.retrieval.max_context_chars,
        );
        print_answer(&answer);
        println!();
    }

    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.response);
    if !answer.sources.is_empty() {
        println!();
        println!(
            "{} {}",
            style("Sources:").dim(),
            style(answer.sources.join(", ")).dim()
        );
    }
}

/// Describe the documents folder, the persisted index and the services
#[inline]
pub fn show_status(base_dir: &Path) -> Result<()> {
    let config = Config::load(base_dir).unwrap_or_else(|_| Config::with_base_dir(base_dir));

    println!("📊 docqa Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("📁 Documents:");
    let documents_path = config.documents_path();
    match fs::read_dir(&documents_path) {
        Ok(entries) => {
            let (supported, other) = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file())
                .fold((0_usize, 0_usize), |(supported, other), path| {
                    if FileProcessor::is_supported(&path) {
                        (supported + 1, other)
                    } else {
                        (supported, other + 1)
                    }
                });
            println!("   Folder: {}", documents_path.display());
            println!("   Supported files: {}", supported);
            if other > 0 {
                println!("   Unsupported files: {}", other);
            }
        }
        Err(_) => {
            println!("   ❌ {} does not exist yet", documents_path.display());
        }
    }

    println!();
    println!("🔍 Index:");
    let persistence = IndexPersistence::new(config.index_path());
    if persistence.exists() {
        match persistence.load() {
            Ok(generation) => {
                println!("   ✅ {} documents", generation.store.len());
                println!("   Generation: {}", generation.id);
                println!("   Built: {}", generation.built_at.to_rfc3339());
                println!("   Dimension: {}", generation.index.dimension());
                for source in generation.store.sources() {
                    println!("   • {}", source);
                }
            }
            Err(e) => {
                println!("   ⚠️  Unreadable, will be rebuilt on next use: {}", e);
            }
        }
    } else {
        println!("   💤 Not built yet. Run 'docqa index'.");
    }

    println!();
    println!("🤖 Ollama:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.health_check() {
            Ok(()) => println!(
                "   ✅ Connected ({}:{}), model {}",
                config.ollama.host, config.ollama.port, config.ollama.model
            ),
            Err(e) => println!("   ⚠️  Unhealthy: {:#}", e),
        },
        Err(e) => println!("   ❌ Invalid configuration: {:#}", e),
    }

    println!();
    println!("✨ Gemini:");
    println!("   Model: {}", config.gemini.model);
    if config.gemini.api_key.is_some() {
        println!("   ✅ API key set");
    } else {
        println!("   ❌ {} is not set", API_KEY_ENV_VAR);
    }

    Ok(())
}
