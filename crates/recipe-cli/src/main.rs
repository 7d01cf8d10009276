//! cookrag CLI - Command-line interface for the recipe assistant.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use recipe_assistant::{Answer, RecipeAssistant};
use recipe_core::{attr, Category, CookRagConfig, CorpusStats, Difficulty, Generator, Predicate};
use recipe_llm::ChatGenerator;
use recipe_query::Retrieval;

/// cookrag - Ask questions about a markdown recipe collection
#[derive(Parser)]
#[command(name = "cookrag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/cookrag/config.toml, then ./cookrag.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Recipe directory
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Snapshot file
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Fused fragments kept per query
    #[arg(short = 'k', long, global = true)]
    top_k: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index snapshot (reused when up to date)
    Build {
        /// Rebuild even if the snapshot is current
        #[arg(long)]
        force: bool,
    },

    /// Answer one question
    Ask {
        /// The question
        question: String,

        /// Print the answer as JSON
        #[arg(long)]
        json: bool,
    },

    /// Retrieval only: show fused fragments and recipes
    Search {
        /// Search query
        query: String,

        /// Restrict to a category (meat, vegetable, soup, ...)
        #[arg(long)]
        category: Option<String>,

        /// Restrict to a difficulty (very_easy, easy, medium, hard, very_hard)
        #[arg(long)]
        difficulty: Option<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive question loop (:rebuild, :stats, :quit)
    Chat {
        /// Wait for each full answer instead of printing it as it arrives
        #[arg(long)]
        no_stream: bool,
    },

    /// Show corpus statistics
    Stats {
        /// Write per-recipe metadata JSON to this file
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(cli: &Cli) -> Result<CookRagConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => CookRagConfig::load(path)?,
        None => CookRagConfig::load_default()?,
    };

    if let Some(data) = &cli.data {
        config.corpus.data_path = data.clone();
    }
    if let Some(snapshot) = &cli.snapshot {
        config.corpus.snapshot_path = snapshot.clone();
    }
    if let Some(top_k) = cli.top_k {
        config.retrieval.top_k = top_k;
    }

    debug!("Config: {:?}", config);
    Ok(config)
}

async fn open_assistant(
    config: CookRagConfig,
    with_generator: bool,
) -> Result<RecipeAssistant, Box<dyn std::error::Error>> {
    let embedder = recipe_embed::from_config(&config.embedding)?;
    let generator: Option<Arc<dyn Generator>> = if with_generator {
        Some(Arc::new(ChatGenerator::from_config(&config.generation)?))
    } else {
        None
    };

    Ok(RecipeAssistant::open(config, embedder, generator).await?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Build { force } => {
            let assistant = open_assistant(config, false).await?;
            let mut report = assistant.report();
            if force && !report.rebuilt {
                report = assistant.rebuild(true).await?;
            }
            println!(
                "{} snapshot {}: {} recipes, {} fragments",
                if report.rebuilt { "Built" } else { "Reused" },
                short(&report.fingerprint),
                report.parents,
                report.fragments
            );
        }
        Commands::Ask { question, json } => {
            let assistant = open_assistant(config, true).await?;
            let answer = assistant.ask(&question).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print_answer(&answer);
            }
        }
        Commands::Search {
            query,
            category,
            difficulty,
            json,
        } => {
            let filter = explicit_filter(category.as_deref(), difficulty.as_deref())?;
            let assistant = open_assistant(config, false).await?;
            let retrieval = assistant.search(&query, filter).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&retrieval_json(&retrieval))?);
            } else {
                print_retrieval(&retrieval);
            }
        }
        Commands::Chat { no_stream } => {
            let assistant = open_assistant(config, true).await?;
            chat(&assistant, !no_stream).await?;
        }
        Commands::Stats { export } => {
            let assistant = open_assistant(config, false).await?;
            print_stats(&assistant.stats());
            if let Some(path) = export {
                export_metadata(&assistant, &path)?;
            }
        }
    }

    Ok(())
}

/// Predicate from `--category` / `--difficulty`, `None` if neither is given.
fn explicit_filter(
    category: Option<&str>,
    difficulty: Option<&str>,
) -> Result<Option<Predicate>, Box<dyn std::error::Error>> {
    let mut predicate = Predicate::new();

    if let Some(value) = category {
        let category = Category::ALL
            .iter()
            .find(|c| c.as_str() == value || c.label_zh() == value)
            .ok_or_else(|| format!("unknown category {:?}", value))?;
        predicate = predicate.equals(attr::CATEGORY, category.as_str());
    }
    if let Some(value) = difficulty {
        let difficulty = Difficulty::ALL
            .iter()
            .find(|d| d.as_str() == value || d.label_zh() == value)
            .ok_or_else(|| format!("unknown difficulty {:?}", value))?;
        predicate = predicate.equals(attr::DIFFICULTY, difficulty.as_str());
    }

    Ok((!predicate.is_empty()).then_some(predicate))
}

async fn chat(assistant: &RecipeAssistant, stream: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Ask about recipes. Commands: :rebuild, :stats, :quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };

        match line.trim() {
            "" => continue,
            ":quit" | ":q" => break,
            ":stats" => print_stats(&assistant.stats()),
            ":rebuild" => match assistant.rebuild(true).await {
                Ok(report) => println!(
                    "Rebuilt snapshot {}: {} recipes",
                    short(&report.fingerprint),
                    report.parents
                ),
                Err(e) => eprintln!("Error: {}", e),
            },
            question if stream => {
                let mut print = |text: &str| {
                    print!("{}", text);
                    std::io::stdout().flush().ok();
                };
                match assistant.ask_streaming(question, &mut print).await {
                    Ok(answer) => {
                        println!("\n");
                        print_sources(&answer);
                    }
                    Err(e) => eprintln!("\nError: {}", e),
                }
            }
            question => match assistant.ask(question).await {
                Ok(answer) => print_answer(&answer),
                Err(e) => eprintln!("Error: {}", e),
            },
        }
    }

    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("{}\n", answer.answer);
    print_sources(answer);
}

/// Recipes, filter and warnings behind an answer.
fn print_sources(answer: &Answer) {
    if !answer.recipes.is_empty() {
        let names: Vec<&str> = answer.recipes.iter().map(|r| r.name.as_str()).collect();
        println!("[{}] {}", answer.intent, names.join(", "));
    }
    if let Some(filter) = &answer.filter {
        println!("filter: {}", filter);
    }
    for diagnostic in &answer.diagnostics {
        eprintln!("warning: {}", diagnostic);
    }
}

fn print_retrieval(retrieval: &Retrieval) {
    println!(
        "Found {} recipes in {}ms:\n",
        retrieval.parents.len(),
        retrieval.latency_ms
    );

    for (i, parent) in retrieval.parents.iter().enumerate() {
        println!(
            "[{}] {} ({}) tally={} score={:.4}",
            i + 1,
            parent.parent.name,
            parent.parent.source,
            parent.tally,
            parent.fused_score
        );
    }

    println!("\nFused fragments:");
    for fused in &retrieval.fused {
        println!(
            "  {} score={:.4} semantic={} lexical={}",
            fused.fragment_id,
            fused.score,
            rank(fused.semantic_rank),
            rank(fused.lexical_rank)
        );
    }

    for diagnostic in &retrieval.diagnostics {
        eprintln!("warning: {}", diagnostic);
    }
}

fn rank(rank: Option<u32>) -> String {
    rank.map_or_else(|| "-".to_string(), |r| r.to_string())
}

fn retrieval_json(retrieval: &Retrieval) -> serde_json::Value {
    serde_json::json!({
        "query": retrieval.query,
        "fingerprint": retrieval.fingerprint,
        "latency_ms": retrieval.latency_ms,
        "channels": retrieval.channels,
        "fused": retrieval.fused,
        "parents": retrieval.parents.iter().map(|p| serde_json::json!({
            "id": p.parent.id,
            "name": p.parent.name,
            "source": p.parent.source,
            "attributes": p.parent.attributes,
            "tally": p.tally,
            "first_position": p.first_position,
            "fragment_ids": p.fragment_ids,
            "fused_score": p.fused_score,
        })).collect::<Vec<_>>(),
        "diagnostics": retrieval.diagnostics.iter().map(|d| serde_json::json!({
            "code": d.error_code(),
            "message": d.to_string(),
        })).collect::<Vec<_>>(),
    })
}

fn print_stats(stats: &CorpusStats) {
    println!("Corpus statistics:\n");
    println!("- Recipes: {}", stats.parents);
    println!("- Fragments: {}", stats.fragments);
    println!("- Average fragment length: {:.1} chars", stats.avg_fragment_chars);

    println!("\nCategories:");
    for (category, count) in &stats.categories {
        println!("  {}: {}", category, count);
    }
    println!("\nDifficulties:");
    for (difficulty, count) in &stats.difficulties {
        println!("  {}: {}", difficulty, count);
    }
}

fn export_metadata(assistant: &RecipeAssistant, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let count = assistant.export_metadata(path)?;
    println!("\nExported metadata for {} recipes to {}", count, path.display());
    Ok(())
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}
