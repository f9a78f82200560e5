use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use care_router::config::{self, AppConfig};
use care_router::eval;
use care_router::pipeline::{CareRouter, ConversationState, CustomerProfile, Topic};
use care_router::store::LibSqlStore;

/// care-router - classify, score and answer customer messages
#[derive(Parser, Debug)]
#[command(name = "care-router")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Sampling temperature for this invocation (0.0 - 1.5)
    #[arg(short, long, global = true)]
    temperature: Option<f32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive multi-turn conversation. /quit to exit.
    Chat {
        /// Customer tenure in months
        #[arg(long)]
        tenure: Option<f64>,
        /// Customer monthly charges
        #[arg(long)]
        monthly_charges: Option<f64>,
    },
    /// Route a single message and print the resulting state as JSON
    Run {
        message: String,
        #[arg(long)]
        tenure: Option<f64>,
        #[arg(long)]
        monthly_charges: Option<f64>,
    },
    /// Run the pipeline over sampled dataset reviews
    Eval {
        /// Reviews sampled per topic
        #[arg(short, default_value_t = 3)]
        k: usize,
        /// Topics to sample (default: support, billing, delivery, product, app)
        #[arg(long, value_delimiter = ',', value_parser = parse_topic)]
        topics: Vec<Topic>,
        /// Store model replies in the database
        #[arg(long)]
        save: bool,
    },
    /// Answer one prompt as if it were negative, neutral and positive
    Variants { prompt: String },
    /// Import reviews from a JSON-lines file
    Import { path: PathBuf },
    /// Dataset counts, recent pipeline runs and model outputs
    Stats {
        #[arg(short = 'n', long, default_value_t = 5)]
        limit: usize,
    },
}

fn parse_topic(s: &str) -> Result<Topic, String> {
    Topic::from_label(s).ok_or_else(|| format!("unknown topic '{s}'"))
}

fn profile(tenure: Option<f64>, monthly_charges: Option<f64>) -> CustomerProfile {
    let mut profile = CustomerProfile::new();
    if let Some(tenure) = tenure {
        profile = profile.with("tenure", tenure);
    }
    if let Some(monthly) = monthly_charges {
        profile = profile.with("monthly_charges", monthly);
    }
    profile
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let db_path = config::db_path_from_env();

    // Commands that never talk to the model do not need an API key.
    match &args.command {
        Command::Import { path } => {
            let store = LibSqlStore::new_local(&db_path)
                .await
                .with_context(|| format!("opening database at {}", db_path.display()))?;
            let imported = store
                .import_reviews_jsonl(path)
                .await
                .with_context(|| format!("importing {}", path.display()))?;
            println!("Imported {imported} reviews from {}", path.display());
            return Ok(());
        }
        Command::Stats { limit } => {
            let store = LibSqlStore::new_local(&db_path)
                .await
                .with_context(|| format!("opening database at {}", db_path.display()))?;
            return print_stats(&store, *limit).await;
        }
        _ => {}
    }

    let config = AppConfig::from_env().context("loading configuration")?;
    let (mut router, store) = CareRouter::open(&config)
        .await
        .with_context(|| format!("opening router with database {}", config.db_path.display()))?;
    if let Some(temperature) = args.temperature {
        router.set_temperature(temperature);
    }

    eprintln!("care-router v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Temperature: {}", router.config().temperature);

    match args.command {
        Command::Chat {
            tenure,
            monthly_charges,
        } => chat(&router, profile(tenure, monthly_charges)).await?,
        Command::Run {
            message,
            tenure,
            monthly_charges,
        } => {
            let state = ConversationState::new(message)
                .with_profile(profile(tenure, monthly_charges))
                .with_session(Uuid::new_v4().to_string());
            let state = router.run(state).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Command::Eval { k, topics, save } => {
            let topics = if topics.is_empty() {
                Topic::EVAL.to_vec()
            } else {
                topics
            };
            let results = eval::run_eval(&router, &store, &topics, k, save).await;
            for result in &results {
                println!("── {} [{}]", result.review.review_id, result.review.topic);
                println!("PROMPT: {}", result.review.prompt);
                println!("IDEAL:  {}", result.review.ideal_response);
                println!("MODEL:  {}\n", result.model_reply);
            }
            eprintln!("Evaluated {} reviews", results.len());
        }
        Command::Variants { prompt } => {
            for (sentiment, state) in eval::sentiment_variants(&router, &prompt).await? {
                println!(
                    "── {} (escalate: {})\n{}\n",
                    sentiment.as_str(),
                    state.escalate,
                    state.final_reply.unwrap_or_default()
                );
            }
        }
        Command::Import { .. } | Command::Stats { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Stdin REPL. The state is carried between turns so the negative streak
/// accumulates across the conversation.
async fn chat(router: &CareRouter, profile: CustomerProfile) -> anyhow::Result<()> {
    eprintln!("   Type a message and press Enter. /quit to exit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let session = Uuid::new_v4().to_string();
    let mut state: Option<ConversationState> = None;

    eprint!("> ");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            eprint!("> ");
            continue;
        }
        if line == "/quit" {
            break;
        }

        let next = match state.take() {
            Some(previous) => previous.next_turn(line),
            None => ConversationState::new(line)
                .with_profile(profile.clone())
                .with_session(session.clone()),
        };
        let kept = next.clone();

        match router.run(next).await {
            Ok(routed) => {
                println!("\n{}\n", routed.final_reply.as_deref().unwrap_or_default());
                if routed.escalate {
                    eprintln!("   [escalated to a senior specialist]");
                }
                state = Some(routed);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to route message");
                state = Some(kept);
            }
        }
        eprint!("> ");
    }
    Ok(())
}

async fn print_stats(store: &LibSqlStore, limit: usize) -> anyhow::Result<()> {
    println!("Reviews:");
    for count in store.review_counts().await? {
        println!(
            "  {:<10} {:<10} {}",
            count.topic,
            count.sentiment.as_deref().unwrap_or("-"),
            count.count
        );
    }

    println!("\nRecent pipeline runs:");
    for event in store.recent_events(limit).await? {
        println!(
            "  {} {:<8} escalate={} streak={} label={}",
            event.created_at.format("%Y-%m-%d %H:%M:%S"),
            event.topic,
            event.escalate,
            event.negative_streak,
            event.churn_label.as_deref().unwrap_or("-")
        );
    }

    println!("\nLatest model outputs:");
    for output in store.latest_model_outputs(limit).await? {
        println!("  [{}] {}", output.topic, output.prompt);
        println!("      -> {}", output.model_reply);
    }
    Ok(())
}
