mod chunks;
mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sift_core::{Config, Engine, EventSink, Services};
use sift_corpus::{CorpusAccessor, InMemoryVectorIndex, VectorSearch};
use sift_llm::{CompatibleProvider, LlmProvider};
use tokio_util::sync::CancellationToken;

use crate::chunks::load_chunks;
use crate::cli::{AskArgs, Cli, Command, CorpusArgs, Mode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();
    let config = Config::load(&resolve_config_path(cli.config.as_deref()))?;
    let provider = Arc::new(build_provider(&config));

    match cli.command {
        Command::Index(args) => {
            let engine = build_engine(&provider, config, &args.corpus).await?;
            let snapshot = engine.snapshot();
            println!("{}", serde_json::to_string_pretty(snapshot.groups())?);
        }
        Command::Ask(args) => ask(&provider, config, args).await?,
    }
    Ok(())
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("SIFT_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

fn build_provider(config: &Config) -> CompatibleProvider {
    let llm = &config.llm;
    CompatibleProvider::new(
        llm.api_key.clone(),
        llm.base_url.clone(),
        llm.model.clone(),
        llm.max_tokens,
        llm.embedding_model.clone(),
    )
}

async fn build_engine(
    provider: &Arc<CompatibleProvider>,
    config: Config,
    args: &CorpusArgs,
) -> anyhow::Result<Engine<CompatibleProvider>> {
    let chunks = load_chunks(&args.chunks)?;
    let services = Services {
        summarizer: (!args.no_summarize).then(|| Arc::clone(provider)),
        vector: None,
    };
    let engine = Engine::new(Arc::clone(provider), services, config)
        .with_cancellation(cancel_on_ctrl_c());
    engine
        .rebuild(chunks)
        .await
        .context("failed to build corpus")?;
    Ok(engine)
}

async fn ask(
    provider: &Arc<CompatibleProvider>,
    config: Config,
    args: AskArgs,
) -> anyhow::Result<()> {
    let mut engine = build_engine(provider, config, &args.corpus).await?;

    if provider.supports_embeddings() {
        match InMemoryVectorIndex::build(Arc::clone(provider), &engine.snapshot()).await {
            Ok(index) => {
                let index: Arc<dyn VectorSearch> = Arc::new(index);
                engine.set_vector(Some(index));
            }
            Err(e) => tracing::warn!("vector search disabled: {e}"),
        }
    }

    let printer = if args.events {
        let (sink, mut rx) = EventSink::channel();
        engine = engine.with_events(sink);
        Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Ok(line) = serde_json::to_string(&event) {
                    eprintln!("{line}");
                }
            }
        }))
    } else {
        None
    };

    match args.mode {
        Mode::React => {
            let outcome = engine.ask(&args.question).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.answer);
                print_sources(&outcome.sources);
            }
        }
        Mode::Multihop => {
            let outcome = engine.plan(&args.question).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.rendered_context());
                print_sources(&outcome.sources);
            }
        }
    }

    drop(engine);
    if let Some(printer) = printer {
        let _ = printer.await;
    }
    Ok(())
}

fn print_sources(sources: &[String]) {
    if !sources.is_empty() {
        println!("\nSources: {}", sources.join(", "));
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("ctrl-c received, cancelling session");
        trigger.cancel();
    });
    token
}
