// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Colloquy CLI entry point

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;

use colloquy::chat::Orchestrator;
use colloquy::config::Settings;
use colloquy::llm::factory::ProviderFactory;
use colloquy::llm::message::Source;
use colloquy::llm::provider::{ModelSelection, ProviderKind};
use colloquy::search::BraveSearch;

#[derive(Parser)]
#[command(name = "colloquy", version, about = "Streaming AI chat with web-grounded answers")]
struct Cli {
    /// Provider to use: gemini or openai (defaults to settings)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model to use (defaults to the provider's configured model)
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question and stream the answer
    Ask {
        /// The question to ask
        prompt: String,

        /// Augment the answer with web search
        #[arg(long)]
        search: bool,

        /// Print the answer only once it is complete
        #[arg(long)]
        no_stream: bool,
    },

    /// Generate a conversation title for a message
    Title {
        /// The message to title
        prompt: String,
    },

    /// List models for the selected provider
    Models,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load settings")?;

    let provider_name = cli
        .provider
        .clone()
        .unwrap_or_else(|| settings.defaults.provider.clone());
    let kind = match provider_name.as_str() {
        "gemini" => ProviderKind::Gemini,
        "openai" => ProviderKind::OpenAiCompatible,
        other => bail!("unknown provider '{other}' (expected gemini or openai)"),
    };

    let provider_settings = match kind {
        ProviderKind::Gemini => &settings.providers.gemini,
        ProviderKind::OpenAiCompatible => &settings.providers.openai,
    };
    let model = cli
        .model
        .clone()
        .unwrap_or_else(|| provider_settings.default_model.clone());

    let provider = ProviderFactory::create(&settings.provider_config(kind)?)?;
    let selection = ModelSelection::new(model, provider.clone());

    let mut orchestrator = Orchestrator::new(settings.generation.clone());
    if let Some(api_key) = settings.search.resolve_api_key() {
        orchestrator = orchestrator.with_search(Arc::new(BraveSearch::new(api_key)));
    }

    match cli.command {
        Commands::Ask {
            prompt,
            search,
            no_stream,
        } => {
            let mut stream = orchestrator.generate(&[], &prompt, search, &selection);

            let mut full_text = String::new();
            let mut sources: Vec<Source> = vec![];
            while let Some(fragment) = stream.next().await {
                let fragment = fragment?;
                if let Some(text) = fragment.text {
                    if no_stream {
                        full_text.push_str(&text);
                    } else {
                        print!("{text}");
                        std::io::stdout().flush()?;
                    }
                }
                if let Some(batch) = fragment.sources {
                    sources.extend(batch);
                }
            }

            if no_stream {
                println!("{full_text}");
            } else {
                println!();
            }

            if !sources.is_empty() {
                println!("\nSources:");
                for (i, source) in sources.iter().enumerate() {
                    if source.title.is_empty() {
                        println!("{}. {}", i + 1, source.uri);
                    } else {
                        println!("{}. {} - {}", i + 1, source.title, source.uri);
                    }
                }
            }
        }

        Commands::Title { prompt } => {
            let title = orchestrator.generate_title(&prompt, &selection).await?;
            println!("{title}");
        }

        Commands::Models => {
            for info in provider.available_models() {
                println!(
                    "{}  ({}, context {} tokens)",
                    info.id, info.display_name, info.context_window
                );
            }
        }
    }

    Ok(())
}
