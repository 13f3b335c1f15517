//! llm-lb command line.
//!
//! # Architecture Overview
//!
//! ```text
//!     caller
//!       │  chat.completions.create(&request)
//!       ▼
//!  ┌──────────────────────────────────────────────────────────┐
//!  │                         LbClient                          │
//!  │   ┌──────────┐   ┌───────────────┐   ┌───────────────┐    │
//!  │   │ dispatch │──▶│ load_balancer │──▶│   endpoint    │    │
//!  │   │          │   │ round robin   │   │ rewrite model │    │
//!  │   └────┬─────┘   └───────────────┘   └───────┬───────┘    │
//!  │        │ classify outcome                     ▼            │
//!  │   ┌────┴──────────────┐            ┌──────────────────┐   │
//!  │   │    resilience     │◀──────────▶│     upstream     │   │
//!  │   │ breaker / retries │            │ reqwest + SSE    │───┼──▶ endpoint N
//!  │   └───────────────────┘            └──────────────────┘   │
//!  └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Subcommands:
//! - `check`: load and validate a config file, print the endpoints
//! - `chat`: send one prompt through the pool
//! - `status`: print breaker snapshots as JSON

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use futures_util::StreamExt;

use llm_lb::config::{load_config, LbConfig};
use llm_lb::observability::{logging, metrics};
use llm_lb::{ChatCompletionRequest, ChatMessage, LbClient, RetryPolicy};

#[derive(Parser)]
#[command(name = "llm-lb")]
#[command(about = "Load-balanced client for OpenAI-compatible endpoints", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "llm-lb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and list endpoints
    Check,
    /// Send a single prompt through the pool
    Chat {
        #[arg(short, long, default_value = "gpt-4o-mini")]
        model: String,

        /// Stream the reply as it is generated
        #[arg(long)]
        stream: bool,

        /// Optional system prompt
        #[arg(long)]
        system: Option<String>,

        prompt: String,
    },
    /// Print endpoint breaker states
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init(&config.observability)?;
    tracing::info!(config = %cli.config.display(), "llm-lb v0.1.0 starting");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    match cli.command {
        Commands::Check => check(&config),
        Commands::Chat { model, stream, system, prompt } => {
            let client = LbClient::from_config(&config)?;
            let mut messages = Vec::new();
            if let Some(system) = system {
                messages.push(ChatMessage::system(system));
            }
            messages.push(ChatMessage::user(prompt));
            let request = ChatCompletionRequest::new(model, messages);

            if stream {
                chat_stream(&client, &request).await?;
            } else {
                let policy = RetryPolicy::from(&config.retries);
                let completion = client.chat.completions.create_with_retry(&request, &policy).await?;
                println!("{}", completion.content().unwrap_or_default());
            }
        }
        Commands::Status => {
            let client = LbClient::from_config(&config)?;
            println!("{}", serde_json::to_string_pretty(&client.endpoints())?);
        }
    }

    Ok(())
}

fn check(config: &LbConfig) {
    println!("configuration OK: {} endpoint(s)", config.endpoints.len());
    for (index, endpoint) in config.endpoints.iter().enumerate() {
        let name = endpoint
            .name
            .clone()
            .unwrap_or_else(|| llm_lb::config::schema::render_name(&config.breaker.name_template, index));
        println!("  {} {} ({} model mapping(s))", name, endpoint.base_url, endpoint.model_map.len());
    }
}

async fn chat_stream(client: &LbClient, request: &ChatCompletionRequest) -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = client.chat.completions.create_stream(request).await?;
    tracing::debug!(endpoint = %stream.endpoint(), "Streaming reply");

    let mut stdout = std::io::stdout();
    while let Some(chunk) = stream.next().await {
        for choice in chunk?.choices {
            if let Some(content) = choice.delta.content {
                write!(stdout, "{}", content)?;
                stdout.flush()?;
            }
        }
    }
    writeln!(stdout)?;
    Ok(())
}
