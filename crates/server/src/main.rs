//! Deckforge Server
//!
//! Axum server exposing the generation pipeline over HTTP with an SSE event
//! feed, plus a one-shot CLI mode.

mod api;
mod settings;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use deckforge_core::backend::HttpBackend;
use deckforge_core::models::{ColorScheme, GenerationRequest, Style};
use deckforge_core::pipeline::{Coordinator, PipelineEvent, PipelineEventKind, SectionStatus};
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc},
};
use tracing_subscriber::EnvFilter;

use crate::api::{pipeline::parse_choice, AppState};
use crate::settings::DeckforgeSettings;

#[derive(Parser, Clone)]
#[command(author, version, about = "Deckforge - streaming sectioned document generation")]
struct Args {
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the Deckforge server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
    /// Generate one document and print its sections (no server)
    Run {
        /// Subject of the document
        subject: String,
        /// business, academic, creative, minimal or technical
        #[arg(long, value_parser = parse_style)]
        style: Option<Style>,
        /// blue, green, purple, dark or light
        #[arg(long, value_parser = parse_color_scheme)]
        color_scheme: Option<ColorScheme>,
        /// Desired number of sections
        #[arg(long)]
        sections: Option<u32>,
    },
}

fn parse_style(value: &str) -> Result<Style, String> {
    parse_choice("style", value).map_err(|e| e.to_string())
}

fn parse_color_scheme(value: &str) -> Result<ColorScheme, String> {
    parse_choice("color scheme", value).map_err(|e| e.to_string())
}

const DEFAULT_LOG_FILTER: &str = "info,deckforge_core=debug";

/// Log filter from `RUST_LOG`, including a value set in the runtime `.env`
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn init_tracing() {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();
}

/// Build a coordinator from persisted settings, publishing events on `event_tx`
fn build_coordinator(
    settings: &DeckforgeSettings,
    event_tx: mpsc::Sender<PipelineEvent>,
) -> anyhow::Result<Coordinator> {
    let backend = HttpBackend::new(settings.upstream_config())
        .context("failed to create upstream backend")?;
    tracing::info!(base_url = %backend.config().base_url, model = %backend.config().model, "upstream configured");
    Ok(Coordinator::new(settings.pipeline_config(), Arc::new(backend)).with_event_channel(event_tx))
}

async fn run_server(settings: DeckforgeSettings, port: u16) -> anyhow::Result<()> {
    let capacity = settings.pipeline_config().event_channel_capacity;
    let (event_tx, _) = broadcast::channel::<PipelineEvent>(capacity);
    let (pipeline_tx, mut pipeline_rx) = mpsc::channel::<PipelineEvent>(capacity);

    let coordinator = build_coordinator(&settings, pipeline_tx)?;

    // Forward pipeline events to SSE subscribers
    let forward_tx = event_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = pipeline_rx.recv().await {
            let _ = forward_tx.send(event);
        }
    });

    let state = Arc::new(AppState {
        coordinator: Arc::new(coordinator),
        event_tx,
    });
    let app = api::router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!(%addr, "Deckforge server listening");
    tracing::info!("routes: /api/v1/generate, /state, /events, /sections/:index, /api/openapi.json");

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_once(settings: DeckforgeSettings, request: GenerationRequest) -> anyhow::Result<()> {
    let (event_tx, mut event_rx) = mpsc::channel::<PipelineEvent>(settings.pipeline_config().event_channel_capacity);
    let coordinator = build_coordinator(&settings, event_tx)?;

    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event.kind {
                PipelineEventKind::SectionDispatched => {
                    if let Some(index) = event.section {
                        println!("  -> section {} dispatched", index + 1);
                    }
                }
                PipelineEventKind::SectionReady => {
                    if let Some(index) = event.section {
                        println!("  ok section {} ready", index + 1);
                    }
                }
                PipelineEventKind::SectionFailed => {
                    if let Some(index) = event.section {
                        println!("  !! section {} failed", index + 1);
                    }
                }
                _ => {}
            }
        }
    });

    println!("Generating \"{}\"", request.subject);
    let result = coordinator.generate(request).await;
    drop(coordinator);
    let _ = printer.await;

    let snapshot = result.context("generation failed")?;
    let failed = snapshot
        .sections
        .iter()
        .filter(|s| s.status == SectionStatus::Failed)
        .count();
    println!(
        "\nDone: {} sections ({} failed)\n",
        snapshot.sections.len(),
        failed
    );
    for section in &snapshot.sections {
        println!("=== Section {} ===", section.index + 1);
        println!("{}\n", section.display_value());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file = settings::load_env();
    init_tracing();
    match env_file {
        Ok(Some(path)) => tracing::info!(path = %path.display(), "loaded environment file"),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "failed to load environment file"),
    }

    let args = Args::parse();
    let settings = DeckforgeSettings::load().await;

    match args.command {
        Some(CliCommand::Run {
            subject,
            style,
            color_scheme,
            sections,
        }) => {
            let mut request = GenerationRequest::new(subject);
            if let Some(style) = style {
                request = request.with_style(style);
            }
            if let Some(scheme) = color_scheme {
                request = request.with_color_scheme(scheme);
            }
            if let Some(count) = sections {
                request = request.with_section_count_hint(count);
            }
            run_once(settings, request).await
        }
        Some(CliCommand::Serve { port }) => run_server(settings, port).await,
        None => run_server(settings, 8080).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_env_file_feeds_log_filter() {
        let dir = std::env::temp_dir().join(format!("deckforge-env-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(".env"), "RUST_LOG=deckforge_core=trace\n").unwrap();
        let preset = std::env::var("RUST_LOG").ok();

        let loaded = settings::load_env_from(&dir).unwrap();
        assert_eq!(loaded, Some(dir.join(".env")));

        match preset {
            // an existing variable wins over the file
            Some(value) => assert_eq!(std::env::var("RUST_LOG").unwrap(), value),
            None => assert_eq!(env_filter().to_string(), "deckforge_core=trace"),
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_run_command_parses_choices() {
        let args = Args::try_parse_from([
            "deckforge", "run", "Quarterly Review", "--style", "technical", "--color-scheme", "dark",
        ])
        .unwrap();
        match args.command {
            Some(CliCommand::Run { subject, style, color_scheme, .. }) => {
                assert_eq!(subject, "Quarterly Review");
                assert_eq!(style, Some(Style::Technical));
                assert_eq!(color_scheme, Some(ColorScheme::Dark));
            }
            _ => panic!("expected run command"),
        }
    }
}
