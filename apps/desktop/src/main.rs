use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use removal_service::{
    HttpRemovalService, HttpSampleFetcher, RemovalService, SimulatedRemovalService, WithTimeout,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use workflow::{CompletionOutcome, FileSystemExport, SampleGallery, WorkflowSession};

mod backend_bridge;
mod config;
mod render;

use backend_bridge::{commands::read_file_selection, runtime::run_interactive};
use config::{load_settings, Settings};

#[derive(Parser, Debug)]
#[command(name = "bgremove", about = "Remove image backgrounds with a pluggable removal service")]
struct Cli {
    /// Removal service endpoint; without one the removal is simulated.
    #[arg(long, global = true)]
    service_url: Option<String>,
    #[arg(long, global = true)]
    out_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remove the background of one image and save the result.
    Remove { path: PathBuf },
    /// List the preset sample images.
    Samples,
    /// Read commands from stdin.
    Interactive,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings();
    if let Some(url) = cli.service_url {
        settings.service_url = Some(url);
    }
    if let Some(dir) = cli.out_dir {
        settings.export_dir = dir;
    }
    if let Some(secs) = cli.timeout_secs {
        settings.request_timeout_secs = secs;
    }

    match cli.command {
        Command::Remove { path } => {
            let mut session = build_session(&settings)?;
            remove_once(&mut session, &path).await
        }
        Command::Samples => {
            let gallery = SampleGallery::preset();
            println!("{}", render::describe_samples(&gallery.samples()));
            Ok(())
        }
        Command::Interactive => {
            let session = build_session(&settings)?;
            let mut gallery = SampleGallery::preset();
            if settings.prefetch_samples {
                let fetcher = HttpSampleFetcher::with_timeout(settings.request_timeout());
                gallery.prefetch(&fetcher).await;
            }
            run_interactive(session, gallery).await
        }
    }
}

fn build_service(settings: &Settings) -> Result<Arc<dyn RemovalService>> {
    let timeout = settings.request_timeout();
    match &settings.service_url {
        Some(url) => {
            let http = HttpRemovalService::new(url, settings.api_key.clone(), Some(timeout))
                .context("failed to configure removal service")?;
            info!(endpoint = %http.endpoint(), timeout_secs = timeout.as_secs(), "using removal service");
            Ok(Arc::new(WithTimeout::new(http, timeout)))
        }
        None => {
            info!(
                delay_ms = settings.simulated_delay_ms,
                "no removal service configured; simulating removal"
            );
            Ok(Arc::new(WithTimeout::new(
                SimulatedRemovalService::new(settings.simulated_delay()),
                timeout,
            )))
        }
    }
}

fn build_session(settings: &Settings) -> Result<WorkflowSession> {
    let service = build_service(settings)?;
    let exporter = Arc::new(FileSystemExport::new(&settings.export_dir));
    Ok(WorkflowSession::new(service, exporter))
}

async fn remove_once(session: &mut WorkflowSession, path: &std::path::Path) -> Result<()> {
    let selection = read_file_selection(path).await?;
    session
        .load_file_selection(selection)
        .with_context(|| format!("{} cannot be used", path.display()))?;
    session.request_removal()?;
    println!("{}", render::describe_view(&session.view()));

    match session.next_completion().await {
        Some(CompletionOutcome::Applied(_)) => {}
        Some(CompletionOutcome::Discarded) | None => bail!("removal request was lost"),
    }
    if let Some(notice) = session.view().error {
        bail!(render::describe_notice(&notice));
    }

    let receipt = session.download()?;
    println!(
        "{} Saved to {}",
        render::SUCCESS_MESSAGE,
        receipt.path.display()
    );
    Ok(())
}
