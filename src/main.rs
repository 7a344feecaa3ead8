use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use screenpilot_lib::capture::source::DisplaySource;
use screenpilot_lib::capture::still::StillImageSource;
use screenpilot_lib::capture::CaptureController;
use screenpilot_lib::config::{self, AppConfig};
use screenpilot_lib::errors::PilotResult;
use screenpilot_lib::render;
use screenpilot_lib::types::Mode;

#[derive(Parser, Debug)]
#[command(
    name = "screenpilot",
    version,
    about = "Capture the screen and ask a vision model to analyze it, plan actions, or describe how to execute them"
)]
struct Cli {
    /// analyze, plan or execute
    mode: Mode,
    /// What to do with the screenshot
    instruction: String,
    /// Use an existing image instead of capturing a monitor
    #[arg(long)]
    image: Option<PathBuf>,
    /// Monitor to capture (overrides [capture].monitor_index)
    #[arg(long)]
    monitor: Option<usize>,
    /// Config file (default: SCREENPILOT_CONFIG, then the usual locations)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Remote gateway URL (overrides [gateway].endpoint)
    #[arg(long)]
    endpoint: Option<String>,
    /// Print the timeline as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    screenpilot_lib::init_tracing("info");

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn load(cli: &Cli) -> PilotResult<AppConfig> {
    let mut cfg = match &cli.config {
        Some(path) => config::load_config_from(path)?,
        None => match config::load_config() {
            Ok(cfg) => cfg,
            // A remote gateway needs no local provider settings.
            Err(e) if cli.endpoint.is_some() => {
                tracing::debug!(error = %e, "no config file; using defaults");
                AppConfig::default()
            }
            Err(e) => return Err(e),
        },
    };
    if let Some(endpoint) = &cli.endpoint {
        cfg.gateway.endpoint = Some(endpoint.clone());
    }
    if let Some(monitor) = cli.monitor {
        cfg.capture.monitor_index = monitor;
    }
    Ok(cfg)
}

fn display_source(cli: &Cli, cfg: &AppConfig) -> PilotResult<Arc<dyn DisplaySource>> {
    if let Some(path) = &cli.image {
        return Ok(Arc::new(StillImageSource::new(path.clone())));
    }
    #[cfg(feature = "native-capture")]
    {
        Ok(Arc::new(screenpilot_lib::capture::xcap_source::XcapSource::new(
            cfg.capture.monitor_index,
        )))
    }
    #[cfg(not(feature = "native-capture"))]
    {
        let _ = cfg;
        Err(screenpilot_lib::errors::PilotError::Config(
            "built without native-capture; pass --image <path>".into(),
        ))
    }
}

/// Returns whether the submission succeeded.
async fn run(cli: Cli) -> PilotResult<bool> {
    let cfg = load(&cli)?;
    let orchestrator = screenpilot_lib::build_orchestrator(&cfg)?;
    let controller = CaptureController::new(display_source(&cli, &cfg)?);

    if let Err(e) = controller.capture().await {
        tracing::warn!(error = %e, "capture failed");
        orchestrator.timeline().error(e.user_message());
    }

    let capture = controller.current();
    let ok = match orchestrator
        .submit(cli.mode, &cli.instruction, capture.clone())
        .await
    {
        Ok(ticket) => {
            let steps = ticket.steps_revealed().await;
            tracing::debug!(steps, "submission complete");
            true
        }
        Err(e) => {
            tracing::debug!(error = %e, "submission ended with an error entry");
            false
        }
    };

    let entries = orchestrator.timeline().snapshot();
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        if let Some(capture) = &capture {
            println!("{}", render::capture_line(capture));
        }
        println!("{}", render::timeline_text(&entries));
    }
    Ok(ok)
}
