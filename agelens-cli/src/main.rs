mod annotate;
mod args;
mod webcam;

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Arc,
};

use agelens_core::{
    AnalysisResult, ChainSettings, DetectionFallbackChain, DetectionRecord, FaceStack,
    HttpRemoteEstimator, ImageFrame, Point, Size,
};
use agelens_session::{AnalysisSession, GestureEvent, OverlayShape, SelectionState, SessionConfig};
use agelens_utils::{
    config::{AppSettings, default_settings_path},
    configure_telemetry, init_logging, normalize_path, timing_guard,
};
use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info, warn};
use serde::Serialize;

use crate::args::{AnalyzeArgs, SelectionArg};

pub(crate) type Chain = DetectionFallbackChain<FaceStack, Option<HttpRemoteEstimator>>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageReport<'a> {
    image: String,
    mode: &'static str,
    is_estimate: bool,
    records: &'a [DetectionRecord],
    overlay: &'a [OverlayShape],
    #[serde(skip_serializing_if = "Option::is_none")]
    annotated: Option<String>,
}

fn main() -> Result<()> {
    init_logging(LevelFilter::Info)?;
    let args = AnalyzeArgs::parse();

    let mut settings = load_settings(args.config.as_ref())?;
    apply_cli_overrides(&mut settings, &args);

    let telemetry_level = args
        .telemetry_level
        .as_deref()
        .and_then(|level| level.parse::<LevelFilter>().ok())
        .unwrap_or_else(|| settings.telemetry.level_filter());
    configure_telemetry(args.telemetry || settings.telemetry.enabled, telemetry_level);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(run(args, settings))
}

async fn run(args: AnalyzeArgs, settings: AppSettings) -> Result<()> {
    let chain = Arc::new(build_chain(&settings)?);
    if args.webcam {
        return webcam::run_webcam_mode(&settings, chain, args.cycles).await;
    }

    let input = args
        .input
        .as_ref()
        .context("--input is required unless --webcam is set")?;
    analyze_image(&args, &settings, &chain, &normalize_path(input)?).await
}

fn build_chain(settings: &AppSettings) -> Result<Chain> {
    info!(
        "Loading models: face={} age/gender={}",
        settings.model_path.as_deref().unwrap_or_default(),
        settings.age_gender_model_path.as_deref().unwrap_or_default()
    );
    let analyzer = FaceStack::from_settings(settings)?;
    let remote = HttpRemoteEstimator::from_settings(&settings.remote)
        .context("failed to configure remote estimator")?;
    match remote.as_ref() {
        Some(remote) => info!("Remote estimates enabled at {}", remote.endpoint()),
        None => info!("Remote estimates disabled"),
    }
    Ok(DetectionFallbackChain::new(
        Arc::new(analyzer),
        remote,
        ChainSettings::from(settings),
    ))
}

async fn analyze_image(
    args: &AnalyzeArgs,
    settings: &AppSettings,
    chain: &Chain,
    input: &Path,
) -> Result<()> {
    let _timing = timing_guard("agelens_cli::analyze_image", log::Level::Info);
    let frame = ImageFrame::open(input)?;
    let natural = frame.natural_size();
    info!(
        "Analyzing {} ({}x{})",
        input.display(),
        frame.natural_width(),
        frame.natural_height()
    );

    let mut session = AnalysisSession::new(SessionConfig::from(settings));
    session.load_frame(frame.clone());
    let (display_w, display_h) = args.display.unwrap_or((natural.width, natural.height));
    session.set_display_size(Size::new(display_w, display_h));

    if let Some(selection) = args.select {
        apply_selection(&mut session, selection, settings.selection.min_size)?;
    }

    let result: AnalysisResult = session.run_analysis(chain).await.cloned()?;
    for (index, record) in result.iter().enumerate() {
        info!("{}", record.summary(index));
    }

    let annotated = match args.annotate.as_ref() {
        Some(dir) => match annotate::annotate_result(&frame, &result, input, dir) {
            Ok(path) => {
                info!("Annotated image saved to {}", path.display());
                Some(path.display().to_string())
            }
            Err(err) => {
                warn!("Failed to annotate {}: {err:#}", input.display());
                None
            }
        },
        None => None,
    };

    let report = ImageReport {
        image: input.display().to_string(),
        mode: if args.select.is_some() {
            "manual"
        } else {
            "automatic"
        },
        is_estimate: result.is_estimate(),
        records: &result.records,
        overlay: session.overlay(),
        annotated,
    };
    write_report(&report, args.json.as_ref())
}

/// Replay `selection` as a drag so the usual minimum-size rule applies.
fn apply_selection(
    session: &mut AnalysisSession,
    selection: SelectionArg,
    min_size: f32,
) -> Result<()> {
    session.set_selection_mode(true);
    session.handle_gesture(GestureEvent::Start(Point::new(selection.x, selection.y)));
    session.handle_gesture(GestureEvent::Move(Point::new(
        selection.x + selection.width,
        selection.y + selection.height,
    )));
    match session.handle_gesture(GestureEvent::End) {
        SelectionState::Confirmed(_) => Ok(()),
        _ => anyhow::bail!(
            "selection {}x{} is too small; both sides must exceed {min_size}",
            selection.width,
            selection.height
        ),
    }
}

fn write_report(report: &ImageReport<'_>, json_path: Option<&PathBuf>) -> Result<()> {
    if let Some(json_path) = json_path {
        if let Some(dir) = json_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        let file = File::create(json_path)
            .with_context(|| format!("failed to create {}", json_path.display()))?;
        serde_json::to_writer_pretty(file, report)
            .with_context(|| format!("failed to write result JSON to {}", json_path.display()))?;
        info!("Wrote result to {}", json_path.display());
    } else {
        let json = serde_json::to_string_pretty(report).context("failed to serialize result")?;
        println!("{json}");
    }
    Ok(())
}

fn load_settings(config_path: Option<&PathBuf>) -> Result<AppSettings> {
    if let Some(path) = config_path {
        let resolved = normalize_path(path)?;
        return AppSettings::load_from_path(&resolved);
    }
    let default_path = default_settings_path();
    if default_path.exists() {
        info!("Using settings from {}", default_path.display());
        AppSettings::load_from_path(&default_path)
    } else {
        Ok(AppSettings::default())
    }
}

fn apply_cli_overrides(settings: &mut AppSettings, args: &AnalyzeArgs) {
    if let Some(model) = args.model.as_ref() {
        settings.model_path = Some(model.display().to_string());
    }
    if let Some(model) = args.age_gender_model.as_ref() {
        settings.age_gender_model_path = Some(model.display().to_string());
    }
    if let Some(url) = args.remote_url.as_ref() {
        settings.remote.endpoint = Some(url.clone());
    }
    if let Some(timeout) = args.remote_timeout_ms {
        settings.remote.timeout_ms = timeout;
    }
    if let Some(score) = args.score_threshold {
        settings.detection.score_threshold = score;
    }
    if let Some(device) = args.webcam_device {
        settings.live.device_index = device;
    }
    if let Some(width) = args.webcam_width {
        settings.live.width = width;
    }
    if let Some(height) = args.webcam_height {
        settings.live.height = height;
    }
    if let Some(fps) = args.webcam_fps {
        settings.live.fps = fps;
    }
    if let Some(period) = args.live_period_ms {
        settings.live.period_ms = period;
    }
}
