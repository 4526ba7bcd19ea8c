//! Command-line entry point: turn a batch of photos into one diary entry.

use anyhow::{Context, bail};
use chrono::NaiveDate;
use clap::Parser;
use log::{debug, info};
use snaplog::{DiaryPipeline, OpenAiCompatibleProvider, SnaplogConfig};
use snaplog_protocol::{CompanionRecord, DiaryRequest, PhotoData, PhotoInput};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Command-line options for a single diary run.
#[derive(Parser, Debug)]
#[command(name = "snaplog", version)]
struct Cli {
    /// Photos in arrival order
    #[arg(required_unless_present = "summary")]
    images: Vec<PathBuf>,
    /// JSON array of companion summary records aligned with the photos
    #[arg(long)]
    summary: Option<PathBuf>,
    /// Tone hint for the narrative
    #[arg(long)]
    tone: Option<String>,
    /// Move the first photo to this date (YYYY-MM-DD)
    #[arg(long)]
    target_date: Option<NaiveDate>,
    /// Optional path to a snaplog.json5 config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Model used for observation and drafting
    #[arg(long)]
    model: Option<String>,
    /// Alternate text model for cross-validation
    #[arg(long)]
    alt_model: Option<String>,
}

impl Cli {
    fn apply_overrides(&self, config: &mut SnaplogConfig) {
        if let Some(model) = &self.model {
            config.generation.vision_model = model.clone();
            config.generation.text_model = model.clone();
        }
        if let Some(alt_model) = &self.alt_model {
            config.generation.alt_text_model = Some(alt_model.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    snaplog::init_logging();

    let cli = Cli::parse();
    info!(
        "starting snaplog (images={}, summary_set={}, config_set={})",
        cli.images.len(),
        cli.summary.is_some(),
        cli.config.is_some()
    );
    let mut config = load_config(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    let request = build_request(&cli)?;

    let provider = OpenAiCompatibleProvider::from_config(&config.generation)
        .context("failed to build generation provider")?;
    let pipeline =
        DiaryPipeline::new(config, Arc::new(provider)).context("failed to build pipeline")?;
    let outcome = pipeline
        .compose(request)
        .await
        .context("diary run failed")?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SnaplogConfig> {
    if let Some(path) = path {
        info!("loading config from path: {}", path.display());
        return SnaplogConfig::load_from_path(path).context("failed to load config");
    }
    let cwd = std::env::current_dir().context("cwd")?;
    info!("loading layered config from cwd: {}", cwd.display());
    let layered = SnaplogConfig::load_layered(&cwd).context("failed to load layered config")?;
    debug!("layered config loaded (layers={})", layered.layers.len());
    Ok(layered.config)
}

fn build_request(cli: &Cli) -> anyhow::Result<DiaryRequest> {
    let photos = cli
        .images
        .iter()
        .enumerate()
        .map(|(idx, path)| read_photo(idx, path))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let summaries = match &cli.summary {
        Some(path) => read_summaries(path)?,
        None => Vec::new(),
    };
    if photos.is_empty() && summaries.is_empty() {
        bail!("provide at least one image or a non-empty summary file");
    }

    let mut request = DiaryRequest::new(photos).with_summaries(summaries);
    if let Some(tone) = &cli.tone {
        request = request.with_tone(tone.clone());
    }
    if let Some(target_date) = cli.target_date {
        request = request.with_target_date(target_date);
    }
    Ok(request)
}

fn read_photo(original_index: usize, path: &Path) -> anyhow::Result<PhotoInput> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let photo = PhotoInput::new(original_index, PhotoData::Bytes(bytes));
    Ok(match path.file_name() {
        Some(name) => photo.with_file_name(name.to_string_lossy()),
        None => photo,
    })
}

fn read_summaries(path: &Path) -> anyhow::Result<Vec<CompanionRecord>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("summary file is not a JSON array of objects: {}", path.display()))
}
