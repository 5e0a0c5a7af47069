use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use meg_explorer::{
    logging, Dialogs, FiffPersistence, InitialChoice, NativeProcessor, Orchestrator, Outcome,
    PipelineConfig, PresetDialogs, RfdDialogs, SaveChoice, SvgPlotter, TerminalProgress,
};

#[derive(Parser)]
#[command(name = "meg-explorer", about = "Guided MEG preprocessing: bad channels, head position, Maxwell and band-pass filtering")]
struct Args {
    /// JSON file overriding pipeline parameters
    #[arg(long, env = "MEG_EXPLORER_CONFIG")]
    config: Option<PathBuf>,

    /// Progress polling interval in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Raw recording; given, the run is headless and no dialogs are shown
    #[arg(long)]
    raw: Option<PathBuf>,

    /// Crosstalk file (ct_sparse*.fif), headless mode
    #[arg(long, requires = "raw")]
    crosstalk: Option<PathBuf>,

    /// Fine-calibration file (sss_cal*.dat), headless mode
    #[arg(long, requires = "raw")]
    calibration: Option<PathBuf>,

    /// Folder to save the preprocessed recording in, headless mode
    #[arg(long, requires = "raw", conflicts_with = "no_save")]
    save_dir: Option<PathBuf>,

    /// Do not save the result, headless mode
    #[arg(long, requires = "raw")]
    no_save: bool,

    /// Only plot the raw recording, headless mode
    #[arg(long, requires = "raw")]
    view_raw: bool,

    /// Where plots are written
    #[arg(long, default_value = ".")]
    plot_dir: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = logging::init(logging::DEFAULT_FILTER) {
        eprintln!("{e:#}");
    }
    match run(args) {
        Ok(Outcome::Failed(_)) => ExitCode::FAILURE,
        Ok(outcome) => {
            tracing::info!(?outcome, "done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<Outcome> {
    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(ms) = args.poll_ms {
        cfg.poll_interval_ms = ms;
    }
    cfg.validate().context("invalid configuration")?;

    match &args.raw {
        Some(raw) => {
            let initial = if args.view_raw { InitialChoice::ViewRaw } else { InitialChoice::Preprocess };
            let save = match (&args.save_dir, args.no_save) {
                (Some(dir), false) => (SaveChoice::Save, Some(dir.clone())),
                _ => (SaveChoice::Discard, None),
            };
            let dialogs = PresetDialogs::new(initial)
                .with_files([Some(raw.clone()), args.crosstalk.clone(), args.calibration.clone()])
                .with_save(save.0, save.1);
            orchestrate(dialogs, &cfg, &args)
        }
        None => orchestrate(RfdDialogs, &cfg, &args),
    }
}

fn orchestrate<D: Dialogs>(dialogs: D, cfg: &PipelineConfig, args: &Args) -> Result<Outcome> {
    let mut orchestrator = Orchestrator::new(
        dialogs,
        FiffPersistence::new(cfg.save_suffix.clone()),
        SvgPlotter::new(&args.plot_dir),
        Arc::new(NativeProcessor::new(cfg.clone())),
        Box::new(TerminalProgress::stderr()),
        cfg.poll_interval(),
    );
    orchestrator.run()
}
