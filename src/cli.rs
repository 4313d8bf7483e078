//! The command line interface for seisrisk.
use crate::job::{DamageJob, FilterJob, JobParameters};
use crate::log;
use crate::output::{
    DamageLabels, create_output_directory, get_output_dir, write_agg_damage_table, write_damages,
    write_source_weights,
};
use crate::risk::RiskModel;
use crate::settings::Settings;
use ::log::{info, warn};
use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

pub mod settings;
use settings::SettingsSubcommands;

/// The file whose presence marks a filtering job
const SOURCE_MODEL_FILE_NAME: &str = "source_model.toml";

/// The file whose presence marks a damage job
const EXPOSURE_FILE_NAME: &str = "exposure.csv";

/// The command line interface for seisrisk.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options for commands which write output files
#[derive(Args, Default)]
pub struct RunOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Filter and split the sources of a job, writing their weights.
    Filter {
        /// Path to the job directory.
        job_dir: PathBuf,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Compute damages from the ground-motion fields of a job.
    Damage {
        /// Path to the job directory.
        job_dir: PathBuf,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Validate the inputs of a job.
    Validate {
        /// Path to the job directory.
        job_dir: PathBuf,
    },
    /// Manage the program settings file.
    Settings {
        /// The available subcommands for managing the settings file.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Filter { job_dir, opts } => handle_filter_command(&job_dir, &opts, None),
            Self::Damage { job_dir, opts } => handle_damage_command(&job_dir, &opts, None),
            Self::Validate { job_dir } => handle_validate_command(&job_dir, None),
            Self::Settings { subcommand } => subcommand.execute(),
        }
    }
}

/// Parse CLI arguments and start seisrisk
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Load program settings, if not provided
fn load_settings(settings: Option<Settings>) -> Result<Settings> {
    if let Some(settings) = settings {
        Ok(settings)
    } else {
        Settings::load().context("Failed to load settings.")
    }
}

/// Create the output folder and start logging to it.
///
/// # Returns
///
/// The path to the output folder
fn prepare_output(job_dir: &Path, opts: &RunOpts, settings: &Settings) -> Result<PathBuf> {
    let output_path = match &opts.output_dir {
        Some(p) => p.clone(),
        None => get_output_dir(job_dir)?,
    };

    let overwrite = opts.overwrite || settings.overwrite;
    let overwritten = create_output_directory(&output_path, overwrite).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            output_path.display()
        )
    })?;

    log::init(Some(settings.log_level.as_str()), Some(&output_path))
        .context("Failed to initialise logging.")?;
    info!("Output folder: {}", output_path.display());

    // NB: We have to wait until the logger is initialised to display this warning
    if overwritten {
        warn!("Output folder was overwritten");
    }

    Ok(output_path)
}

/// Handle the `filter` command.
pub fn handle_filter_command(
    job_dir: &Path,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let settings = load_settings(settings)?;
    let output_path = prepare_output(job_dir, opts, &settings)?;

    let job = FilterJob::load(job_dir).context("Failed to load job.")?;
    info!("Loaded filtering job from {}", job_dir.display());

    let sources = job.run()?;
    write_source_weights(&output_path, &sources)?;
    info!("Filtering complete!");

    Ok(())
}

/// Handle the `damage` command.
pub fn handle_damage_command(
    job_dir: &Path,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let settings = load_settings(settings)?;
    let output_path = prepare_output(job_dir, opts, &settings)?;

    let job = DamageJob::load(job_dir).context("Failed to load job.")?;
    info!("Loaded damage job from {}", job_dir.display());

    let output = job.run(settings.num_threads)?;
    let buckets = job.exposure.bucket_names();
    let labels = DamageLabels {
        buckets: &buckets,
        loss_types: job.crmodel.loss_types(),
        damage_states: job.crmodel.damage_states(),
    };
    write_agg_damage_table(&output_path, &output.agg_damage_table, &labels)?;
    write_damages(&output_path, &output.damages, &labels)?;
    info!("Damage calculation complete!");

    Ok(())
}

/// Handle the `validate` command.
pub fn handle_validate_command(job_dir: &Path, settings: Option<Settings>) -> Result<()> {
    let settings = load_settings(settings)?;

    // Initialise program logger (we won't save log files when running the validate command)
    log::init(Some(settings.log_level.as_str()), None).context("Failed to initialise logging.")?;

    JobParameters::from_path(job_dir).context("Failed to validate job.")?;
    let has_sources = job_dir.join(SOURCE_MODEL_FILE_NAME).is_file();
    let has_exposure = job_dir.join(EXPOSURE_FILE_NAME).is_file();
    if !has_sources && !has_exposure {
        bail!(
            "Job contains neither {SOURCE_MODEL_FILE_NAME} nor {EXPOSURE_FILE_NAME}: {}",
            job_dir.display()
        );
    }
    if has_sources {
        FilterJob::load(job_dir).context("Failed to validate job.")?;
    }
    if has_exposure {
        DamageJob::load(job_dir).context("Failed to validate job.")?;
    }
    info!("Job validation successful!");

    Ok(())
}
