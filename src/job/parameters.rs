//! Defines the `JobParameters` struct, which represents the contents of `job.toml`.
use crate::damage::DamageParams;
use crate::errors::ConfigurationError;
use crate::filters::{IntegrationDistance, MaximumDistance};
use crate::geo::DistanceMetric;
use crate::input::{input_err_msg, read_toml};
use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use std::path::Path;

const JOB_PARAMETERS_FILE_NAME: &str = "job.toml";

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_master_seed, u64, 42);
define_param_default!(default_concurrent_tasks, usize, 4);

/// Represents the contents of the entire job file.
#[derive(Debug, Deserialize, PartialEq)]
pub struct JobParameters {
    /// The integration distance: a single distance in km, or a table of distances by tectonic
    /// region type
    pub maximum_distance: MaximumDistance,
    /// The distance metric used to estimate source weights
    #[serde(default)]
    pub filter_distance: DistanceMetric,
    /// Ruptures below this magnitude are discarded
    #[serde(default)]
    pub minimum_magnitude: f64,
    /// Seed of the random sampling of damage states
    #[serde(default = "default_master_seed")]
    pub master_seed: u64,
    /// 1 if assets of the same taxonomy share their random numbers, else 0
    #[serde(default)]
    pub asset_correlation: u8,
    /// Whether to compute fractional damage distributions even for integer asset numbers
    #[serde(default)]
    pub float_dmg_dist: bool,
    /// Number of slices the work is divided into
    #[serde(default = "default_concurrent_tasks")]
    pub concurrent_tasks: usize,
    /// Whether to aggregate damages by the `agg_key` of the assets
    #[serde(default)]
    pub aggregate_by: bool,
    /// Memory allowed per damage task, in bytes
    #[serde(default)]
    pub task_memory_limit: Option<u64>,
}

/// Check that the `asset_correlation` parameter is valid
fn check_asset_correlation(value: u8) -> Result<()> {
    ensure!(
        value <= 1,
        ConfigurationError(format!("asset_correlation must be 0 or 1, got {value}"))
    );

    Ok(())
}

/// Check that the `concurrent_tasks` parameter is valid
fn check_concurrent_tasks(value: usize) -> Result<()> {
    ensure!(
        value > 0,
        ConfigurationError("concurrent_tasks cannot be zero".to_string())
    );

    Ok(())
}

/// Check that the `minimum_magnitude` parameter is valid
fn check_minimum_magnitude(value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value >= 0.0,
        ConfigurationError("minimum_magnitude must be a finite, non-negative number".to_string())
    );

    Ok(())
}

impl JobParameters {
    /// Read a job file from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `job_dir` - Folder containing the job files
    ///
    /// # Returns
    ///
    /// The job file contents as a [`JobParameters`] struct or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(job_dir: P) -> Result<JobParameters> {
        let file_path = job_dir.as_ref().join(JOB_PARAMETERS_FILE_NAME);
        let job_params: JobParameters = read_toml(&file_path)?;

        job_params
            .validate()
            .with_context(|| input_err_msg(file_path))?;

        Ok(job_params)
    }

    /// Validate parameters after reading in file
    pub fn validate(&self) -> Result<()> {
        check_asset_correlation(self.asset_correlation)?;
        check_concurrent_tasks(self.concurrent_tasks)?;
        check_minimum_magnitude(self.minimum_magnitude)?;
        self.integration_distance()?;

        Ok(())
    }

    /// The integration distance described by `maximum_distance`
    pub fn integration_distance(&self) -> Result<IntegrationDistance> {
        IntegrationDistance::new(&self.maximum_distance)
    }

    /// The parameters of the damage tasks
    pub fn damage_params(&self) -> DamageParams {
        DamageParams {
            master_seed: self.master_seed,
            asset_correlation: self.asset_correlation,
            float_dmg_dist: self.float_dmg_dist,
            task_memory_limit: self.task_memory_limit,
        }
    }
}
