//! Code for reading the fragility model from a TOML file.
use super::read_toml;
use crate::risk::FragilityModel;
use anyhow::Result;
use std::path::Path;

const FRAGILITY_FILE_NAME: &str = "fragility.toml";

/// Read the fragility model from `fragility.toml`.
///
/// # Arguments
///
/// * `job_dir` - Folder containing the job files
pub fn read_fragility_model(job_dir: &Path) -> Result<FragilityModel> {
    read_toml(&job_dir.join(FRAGILITY_FILE_NAME))
}
