//! Seismic source filtering and event-based damage calculations.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod cli;
pub mod damage;
pub mod datastore;
pub mod errors;
pub mod exposure;
pub mod filters;
pub mod geo;
pub mod gmf;
pub mod id;
pub mod input;
pub mod job;
pub mod log;
pub mod mfd;
pub mod output;
pub mod parallel;
pub mod risk;
pub mod settings;
pub mod site;
pub mod source;

#[cfg(test)]
mod fixture;

/// Get the config dir for the program
pub fn get_seisrisk_config_dir() -> PathBuf {
    let Some(mut config_dir) = dirs::config_dir() else {
        // No config dir on this platform, so fall back to the current folder
        return PathBuf::from(".");
    };
    config_dir.push("seisrisk");

    config_dir
}
