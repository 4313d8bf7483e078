//! Code for loading and running jobs.
//!
//! A job is a folder containing `job.toml` and the input files of one of the two calculations:
//! filtering a source model against a set of sites, or computing damages from ground-motion
//! fields.
use crate::damage::{AGG_DAMAGE_TABLE, DamageCalculator};
use crate::datastore::{DataStore, MemoryStore, Table};
use crate::exposure::Exposure;
use crate::filters::{FilteredSites, SourceFilter};
use crate::gmf::GmfData;
use crate::input::{read_exposure, read_fragility_model, read_gmf, read_sites, read_source_model};
use crate::risk::{FragilityModel, RiskModel};
use crate::site::SiteCollection;
use crate::source::Source;
use anyhow::{Context, Result, ensure};
use log::info;
use std::path::Path;
use std::sync::Arc;

pub mod parameters;
pub use parameters::JobParameters;

/// The inputs of a source filtering job
pub struct FilterJob {
    /// Job parameters
    pub params: JobParameters,
    /// The sites of interest
    pub sites: SiteCollection,
    /// The source model
    pub sources: Vec<Source>,
}

impl FilterJob {
    /// Load a filtering job from the given folder
    pub fn load(job_dir: &Path) -> Result<Self> {
        let params = JobParameters::from_path(job_dir)?;
        let sites = read_sites(job_dir)?;
        let sources = read_source_model(job_dir, params.minimum_magnitude)?;
        info!(
            "Loaded {} sources and {} sites",
            sources.len(),
            sites.len()
        );

        Ok(Self {
            params,
            sites,
            sources,
        })
    }

    /// Filter and split the sources, then estimate the weight of the fragments.
    ///
    /// Returns the fragments close to the sites.
    pub fn run(&self) -> Result<Vec<FilteredSource>> {
        let filter = SourceFilter::new(
            Some(&self.sites),
            self.params.integration_distance()?,
            self.params.filter_distance,
        );

        let (mut fragments, sites): (Vec<Source>, Vec<FilteredSites>) =
            filter.split(&self.sources).unzip();
        filter.set_weight(&mut fragments);
        info!(
            "{} sources split into {} fragments close to the sites",
            self.sources.len(),
            fragments.len()
        );

        Ok(fragments
            .into_iter()
            .zip(sites)
            .map(|(source, sites)| {
                let rectangle = filter.get_rectangle(&source).ok();
                FilteredSource {
                    source,
                    sites,
                    rectangle,
                }
            })
            .collect())
    }
}

/// A source fragment kept by the filter
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredSource {
    /// The fragment, with its weight and number of sites set
    pub source: Source,
    /// The sites close to the fragment
    pub sites: FilteredSites,
    /// The lower left corner, width and height of the enlarged box, if it could be computed
    pub rectangle: Option<(f64, f64, f64, f64)>,
}

/// The inputs of a damage job
pub struct DamageJob {
    /// Job parameters
    pub params: JobParameters,
    /// The sites of the exposure and ground-motion fields
    pub sites: SiteCollection,
    /// The assets
    pub exposure: Exposure,
    /// The ground-motion fields
    pub gmf: GmfData,
    /// The fragility functions
    pub crmodel: FragilityModel,
}

/// The tables produced by a damage job
#[derive(Debug)]
pub struct DamageOutput {
    /// Damages by event, bucket and loss type
    pub agg_damage_table: Table,
    /// Damages by bucket and loss type, summed over events
    pub damages: Table,
}

impl DamageJob {
    /// Load a damage job from the given folder
    pub fn load(job_dir: &Path) -> Result<Self> {
        let params = JobParameters::from_path(job_dir)?;
        let sites = read_sites(job_dir)?;
        let exposure = read_exposure(job_dir, &sites, params.aggregate_by)?;
        let gmf = read_gmf(job_dir)?;
        let crmodel = read_fragility_model(job_dir)?;
        info!(
            "Loaded {} assets and {} ground motion values",
            exposure.assets().len(),
            gmf.len()
        );

        let job = Self {
            params,
            sites,
            exposure,
            gmf,
            crmodel,
        };
        job.validate()?;

        Ok(job)
    }

    /// Check that the inputs are consistent with one another
    fn validate(&self) -> Result<()> {
        for sid in &self.gmf.sid {
            ensure!(
                self.sites.get(*sid).is_some(),
                "The ground motion fields refer to unknown site {sid}"
            );
        }
        self.crmodel
            .check_taxonomies(&self.exposure.taxonomies())
            .context("The fragility model does not cover the exposure")?;

        Ok(())
    }

    /// Run the damage calculation with the given number of threads (zero means one per CPU)
    pub fn run(&self, num_threads: usize) -> Result<DamageOutput> {
        let store: Arc<dyn DataStore> = Arc::new(MemoryStore::new());
        let calc = DamageCalculator::new(
            Arc::clone(&store),
            self.exposure.clone(),
            Arc::new(self.crmodel.clone()),
            self.params.damage_params(),
            self.params.concurrent_tasks,
        )
        .num_threads(num_threads);

        calc.import_gmf(&self.gmf)?;
        let damages = calc.run()?;
        let agg_damage_table = if store.contains(&format!("{AGG_DAMAGE_TABLE}/event_id")) {
            store.read_table(AGG_DAMAGE_TABLE, None)?
        } else {
            Table::new()
        };

        Ok(DamageOutput {
            agg_damage_table,
            damages,
        })
    }

    /// The names of the loss types
    pub fn loss_types(&self) -> &[String] {
        self.crmodel.loss_types()
    }
}
