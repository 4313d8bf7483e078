//! Code for reading the source model from a TOML file.
use super::{input_err_msg, read_toml};
use crate::geo::{Mesh, Point, Surface};
use crate::id::check_unique_ids;
use crate::source::{
    AreaSource, CollapsedPointSource, FaultSection, MultiFaultSource, NonParametricSource,
    Occurrence, PointSource, RuptureParameters, Rupture, Source, SourceID, SourceKind, TrtID,
};
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

const SOURCE_MODEL_FILE_NAME: &str = "source_model.toml";

#[derive(Deserialize)]
struct SourceModelRaw {
    sources: Vec<SourceRaw>,
}

#[derive(Deserialize)]
struct SourceRaw {
    id: SourceID,
    #[serde(default)]
    name: String,
    trt: TrtID,
    #[serde(default)]
    min_mag: f64,
    #[serde(flatten)]
    kind: SourceKindRaw,
}

#[derive(Deserialize)]
struct SectionRaw {
    sec_id: String,
    mesh: Mesh,
}

#[derive(Deserialize)]
struct MultiFaultRuptureRaw {
    sections: Vec<String>,
    probs: Vec<f64>,
    mag: f64,
    rake: f64,
}

#[derive(Deserialize)]
struct NonParametricRuptureRaw {
    mag: f64,
    rake: f64,
    hypocenter: Point,
    pmf: Vec<f64>,
    #[serde(default)]
    surface: Option<Mesh>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SourceKindRaw {
    Point(PointSource),
    Area {
        polygon: Vec<(f64, f64)>,
        spacing: f64,
        #[serde(flatten)]
        params: RuptureParameters,
    },
    Collapsed {
        point_sources: Vec<PointSource>,
    },
    MultiFault {
        sections: Vec<SectionRaw>,
        ruptures: Vec<MultiFaultRuptureRaw>,
    },
    NonParametric {
        ruptures: Vec<NonParametricRuptureRaw>,
    },
}

impl SourceKindRaw {
    fn into_kind(self, trt: &TrtID) -> Result<SourceKind> {
        Ok(match self {
            Self::Point(src) => SourceKind::Point(src),
            Self::Area {
                polygon,
                spacing,
                params,
            } => SourceKind::Area(AreaSource::new(polygon, spacing, params)?),
            Self::Collapsed { point_sources } => {
                ensure!(!point_sources.is_empty(), "A collapsed source needs point sources");
                SourceKind::Collapsed(CollapsedPointSource { point_sources })
            }
            Self::MultiFault { sections, ruptures } => {
                let sections = sections
                    .into_iter()
                    .map(|sec| FaultSection {
                        sec_id: sec.sec_id,
                        mesh: sec.mesh,
                    })
                    .collect();
                let mut rupture_idxs = Vec::with_capacity(ruptures.len());
                let mut probs = Vec::with_capacity(ruptures.len());
                let mut mags = Vec::with_capacity(ruptures.len());
                let mut rakes = Vec::with_capacity(ruptures.len());
                for rup in ruptures {
                    rupture_idxs.push(rup.sections);
                    probs.push(rup.probs);
                    mags.push(rup.mag);
                    rakes.push(rup.rake);
                }
                SourceKind::MultiFault(MultiFaultSource::new(
                    sections,
                    rupture_idxs,
                    probs,
                    mags,
                    rakes,
                )?)
            }
            Self::NonParametric { ruptures } => {
                let ruptures = ruptures
                    .into_iter()
                    .map(|rup| Rupture {
                        mag: rup.mag,
                        rake: rup.rake,
                        trt: trt.clone(),
                        hypocenter: rup.hypocenter,
                        surface: rup.surface.map(Surface::Single),
                        occurrence: Occurrence::NonParametric { pmf: rup.pmf },
                    })
                    .collect();
                SourceKind::NonParametric(NonParametricSource::new(ruptures)?)
            }
        })
    }
}

/// Build sources from raw records.
///
/// Sources are numbered in file order and grouped by tectonic region type, in order of first
/// appearance.
fn read_sources_from_iter<I>(iter: I, minimum_magnitude: f64) -> Result<Vec<Source>>
where
    I: IntoIterator<Item = SourceRaw>,
{
    let mut groups: IndexMap<TrtID, u16> = IndexMap::new();
    let mut sources = Vec::new();
    for (ordinal, raw) in iter.into_iter().enumerate() {
        let id = raw.id;
        let kind = raw
            .kind
            .into_kind(&raw.trt)
            .with_context(|| format!("An error occurred with source id={id}"))?;

        let next = groups.len() as u16;
        let grp_id = *groups.entry(raw.trt.clone()).or_insert(next);
        let mut src = Source::new(id, &raw.name, raw.trt, kind);
        src.min_mag = raw.min_mag.max(minimum_magnitude);
        src.ordinal = ordinal as u32;
        src.grp_id = grp_id;
        src.trt_smr = u32::from(grp_id);
        src.num_ruptures = src.count_ruptures();
        src.validate()?;
        sources.push(src);
    }
    check_unique_ids::<SourceID, _, _>(&sources)?;

    Ok(sources)
}

/// Read the sources from `source_model.toml`.
///
/// # Arguments
///
/// * `job_dir` - Folder containing the job files
/// * `minimum_magnitude` - Magnitude below which ruptures are discarded, for every source
pub fn read_source_model(job_dir: &Path, minimum_magnitude: f64) -> Result<Vec<Source>> {
    let file_path = job_dir.join(SOURCE_MODEL_FILE_NAME);
    let model: SourceModelRaw = read_toml(&file_path)?;
    read_sources_from_iter(model.sources, minimum_magnitude)
        .with_context(|| input_err_msg(&file_path))
}
