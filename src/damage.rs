//! Event-based damage calculation.
//!
//! Ground-motion fields are split into slices of whole events. Each slice is processed by an
//! independent task which returns damage distributions summed by event, aggregation bucket and
//! loss type. The results are appended to the `agg_damage_table` of the datastore and finally
//! summed over events into the `damages` table.
use crate::datastore::{Column, DataStore, Table, get_column};
use crate::errors::DamageError;
use crate::exposure::{Exposure, floats_in};
use crate::gmf::{GmfData, event_slices};
use crate::parallel::{Monitor, Starmap, split_in_slices};
use crate::risk::{MultiEventRng, SharedRiskModel};
use anyhow::{Context, Result, bail, ensure};
use log::{info, warn};
use std::collections::{BTreeMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

/// Name of the table holding damages by event
pub const AGG_DAMAGE_TABLE: &str = "agg_damage_table";
/// Name of the table holding damages summed over events
pub const DAMAGES_TABLE: &str = "damages";
/// Name of the table holding ground-motion fields
pub const GMF_TABLE: &str = "gmf_data";

const EXPOSURE_KEY: &str = "exposure";
const CRMODEL_KEY: &str = "crmodel";

/// Parameters of the damage tasks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageParams {
    /// Seed of the random sampling of damage states
    pub master_seed: u64,
    /// 1 if assets of the same taxonomy share their random numbers, else 0
    pub asset_correlation: u8,
    /// Whether to compute fractional damage distributions instead of sampling
    pub float_dmg_dist: bool,
    /// Memory allowed per task, in bytes
    pub task_memory_limit: Option<u64>,
}

/// The work item of [`event_based_damage`]
pub struct DamageTask {
    /// The datastore holding the ground-motion fields
    pub store: Arc<dyn DataStore>,
    /// The rows of the ground-motion table to process
    pub rows: Range<usize>,
    /// Calculation parameters
    pub params: DamageParams,
}

/// The name of the column for damage state `dsi`
fn dmg_column(dsi: usize) -> String {
    format!("dmg_{dsi}")
}

/// Damage accumulators by (event, bucket), each holding a loss type x damage state matrix
type Accumulator = BTreeMap<(u32, u16), Vec<f64>>;

fn add_to(acc: &mut Accumulator, key: (u32, u16), size: usize, offset: usize, values: &[f64]) {
    let matrix = acc.entry(key).or_insert_with(|| vec![0.0; size]);
    for (total, value) in matrix[offset..offset + values.len()].iter_mut().zip(values) {
        *total += value;
    }
}

fn estimated_memory(gmf: &GmfData, acc: &Accumulator, size: usize) -> u64 {
    let gmf_bytes = gmf.len() * (2 + gmf.gmv.len()) * size_of::<u32>();
    let acc_bytes = acc.len() * (size_of::<(u32, u16)>() + size * size_of::<f64>());
    (gmf_bytes + acc_bytes) as u64
}

/// Compute damage distributions for a slice of the ground-motion table.
///
/// The exposure and the risk model are read from the store of the monitor. Damages are summed
/// by event and aggregation bucket. The total bucket (with ID `K`, the number of buckets) is
/// always filled, the other buckets only when the exposure is aggregated (`K > 0`).
///
/// The result has one row per (event, bucket, loss type), sorted by event and bucket. `None` is
/// returned if the task needs more memory than allowed.
pub fn event_based_damage(task: DamageTask, monitor: &Monitor) -> Result<Option<Table>> {
    let (gmf, exposure, crmodel) = {
        let _measurement = monitor.measure("reading data");
        let table = task.store.read_table(GMF_TABLE, Some(task.rows.clone()))?;
        let gmf = GmfData::from_table(&table)?;
        let exposure = monitor.read::<Exposure>(EXPOSURE_KEY)?;
        let crmodel = monitor.read::<SharedRiskModel>(CRMODEL_KEY)?;
        (gmf, exposure, crmodel)
    };

    let params = task.params;
    let rng = MultiEventRng::new(params.master_seed, params.asset_correlation)?;
    let k = exposure.num_buckets();
    let num_loss_types = crmodel.loss_types().len();
    let num_states = crmodel.damage_states().len();
    let size = num_loss_types * num_states;

    let mut acc = Accumulator::new();
    for (ti, (taxonomy, assets)) in exposure.by_taxonomy().into_iter().enumerate() {
        let sids: HashSet<u32> = assets.iter().map(|asset| asset.site_id).collect();
        let gmf = gmf.select_sites(&sids);
        if gmf.is_empty() {
            continue;
        }

        let _measurement = monitor.measure("computing risk");
        let output = crmodel
            .get_output(&taxonomy, &assets, &gmf)
            .with_context(|| format!("Could not compute damages for taxonomy {taxonomy}"))?;
        ensure!(
            output.arrays.len() == num_loss_types,
            "Expected {num_loss_types} loss types in the risk model output"
        );

        let numbers: Vec<f64> = assets.iter().map(|asset| asset.number).collect();
        let streams: Vec<u64> = assets
            .iter()
            .map(|asset| rng.stream(asset.ordinal, ti))
            .collect();
        let ddds = if params.float_dmg_dist {
            let mut ddds = output.arrays;
            for ddd in &mut ddds {
                ddd.scale_by(&numbers);
            }
            ddds
        } else {
            let counts: Vec<u64> = numbers.iter().map(|n| *n as u64).collect();
            rng.discrete_dmg_dist(&output.eids, &output.arrays, &counts, &streams)?
        };
        for (li, ddd) in ddds.iter().enumerate() {
            let offset = li * num_states;
            for (e, eid) in output.eids.iter().enumerate() {
                for (a, asset) in assets.iter().enumerate() {
                    let dd = ddd.get(a, e);
                    add_to(&mut acc, (*eid, k), size, offset, dd);
                    if k > 0 {
                        add_to(&mut acc, (*eid, exposure.kid(asset)), size, offset, dd);
                    }
                }
            }
        }

        if let Some(limit) = params.task_memory_limit {
            let used = estimated_memory(&gmf, &acc, size);
            if used > limit {
                warn!("Damage task needs {used} bytes, more than the limit of {limit}");
                return Ok(None);
            }
        }
    }

    let num_rows = acc.len() * num_loss_types;
    let mut event_id = Vec::with_capacity(num_rows);
    let mut agg_id = Vec::with_capacity(num_rows);
    let mut loss_id = Vec::with_capacity(num_rows);
    let mut dmg = vec![Vec::with_capacity(num_rows); num_states.saturating_sub(1)];
    for ((eid, kid), matrix) in &acc {
        for li in 0..num_loss_types {
            event_id.push(*eid);
            agg_id.push(*kid);
            loss_id.push(li as u8);
            for (dsi, column) in dmg.iter_mut().enumerate() {
                column.push(matrix[li * num_states + dsi + 1] as f32);
            }
        }
    }

    let mut table = Table::new();
    table.insert("event_id".to_string(), Column::U32(event_id));
    table.insert("agg_id".to_string(), Column::U16(agg_id));
    table.insert("loss_id".to_string(), Column::U8(loss_id));
    for (dsi, column) in dmg.into_iter().enumerate() {
        table.insert(dmg_column(dsi + 1), Column::F32(column));
    }

    Ok(Some(table))
}

/// Append the result of a damage task to the `agg_damage_table` columns of the store.
///
/// A missing result means that the task ran out of memory, which aborts the calculation.
pub fn combine(store: &dyn DataStore, acc: usize, result: Option<Table>) -> Result<usize> {
    let Some(table) = result else {
        return Err(DamageError::OutOfMemory.into());
    };
    for (name, column) in &table {
        store.extend(&format!("{AGG_DAMAGE_TABLE}/{name}"), column)?;
    }

    Ok(acc + 1)
}

/// Damages summed by (bucket, loss type)
pub type AggDamages = BTreeMap<(u16, u8), Vec<f64>>;

/// The work item of [`agg_damages`]
pub struct AggTask {
    /// The datastore holding the `agg_damage_table`
    pub store: Arc<dyn DataStore>,
    /// The rows of the table to aggregate
    pub rows: Range<usize>,
}

/// Sum a slice of the `agg_damage_table` by (bucket, loss type)
pub fn agg_damages(task: AggTask, monitor: &Monitor) -> Result<AggDamages> {
    let _measurement = monitor.measure("aggregating damages");
    let table = task.store.read_table(AGG_DAMAGE_TABLE, Some(task.rows))?;
    let Column::U16(agg_id) = get_column(&table, "agg_id")? else {
        bail!("agg_id should be a u16 column");
    };
    let Column::U8(loss_id) = get_column(&table, "loss_id")? else {
        bail!("loss_id should be a u8 column");
    };
    let dmg: Vec<&Column> = table
        .iter()
        .filter(|(name, _)| name.starts_with("dmg_"))
        .map(|(_, column)| column)
        .collect();

    let mut agg = AggDamages::new();
    for (row, key) in agg_id.iter().copied().zip(loss_id.iter().copied()).enumerate() {
        let sums = agg.entry(key).or_insert_with(|| vec![0.0; dmg.len()]);
        for (sum, column) in sums.iter_mut().zip(&dmg) {
            *sum += column.get_f64(row).unwrap_or(0.0);
        }
    }

    Ok(agg)
}

/// Merge partial sums by key
fn merge_damages(mut acc: AggDamages, partial: AggDamages) -> AggDamages {
    for (key, values) in partial {
        let sums = acc.entry(key).or_insert_with(|| vec![0.0; values.len()]);
        for (sum, value) in sums.iter_mut().zip(values) {
            *sum += value;
        }
    }

    acc
}

/// Runs the event-based damage calculation over the ground-motion fields of a datastore
pub struct DamageCalculator {
    store: Arc<dyn DataStore>,
    exposure: Exposure,
    crmodel: SharedRiskModel,
    params: DamageParams,
    concurrent_tasks: usize,
    num_threads: usize,
    monitor: Monitor,
}

impl DamageCalculator {
    /// Create a new [`DamageCalculator`]
    pub fn new(
        store: Arc<dyn DataStore>,
        exposure: Exposure,
        crmodel: SharedRiskModel,
        params: DamageParams,
        concurrent_tasks: usize,
    ) -> Self {
        Self {
            store,
            exposure,
            crmodel,
            params,
            concurrent_tasks,
            num_threads: 0,
            monitor: Monitor::new("event_based_damage"),
        }
    }

    /// Use the given number of worker threads (zero means one per CPU)
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// The monitor of the calculation
    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Save ground-motion fields in the datastore, sorted by event
    pub fn import_gmf(&self, gmf: &GmfData) -> Result<()> {
        self.store
            .create_table(GMF_TABLE, gmf.sorted_by_event().to_table())
    }

    /// Whether damage distributions are computed as floats for the given exposure
    pub fn use_float_dmg_dist(&self) -> bool {
        let has_floats = floats_in(&self.exposure.numbers());
        if has_floats {
            warn!("Using floating point damage distributions");
        }

        self.params.float_dmg_dist || has_floats
    }

    /// Compute damages by event and append them to the `agg_damage_table`.
    ///
    /// Returns the number of tasks which were run.
    pub fn execute(&self) -> Result<usize> {
        let params = DamageParams {
            float_dmg_dist: self.use_float_dmg_dist(),
            ..self.params
        };
        self.exposure.check_numbers();

        let eids = self
            .store
            .read_column(&format!("{GMF_TABLE}/eid"), None)
            .context("No ground motion fields in the datastore")?
            .to_u32()?;

        self.monitor.save(EXPOSURE_KEY, self.exposure.clone())?;
        self.monitor.save(CRMODEL_KEY, Arc::clone(&self.crmodel))?;

        let mut smap = Starmap::new("event_based_damage", event_based_damage, &self.monitor)
            .num_threads(self.num_threads);
        for rows in event_slices(&eids, self.concurrent_tasks) {
            smap.submit(DamageTask {
                store: Arc::clone(&self.store),
                rows,
                params,
            });
        }
        info!("Computing damages with {} tasks", smap.len());

        let store = Arc::clone(&self.store);
        smap.reduce(|acc, result| combine(store.as_ref(), acc, result), 0)
    }

    /// Sum the `agg_damage_table` over events and save the result as the `damages` table
    pub fn post_execute(&self) -> Result<Table> {
        let num_states = self.crmodel.damage_states().len();
        let key = format!("{AGG_DAMAGE_TABLE}/event_id");
        let len_table = if self.store.contains(&key) {
            self.store.len(&key)?
        } else {
            0
        };
        self.store.swmr_on();

        let mut smap =
            Starmap::new("agg_damages", agg_damages, &self.monitor).num_threads(self.num_threads);
        for rows in split_in_slices(len_table, self.concurrent_tasks.max(1)) {
            smap.submit(AggTask {
                store: Arc::clone(&self.store),
                rows,
            });
        }
        let agg = smap.reduce(|acc, partial| Ok(merge_damages(acc, partial)), AggDamages::new())?;

        let mut agg_id = Vec::with_capacity(agg.len());
        let mut loss_id = Vec::with_capacity(agg.len());
        let mut dmg = vec![Vec::with_capacity(agg.len()); num_states.saturating_sub(1)];
        for ((kid, li), sums) in &agg {
            agg_id.push(*kid);
            loss_id.push(*li);
            for (column, sum) in dmg.iter_mut().zip(sums) {
                column.push(*sum as f32);
            }
        }

        let mut table = Table::new();
        table.insert("agg_id".to_string(), Column::U16(agg_id));
        table.insert("loss_id".to_string(), Column::U8(loss_id));
        for (dsi, column) in dmg.into_iter().enumerate() {
            table.insert(dmg_column(dsi + 1), Column::F32(column));
        }
        self.store.create_table(DAMAGES_TABLE, table.clone())?;

        Ok(table)
    }

    /// Run the whole calculation, returning the `damages` table
    pub fn run(&self) -> Result<Table> {
        let num_tasks = self.execute()?;
        info!("Stored the damages of {num_tasks} tasks");
        let damages = self.post_execute()?;
        self.monitor.log_timings();

        Ok(damages)
    }
}
