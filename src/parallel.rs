//! A small map-reduce layer on top of a rayon thread pool.
//!
//! Work items are submitted to a [`Starmap`] and processed by a pure task function. Results are
//! folded on the calling thread in the order in which tasks complete. Tasks share data through the
//! read-only value store of their [`Monitor`].
use anyhow::{Context, Result, anyhow};
use indexmap::IndexMap;
use log::debug;
use std::any::Any;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Accumulated measurements for a named operation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timing {
    /// Total time spent
    pub duration: Duration,
    /// Number of measurements
    pub counts: u64,
}

type SharedValue = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct MonitorState {
    timings: Mutex<IndexMap<String, Timing>>,
    store: RwLock<HashMap<String, SharedValue>>,
}

/// Instrumentation shared between the calling thread and the tasks.
///
/// Monitors record the time spent in named, nested operations. They also hold a store of values
/// which are saved once and then read by every task.
#[derive(Clone)]
pub struct Monitor {
    name: String,
    state: Arc<MonitorState>,
}

/// Records the time elapsed since its creation when dropped
pub struct Measurement {
    monitor: Monitor,
    operation: String,
    start: Instant,
}

impl Drop for Measurement {
    fn drop(&mut self) {
        self.monitor.record(&self.operation, self.start.elapsed());
    }
}

impl Monitor {
    /// Create a new top-level [`Monitor`]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::default(),
        }
    }

    /// The name of the monitor
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A monitor for a nested operation, sharing timings and store with this one
    pub fn child(&self, name: &str) -> Monitor {
        Self {
            name: format!("{}/{name}", self.name),
            state: Arc::clone(&self.state),
        }
    }

    /// Start measuring an operation. The measurement ends when the guard is dropped.
    pub fn measure(&self, operation: &str) -> Measurement {
        Measurement {
            monitor: self.clone(),
            operation: format!("{}/{operation}", self.name),
            start: Instant::now(),
        }
    }

    fn record(&self, operation: &str, elapsed: Duration) {
        let Ok(mut timings) = self.state.timings.lock() else {
            return;
        };
        let timing = timings.entry(operation.to_string()).or_default();
        timing.duration += elapsed;
        timing.counts += 1;
    }

    /// The measurements recorded so far, in order of first appearance
    pub fn timings(&self) -> Vec<(String, Timing)> {
        self.state
            .timings
            .lock()
            .map(|timings| timings.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default()
    }

    /// Log the measurements recorded so far
    pub fn log_timings(&self) {
        for (operation, timing) in self.timings() {
            debug!(
                "{operation}: {:.3}s over {} calls",
                timing.duration.as_secs_f64(),
                timing.counts
            );
        }
    }

    /// Save a value in the shared store, replacing any previous value with the same key
    pub fn save<T: Any + Send + Sync>(&self, key: &str, value: T) -> Result<()> {
        let mut store = self
            .state
            .store
            .write()
            .map_err(|_| anyhow!("Monitor store is poisoned"))?;
        store.insert(key.to_string(), Arc::new(value));

        Ok(())
    }

    /// Read a value from the shared store
    pub fn read<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>> {
        let store = self
            .state
            .store
            .read()
            .map_err(|_| anyhow!("Monitor store is poisoned"))?;
        let value = store
            .get(key)
            .with_context(|| format!("No value called {key} in the monitor store"))?;

        Arc::clone(value)
            .downcast::<T>()
            .map_err(|_| anyhow!("The value called {key} has an unexpected type"))
    }
}

/// A task function: takes one work item and the monitor of the task
pub type Task<A, R> = fn(A, &Monitor) -> Result<R>;

/// Applies a task function to many work items in parallel
pub struct Starmap<A, R> {
    name: String,
    task: Task<A, R>,
    args: Vec<A>,
    monitor: Monitor,
    num_threads: usize,
}

impl<A, R> Starmap<A, R>
where
    A: Send,
    R: Send,
{
    /// Create a new [`Starmap`] for the given task.
    ///
    /// Tasks run with a child of `monitor` named after the starmap.
    pub fn new(name: &str, task: Task<A, R>, monitor: &Monitor) -> Self {
        Self {
            name: name.to_string(),
            task,
            args: Vec::new(),
            monitor: monitor.child(name),
            num_threads: 0,
        }
    }

    /// Use the given number of worker threads (zero means one per CPU)
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Add a work item
    pub fn submit(&mut self, args: A) {
        self.args.push(args);
    }

    /// The number of submitted work items
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Whether no work item has been submitted
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Run all submitted work items and fold their results into `init` with `agg`.
    ///
    /// Results are folded in completion order. The first error, from a task or from `agg`,
    /// aborts the reduction once the tasks already running have finished.
    pub fn reduce<T, F>(self, mut agg: F, init: T) -> Result<T>
    where
        F: FnMut(T, R) -> Result<T>,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .thread_name({
                let name = self.name.clone();
                move |i| format!("{name}-{i}")
            })
            .build()
            .context("Failed to create thread pool")?;

        let num_tasks = self.args.len();
        debug!("Starting {num_tasks} {} tasks", self.name);
        let task = self.task;
        let monitor = self.monitor;
        let (tx, rx) = mpsc::channel::<(usize, Result<R>)>();

        pool.in_place_scope(|scope| {
            for (i, args) in self.args.into_iter().enumerate() {
                let tx = tx.clone();
                let monitor = monitor.clone();
                scope.spawn(move |_| {
                    let result = {
                        let _measurement = monitor.measure("total");
                        task(args, &monitor)
                    };
                    // The receiver only hangs up after an error
                    let _ = tx.send((i, result));
                });
            }
            drop(tx);

            let mut acc = init;
            for (i, result) in rx {
                let result = result.with_context(|| format!("Task {} #{i} failed", monitor.name()))?;
                acc = agg(acc, result)?;
            }

            Ok(acc)
        })
    }
}

/// Split `num_items` indices into at most `num_slices` contiguous slices of equal size (except
/// the last one)
pub fn split_in_slices(num_items: usize, num_slices: usize) -> Vec<Range<usize>> {
    if num_items == 0 {
        return Vec::new();
    }

    let blocksize = num_items.div_ceil(num_slices.max(1));
    (0..num_items)
        .step_by(blocksize)
        .map(|start| start..(start + blocksize).min(num_items))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::ensure;
    use rstest::rstest;

    #[rstest]
    #[case(10, 3, vec![0..4, 4..8, 8..10])]
    #[case(10, 1, vec![0..10])]
    #[case(3, 5, vec![0..1, 1..2, 2..3])]
    #[case(10, 0, vec![0..10])]
    #[case(0, 4, vec![])]
    fn test_split_in_slices(
        #[case] num_items: usize,
        #[case] num_slices: usize,
        #[case] expected: Vec<Range<usize>>,
    ) {
        assert_eq!(split_in_slices(num_items, num_slices), expected);
    }

    fn square(x: u64, monitor: &Monitor) -> Result<u64> {
        let offset = monitor.read::<u64>("offset")?;
        Ok(x * x + *offset)
    }

    fn fail_on_three(x: u64, _monitor: &Monitor) -> Result<u64> {
        ensure!(x != 3, "three is not allowed");
        Ok(x)
    }

    #[test]
    fn test_starmap_reduce() {
        let monitor = Monitor::new("test");
        monitor.save("offset", 1u64).unwrap();

        let mut smap = Starmap::new("square", square, &monitor).num_threads(2);
        for x in 0..10 {
            smap.submit(x);
        }
        assert_eq!(smap.len(), 10);
        let total = smap.reduce(|acc, x| Ok(acc + x), 0).unwrap();
        assert_eq!(total, (0..10).map(|x| x * x + 1).sum::<u64>());

        let timings = monitor.timings();
        assert_eq!(timings.len(), 1);
        assert_eq!(timings[0].0, "test/square/total");
        assert_eq!(timings[0].1.counts, 10);
    }

    #[test]
    fn test_starmap_error() {
        let monitor = Monitor::new("test");
        let mut smap = Starmap::new("fail", fail_on_three, &monitor).num_threads(2);
        for x in 0..5 {
            smap.submit(x);
        }
        let err = smap.reduce(|acc, x| Ok(acc + x), 0).unwrap_err();
        assert_eq!(err.root_cause().to_string(), "three is not allowed");
    }

    #[test]
    fn test_monitor_store() {
        let monitor = Monitor::new("test");
        monitor.save("value", String::from("hello")).unwrap();
        let child = monitor.child("child");
        assert_eq!(*child.read::<String>("value").unwrap(), "hello");
        assert!(child.read::<u32>("value").is_err());
        assert!(child.read::<String>("missing").is_err());
    }

    #[test]
    fn test_nested_measurements() {
        let monitor = Monitor::new("calc");
        {
            let _outer = monitor.measure("outer");
            let _inner = monitor.child("sub").measure("inner");
        }
        let names: Vec<_> = monitor.timings().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["calc/sub/inner", "calc/outer"]);
    }
}
