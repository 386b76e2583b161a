//! Parallel hyperparameter grid sweep.
//!
//! Enumerates (numtrees, nmin, numattr) combinations, scores each one as
//! the mean accuracy over a shared set of precomputed train/test folds, and
//! tracks the best combination under a single mutex that also owns the
//! terminal progress line.

use std::io::Write;
use std::sync::Mutex;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::config::{ExtraTreesConfig, NumAttr};
use crate::dataset::ExampleSet;
use crate::error::EtError;
use crate::forest::Forest;

/// Fraction of each fold used for training; the rest measures accuracy.
const TRAIN_FRACTION: f64 = 0.7;

/// Default numtrees axis: powers of two, 8 through 1024.
const NUM_TREES_EXPONENTS: std::ops::RangeInclusive<u32> = 3..=10;

/// Default nmin axis: powers of two, 2 through 256.
const N_MIN_EXPONENTS: std::ops::RangeInclusive<u32> = 1..=8;

/// One point of the hyperparameter grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HyperParams {
    /// Ensemble size.
    pub num_trees: usize,
    /// Minimum splittable subset size.
    pub n_min: usize,
    /// Attributes sampled per branch (resolved).
    pub num_attr: usize,
}

/// Outcome of a completed sweep.
#[derive(Debug)]
pub struct SearchResult {
    /// The winning combination.
    pub best: HyperParams,
    /// Mean fold accuracy of the winning combination.
    pub best_accuracy: f64,
    /// Number of grid points evaluated.
    pub n_points: usize,
    /// Forest grown over the full example set with the winning combination.
    pub forest: Forest,
}

/// Grid sweep configuration.
///
/// Construct via [`GridSearch::new`], pin axes with the `pin_*` methods,
/// then call [`GridSearch::run`]. Unpinned axes take their default grids;
/// the numattr axis defaults to every value from 1 through the feature
/// count.
#[derive(Debug, Clone)]
pub struct GridSearch {
    layers: usize,
    seed: u64,
    num_trees: Option<usize>,
    n_min: Option<usize>,
    num_attr: Option<usize>,
    show_progress: bool,
}

impl GridSearch {
    /// Create a sweep that scores every grid point on `layers` folds.
    ///
    /// # Errors
    ///
    /// Returns [`EtError::InvalidLayerCount`] if `layers` is zero.
    pub fn new(layers: usize) -> Result<Self, EtError> {
        if layers == 0 {
            return Err(EtError::InvalidLayerCount { layers });
        }
        Ok(Self {
            layers,
            seed: 42,
            num_trees: None,
            n_min: None,
            num_attr: None,
            show_progress: true,
        })
    }

    /// Set the random seed for fold generation and tree growth.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Pin the numtrees axis to a single value.
    #[must_use]
    pub fn pin_num_trees(mut self, num_trees: usize) -> Self {
        self.num_trees = Some(num_trees);
        self
    }

    /// Pin the nmin axis to a single value.
    #[must_use]
    pub fn pin_n_min(mut self, n_min: usize) -> Self {
        self.n_min = Some(n_min);
        self
    }

    /// Pin the numattr axis to a single (resolved) value.
    #[must_use]
    pub fn pin_num_attr(mut self, num_attr: usize) -> Self {
        self.num_attr = Some(num_attr);
        self
    }

    /// Enable or disable the terminal progress line.
    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Enumerate the grid in lexicographic (numtrees, nmin, numattr) order.
    fn grid(&self, n_features: usize) -> Vec<HyperParams> {
        let num_trees_axis: Vec<usize> = match self.num_trees {
            Some(m) => vec![m],
            None => NUM_TREES_EXPONENTS.map(|p| 1usize << p).collect(),
        };
        let n_min_axis: Vec<usize> = match self.n_min {
            Some(v) => vec![v],
            None => N_MIN_EXPONENTS.map(|p| 1usize << p).collect(),
        };
        let num_attr_axis: Vec<usize> = match self.num_attr {
            Some(k) => vec![k],
            None => (1..=n_features).collect(),
        };

        let mut points =
            Vec::with_capacity(num_trees_axis.len() * n_min_axis.len() * num_attr_axis.len());
        for &num_trees in &num_trees_axis {
            for &n_min in &n_min_axis {
                for &num_attr in &num_attr_axis {
                    points.push(HyperParams {
                        num_trees,
                        n_min,
                        num_attr,
                    });
                }
            }
        }
        points
    }

    /// Run the sweep and grow the final forest.
    ///
    /// The folds are generated once up front and shared read-only by every
    /// grid point, so combinations are compared on identical splits. Up to
    /// the rayon pool size (hardware parallelism) points are evaluated
    /// concurrently; the best-so-far record, the completion counter, and
    /// the progress line share one mutex. After the sweep drains, a fresh
    /// forest is grown over the full example set with the winning
    /// combination.
    ///
    /// # Errors
    ///
    /// Propagates training errors from any grid point, plus
    /// [`EtError::EmptyDataset`] / [`EtError::ZeroFeatures`] for an
    /// unusable example set.
    #[instrument(skip_all, fields(layers = self.layers, n_examples = examples.n_examples()))]
    pub fn run(&self, examples: &ExampleSet) -> Result<SearchResult, EtError> {
        if examples.n_examples() == 0 {
            return Err(EtError::EmptyDataset);
        }
        if examples.n_features() == 0 {
            return Err(EtError::ZeroFeatures);
        }

        let points = self.grid(examples.n_features());
        info!(
            combinations = points.len(),
            ensembles = points.len() * self.layers,
            "starting hyperparameter sweep"
        );

        let mut master_rng = ChaCha8Rng::seed_from_u64(self.seed);
        let folds: Vec<(ExampleSet, ExampleSet)> = (0..self.layers)
            .map(|_| examples.split(TRAIN_FRACTION, &mut master_rng))
            .collect();
        let point_seeds: Vec<u64> = points.iter().map(|_| master_rng.r#gen()).collect();
        let final_seed: u64 = master_rng.r#gen();

        let n_points = points.len();
        let tracker = BestTracker::new(n_points, self.show_progress);

        let tasks: Vec<(HyperParams, u64)> = points.into_iter().zip(point_seeds).collect();
        tasks
            .into_par_iter()
            .map(|(params, seed)| {
                let accuracy = self.evaluate_point(params, seed, &folds)?;
                tracker.record(params, accuracy);
                Ok(())
            })
            .collect::<Result<(), EtError>>()?;
        tracker.finish();

        let (best, best_accuracy) = tracker
            .into_best()
            .expect("sweep evaluated at least one grid point");
        info!(
            num_trees = best.num_trees,
            n_min = best.n_min,
            num_attr = best.num_attr,
            accuracy = best_accuracy,
            "sweep complete"
        );

        let forest = ExtraTreesConfig::new(best.num_trees)?
            .with_n_min(best.n_min)
            .with_num_attr(NumAttr::Fixed(best.num_attr))
            .with_seed(final_seed)
            .fit(examples)?;

        Ok(SearchResult {
            best,
            best_accuracy,
            n_points,
            forest,
        })
    }

    /// Mean accuracy of one combination across all folds.
    fn evaluate_point(
        &self,
        params: HyperParams,
        seed: u64,
        folds: &[(ExampleSet, ExampleSet)],
    ) -> Result<f64, EtError> {
        let mut accuracy_sum = 0.0;
        for (layer, (train, test)) in folds.iter().enumerate() {
            let forest = ExtraTreesConfig::new(params.num_trees)?
                .with_n_min(params.n_min)
                .with_num_attr(NumAttr::Fixed(params.num_attr))
                .with_seed(seed.wrapping_add(layer as u64))
                .fit(train)?;
            accuracy_sum += forest.accuracy(test)?;
        }
        Ok(accuracy_sum / folds.len() as f64)
    }
}

/// State behind the best-tracker mutex.
#[derive(Debug)]
struct BestState {
    completed: usize,
    best_accuracy: f64,
    best: Option<HyperParams>,
}

/// Mutex-protected best-so-far record and progress display.
///
/// `record` is the only writer: it bumps the completion counter, applies a
/// strictly-greater comparison (so the first of tied combinations wins),
/// and emits the progress line, all under one lock so concurrent workers
/// never interleave partial updates or partial terminal writes.
#[derive(Debug)]
struct BestTracker {
    total: usize,
    show_progress: bool,
    state: Mutex<BestState>,
}

impl BestTracker {
    fn new(total: usize, show_progress: bool) -> Self {
        Self {
            total,
            show_progress,
            state: Mutex::new(BestState {
                completed: 0,
                best_accuracy: -1.0,
                best: None,
            }),
        }
    }

    fn record(&self, params: HyperParams, accuracy: f64) {
        let mut state = self.state.lock().expect("best tracker mutex poisoned");
        state.completed += 1;
        let is_best = accuracy > state.best_accuracy;
        if is_best {
            state.best_accuracy = accuracy;
            state.best = Some(params);
        }
        debug!(
            completed = state.completed,
            num_trees = params.num_trees,
            n_min = params.n_min,
            num_attr = params.num_attr,
            accuracy,
            is_best,
            "grid point evaluated"
        );

        if self.show_progress {
            let best = state.best.expect("best is set by the first record");
            let percent = 100 * state.completed / self.total;
            let line = format!(
                "{percent:>3}%, numtrees = {:<4}, nmin = {:<3}, numattr = {:<3}, accuracy = {:<7.5} (best: {:.3}, {}, {}, {})   ",
                params.num_trees,
                params.n_min,
                params.num_attr,
                accuracy,
                state.best_accuracy,
                best.num_trees,
                best.n_min,
                best.num_attr,
            );
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            // New bests are highlighted with the reverse-video escape.
            let _ = if is_best {
                write!(out, "\r\x1B[7m{line}\x1B[0m")
            } else {
                write!(out, "\r{line}")
            };
            let _ = out.flush();
        }
    }

    fn finish(&self) {
        if self.show_progress {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let _ = writeln!(out);
        }
    }

    fn into_best(self) -> Option<(HyperParams, f64)> {
        let state = self
            .state
            .into_inner()
            .expect("best tracker mutex poisoned");
        state.best.map(|best| (best, state.best_accuracy))
    }
}

#[cfg(test)]
mod tests {
    use super::{BestTracker, GridSearch, HyperParams};
    use crate::dataset::ExampleSet;
    use crate::error::EtError;

    fn make_separable() -> ExampleSet {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..30 {
            features.push(vec![i as f32 * 0.1, 0.5]);
            labels.push(0);
        }
        for i in 0..30 {
            features.push(vec![10.0 + i as f32 * 0.1, 0.5]);
            labels.push(1);
        }
        ExampleSet::new(
            "y".to_string(),
            vec!["x1".to_string(), "x2".to_string()],
            vec![],
            features,
            labels,
        )
        .unwrap()
    }

    fn params(num_trees: usize, n_min: usize, num_attr: usize) -> HyperParams {
        HyperParams {
            num_trees,
            n_min,
            num_attr,
        }
    }

    #[test]
    fn zero_layers_rejected() {
        assert!(matches!(
            GridSearch::new(0),
            Err(EtError::InvalidLayerCount { layers: 0 })
        ));
    }

    #[test]
    fn default_grid_dimensions() {
        let search = GridSearch::new(3).unwrap();
        let points = search.grid(5);
        // 8 numtrees values x 8 nmin values x 5 numattr values.
        assert_eq!(points.len(), 8 * 8 * 5);
        assert_eq!(points[0], params(8, 2, 1));
        assert_eq!(points[points.len() - 1], params(1024, 256, 5));
    }

    #[test]
    fn grid_is_lexicographic() {
        let search = GridSearch::new(1).unwrap();
        let points = search.grid(2);
        let mut sorted = points.clone();
        sorted.sort_by_key(|p| (p.num_trees, p.n_min, p.num_attr));
        assert_eq!(points, sorted);
    }

    #[test]
    fn pinned_axes_collapse_the_grid() {
        let search = GridSearch::new(2)
            .unwrap()
            .pin_num_trees(32)
            .pin_n_min(4)
            .pin_num_attr(1);
        assert_eq!(search.grid(10), vec![params(32, 4, 1)]);
    }

    #[test]
    fn sweep_over_pinned_grid_finds_separable_data() {
        let set = make_separable();
        let result = GridSearch::new(2)
            .unwrap()
            .with_seed(42)
            .with_progress(false)
            .pin_num_trees(8)
            .pin_n_min(2)
            .run(&set)
            .unwrap();

        // numattr axis stays dense: one point per feature.
        assert_eq!(result.n_points, 2);
        assert!(result.best_accuracy > 0.9, "best = {}", result.best_accuracy);
        assert_eq!(result.best.num_trees, 8);
        assert_eq!(result.best.n_min, 2);
        assert_eq!(result.forest.n_trees(), 8);

        // The final forest is grown over the full set.
        let accuracy = result.forest.accuracy(&set).unwrap();
        assert!(accuracy > 0.9, "final accuracy = {accuracy}");
    }

    #[test]
    fn sweep_is_deterministic_for_equal_seeds() {
        let set = make_separable();
        let run = || {
            GridSearch::new(2)
                .unwrap()
                .with_seed(7)
                .with_progress(false)
                .pin_num_trees(4)
                .pin_n_min(2)
                .run(&set)
                .unwrap()
        };
        let a = run();
        let b = run();
        assert_eq!(a.best, b.best);
        assert_eq!(a.best_accuracy, b.best_accuracy);
        assert_eq!(a.forest, b.forest);
    }

    #[test]
    fn tracker_counts_and_keeps_strict_best() {
        let tracker = BestTracker::new(3, false);
        tracker.record(params(8, 2, 1), 0.5);
        tracker.record(params(16, 2, 1), 0.75);
        // Equal accuracy must not displace the earlier best.
        tracker.record(params(32, 2, 1), 0.75);

        let (best, accuracy) = tracker.into_best().unwrap();
        assert_eq!(best, params(16, 2, 1));
        assert_eq!(accuracy, 0.75);
    }

    #[test]
    fn tracker_without_records_has_no_best() {
        let tracker = BestTracker::new(1, false);
        assert!(tracker.into_best().is_none());
    }
}
