//! Aggregation pipelines: fan out over upstream sub-resources, normalize,
//! deduplicate, sort, upsert.
//!
//! - [`forms::FormsAggregator`]: species → varieties → pokemon → forms → form detail
//! - [`region::RegionAggregator`]: pokedex slugs → merged species list
//! - [`population::Populator`]: bulk pokemon + species population over an id range
//!
//! All three are idempotent: rerunning over the same input converges on the same
//! cached state, so a partial failure is repaired by running again. Concurrency is
//! cooperative: a fixed number of in-flight requests per level plus a randomized
//! pacing delay before every upstream call.

use futures::stream::{self, StreamExt};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::retry_fetch::FetchError;
use crate::settings::Aggregation;

pub mod forms;
pub mod population;
pub mod region;

pub use forms::FormsAggregator;
pub use population::{PopulationReport, Populator};
pub use region::{region_slugs, RegionAggregate, RegionAggregator, RegionSpecies, REGIONS};

#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("Unknown region: {0}")]
    UnknownRegion(String),
    #[error("Every source for region {region} failed: {last}")]
    AllSourcesFailed { region: String, last: FetchError },
}

/// Static inter-request delay drawn uniformly from `[min_ms, max_ms]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Pacing {
    pub const NONE: Pacing = Pacing { min_ms: 0, max_ms: 0 };

    pub fn delay(&self) -> Duration {
        if self.max_ms == 0 {
            return Duration::ZERO;
        }
        let min = self.min_ms.min(self.max_ms);
        Duration::from_millis(rand::thread_rng().gen_range(min..=self.max_ms))
    }

    pub async fn pause(&self) {
        let delay = self.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl From<&Aggregation> for Pacing {
    fn from(settings: &Aggregation) -> Self {
        Self {
            min_ms: settings.pacing_min_ms,
            max_ms: settings.pacing_max_ms,
        }
    }
}

/// Runs `task` over `items` with at most `workers` futures in flight.
/// Results arrive in completion order; callers re-sort.
pub async fn run_bounded<I, T, F, Fut>(items: I, workers: usize, task: F) -> Vec<T>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = T>,
{
    stream::iter(items)
        .map(task)
        .buffer_unordered(workers.max(1))
        .collect()
        .await
}
