//! The incremental collector: reads progress from the store, spends a
//! bounded budget of new rows on the least-covered countries, and reports how
//! many more runs the target needs.

use crate::config::{Config, RunConfig, SyntheticConfig};
use crate::error::CollectorError;
use crate::sources::air_quality::AirQualityAdapter;
use crate::sources::economic::EconomicAdapter;
use crate::sources::synthetic::placeholder;
use crate::sources::weather::WeatherAdapter;
use crate::sources::SourceAdapter;
use crate::store::writer::StoreOutcome;
use crate::store::Store;
use crate::types::country::Country;
use crate::types::source::DataSource;
use crate::types::work_item::{ProgressKey, WorkItem};
use bon::bon;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Outcome of one collection run for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub source: DataSource,
    /// Rows inserted this run, synthetic ones included.
    pub items_collected_this_run: usize,
    pub synthetic_this_run: usize,
    pub total_persisted: usize,
    pub target_total: usize,
    pub runs_remaining: usize,
}

impl RunSummary {
    pub fn target_reached(&self) -> bool {
        self.total_persisted >= self.target_total
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: added {} rows this run ({} synthetic), {}/{} persisted",
            self.source,
            self.items_collected_this_run,
            self.synthetic_this_run,
            self.total_persisted,
            self.target_total
        )?;
        if self.target_reached() {
            write!(f, ", target reached")
        } else {
            write!(f, ", about {} more run(s) needed", self.runs_remaining)
        }
    }
}

/// Runs needed to close the gap between `total` and `target` at `per_run_cap` rows per run.
pub fn runs_remaining(total: usize, target: usize, per_run_cap: usize) -> usize {
    target.saturating_sub(total).div_ceil(per_run_cap.max(1))
}

/// Rows a run may add: the per-run cap, but never past the target.
pub fn run_budget(total: usize, run: &RunConfig) -> usize {
    run.per_run_cap.min(run.target_total.saturating_sub(total))
}

/// Drives one source through a single bounded collection run.
///
/// # Examples
///
/// ```no_run
/// # use statcollect::{Collector, Config, EconomicAdapter, Store, CollectorError};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), CollectorError> {
/// let config = Config::default();
/// let mut store = Store::open(&config.database_path)?;
/// store.ensure_schema(&config.countries)?;
/// let adapter = EconomicAdapter::from_config(&config.economic, &config.http)?;
///
/// let summary = Collector::builder()
///     .store(&store)
///     .adapter(&adapter)
///     .countries(config.countries.clone())
///     .run(config.economic.run.clone())
///     .synthetic(config.economic.synthetic.clone())
///     .build()
///     .run()
///     .await?;
/// println!("{summary}");
/// # Ok(())
/// # }
/// ```
pub struct Collector<'a, A: SourceAdapter> {
    store: &'a Store,
    adapter: &'a A,
    countries: Vec<Country>,
    run: RunConfig,
    synthetic: SyntheticConfig,
}

#[bon]
impl<'a, A: SourceAdapter> Collector<'a, A> {
    #[builder]
    pub fn new(
        store: &'a Store,
        adapter: &'a A,
        countries: Vec<Country>,
        run: RunConfig,
        #[builder(default)] synthetic: SyntheticConfig,
    ) -> Self {
        Self {
            store,
            adapter,
            countries,
            run,
            synthetic,
        }
    }
}

impl<A: SourceAdapter> Collector<'_, A> {
    pub async fn run(&self) -> Result<RunSummary, CollectorError> {
        let mut rng = StdRng::from_entropy();
        self.run_with_rng(&mut rng).await
    }

    /// Like [`Collector::run`], drawing synthetic values from `rng`.
    ///
    /// # Errors
    ///
    /// Only store failures abort a run. Enumeration and fetch failures are
    /// logged and leave the affected items for the next run.
    pub async fn run_with_rng<R: Rng>(&self, rng: &mut R) -> Result<RunSummary, CollectorError> {
        let source = self.adapter.source();

        // Init
        let total_before = self.store.count(source)?;
        let by_country = self.store.counts_by_country(source)?;
        let mut satisfied = self.store.existing_keys(source)?;
        let budget = run_budget(total_before, &self.run);
        info!(
            "Collecting {source}: {total_before}/{} persisted, budget {budget} this run",
            self.run.target_total
        );

        let mut collected = 0;
        let mut synthetic = 0;
        if budget > 0 {
            for country in self.entity_order(&by_country) {
                if collected >= budget {
                    break;
                }
                let existing = by_country.get(&country.code).copied().unwrap_or(0);
                let share = match self.run.per_entity_target {
                    Some(quota) if existing >= quota => {
                        debug!("{} already has {existing}/{quota} rows", country.code);
                        continue;
                    }
                    Some(quota) => (quota - existing).min(budget - collected),
                    None => budget - collected,
                };

                // Fetches are bounded by `share` below, not by the listing.
                let items = match self.adapter.list_work_items(country, usize::MAX).await {
                    Ok(items) => items,
                    Err(e) => {
                        warn!("Could not list {source} work for {}: {e}", country.code);
                        continue;
                    }
                };

                let mut country_added = 0;
                for item in items {
                    if collected >= budget || country_added >= share {
                        break;
                    }
                    if satisfied.contains(&item.progress_key()) {
                        continue;
                    }
                    let added = self
                        .collect_item(&item, &mut satisfied, rng, collected, budget)
                        .await?;
                    if let Some(is_synthetic) = added {
                        collected += 1;
                        country_added += 1;
                        if is_synthetic {
                            synthetic += 1;
                        }
                    }
                }
            }
        }

        // Done
        let total_persisted = self.store.count(source)?;
        let summary = RunSummary {
            source,
            items_collected_this_run: collected,
            synthetic_this_run: synthetic,
            total_persisted,
            target_total: self.run.target_total,
            runs_remaining: runs_remaining(
                total_persisted,
                self.run.target_total,
                self.run.per_run_cap,
            ),
        };
        info!("{summary}");
        Ok(summary)
    }

    /// Fewest existing rows first; the stable sort keeps configuration order on ties.
    fn entity_order(&self, by_country: &HashMap<String, usize>) -> Vec<&Country> {
        let mut order: Vec<&Country> = self.countries.iter().collect();
        order.sort_by_key(|c| by_country.get(&c.code).copied().unwrap_or(0));
        order
    }

    /// Fetches and stores one item, falling back to a synthetic placeholder
    /// when allowed. Returns `Some(is_synthetic)` when a row was inserted.
    async fn collect_item<R: Rng>(
        &self,
        item: &WorkItem,
        satisfied: &mut HashSet<ProgressKey>,
        rng: &mut R,
        collected: usize,
        budget: usize,
    ) -> Result<Option<bool>, CollectorError> {
        let fetched = match self.adapter.fetch_observation(item).await {
            Ok(Some(observation)) => Some(observation),
            Ok(None) => {
                info!("No data for {item}");
                None
            }
            Err(e) => {
                warn!("Fetching {item} failed: {e}");
                None
            }
        };

        let observation = match fetched {
            Some(observation) => observation,
            None if !self.run.allow_synthetic_fill => return Ok(None),
            None => match placeholder(item, &self.synthetic, rng) {
                Some(observation) => observation,
                None => {
                    warn!("No synthetic range configured for {item}; leaving it for a later run");
                    return Ok(None);
                }
            },
        };

        let outcome = self.store.store(&observation)?;
        satisfied.insert(observation.progress_key());
        match outcome {
            StoreOutcome::Inserted => {
                let is_synthetic = observation.is_synthetic();
                info!(
                    "[{}/{}] {}: {}{}",
                    collected + 1,
                    budget,
                    item,
                    observation.describe(),
                    if is_synthetic { " (synthetic)" } else { "" }
                );
                Ok(Some(is_synthetic))
            }
            StoreOutcome::DuplicateSkipped => {
                info!("{item} is already stored");
                Ok(None)
            }
        }
    }
}

/// Runs one collection pass for `source` with the adapter and limits from `config`.
pub async fn collect_source(
    config: &Config,
    store: &Store,
    source: DataSource,
) -> Result<RunSummary, CollectorError> {
    match source {
        DataSource::Weather => {
            let adapter = WeatherAdapter::from_config(&config.weather, &config.http)?;
            collect_with(store, &adapter, config, &config.weather.run, &config.weather.synthetic)
                .await
        }
        DataSource::AirQuality => {
            let adapter = AirQualityAdapter::from_config(&config.air_quality, &config.http)?;
            collect_with(
                store,
                &adapter,
                config,
                &config.air_quality.run,
                &config.air_quality.synthetic,
            )
            .await
        }
        DataSource::Economic => {
            let adapter = EconomicAdapter::from_config(&config.economic, &config.http)?;
            collect_with(
                store,
                &adapter,
                config,
                &config.economic.run,
                &config.economic.synthetic,
            )
            .await
        }
    }
}

async fn collect_with<A: SourceAdapter>(
    store: &Store,
    adapter: &A,
    config: &Config,
    run: &RunConfig,
    synthetic: &SyntheticConfig,
) -> Result<RunSummary, CollectorError> {
    Collector::builder()
        .store(store)
        .adapter(adapter)
        .countries(config.countries.clone())
        .run(run.clone())
        .synthetic(synthetic.clone())
        .build()
        .run()
        .await
}
