//! Multi-pass address resolver.
//!
//! Each pass sees only rows whose status is still `NotFound`. Rows are
//! handed out as [`UnresolvedBatch`]es by a lazy iterator, so a pass cannot
//! reach resolved rows at all. Within a batch the gateway is queried in
//! parallel; results are written back only after every row in the batch
//! resolved, so a gateway error leaves the batch untouched.

use std::time::Instant;

use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::address::checkpoint::CheckpointStore;
use crate::address::classifier::classify_initial;
use crate::address::passes::{
    IterationSelector, PassDescriptor, CLASSIFIER_ITERATION, SEARCH_PASSES,
};
use crate::config::ResolverConfig;
use crate::errors::{VoteTrackError, VoteTrackResult};
use crate::models::{ResolutionResult, ResolvedRecord, StatusCounts, VoterAddressRecord};
use crate::search::gateway::{resolve_query, SearchGateway};

// ---------------------------------------------------------------------------
// Unresolved batches
// ---------------------------------------------------------------------------

/// Up to `batch_size` rows that were `NotFound` when the batch was taken.
pub struct UnresolvedBatch<'a> {
    rows: Vec<&'a mut ResolvedRecord>,
}

impl<'a> UnresolvedBatch<'a> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &VoterAddressRecord> + '_ {
        self.rows.iter().map(|row| &row.record)
    }

    /// Compute a replacement result for every row, then overwrite them all.
    /// Runs on `pool` when given, sequentially otherwise.
    pub fn resolve_on<F>(self, pool: Option<&ThreadPool>, resolve: F) -> VoteTrackResult<StatusCounts>
    where
        F: Fn(&VoterAddressRecord) -> VoteTrackResult<ResolutionResult> + Sync + Send,
    {
        let results: Vec<ResolutionResult> = match pool {
            Some(pool) => pool.install(|| {
                self.rows
                    .par_iter()
                    .map(|row| resolve(&row.record))
                    .collect::<VoteTrackResult<Vec<_>>>()
            })?,
            None => self
                .rows
                .iter()
                .map(|row| resolve(&row.record))
                .collect::<VoteTrackResult<Vec<_>>>()?,
        };

        let mut counts = StatusCounts::default();
        for (row, result) in self.rows.into_iter().zip(results) {
            counts.add(result.status);
            row.result = result;
        }
        Ok(counts)
    }
}

/// Lazy sequence of [`UnresolvedBatch`]es over a record slice.
pub struct UnresolvedBatches<'a> {
    rows: std::slice::IterMut<'a, ResolvedRecord>,
    batch_size: usize,
}

impl<'a> Iterator for UnresolvedBatches<'a> {
    type Item = UnresolvedBatch<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rows: Vec<&'a mut ResolvedRecord> = self
            .rows
            .by_ref()
            .filter(|row| row.is_unresolved())
            .take(self.batch_size)
            .collect();
        if rows.is_empty() {
            None
        } else {
            Some(UnresolvedBatch { rows })
        }
    }
}

pub fn unresolved_batches(records: &mut [ResolvedRecord], batch_size: usize) -> UnresolvedBatches<'_> {
    UnresolvedBatches {
        rows: records.iter_mut(),
        batch_size: batch_size.max(1),
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of one iteration.
#[derive(Clone, Debug, Serialize)]
pub struct PassReport {
    pub iteration: u8,
    pub name: &'static str,
    /// Rows that were `NotFound` when the pass started.
    pub attempted: usize,
    /// Rows the pass moved out of `NotFound`.
    pub resolved: usize,
    /// Status counts over the whole record set after the pass.
    pub counts: StatusCounts,
    pub elapsed_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ResolutionReport {
    pub selector: IterationSelector,
    pub records: Vec<ResolvedRecord>,
    pub passes: Vec<PassReport>,
    pub counts: StatusCounts,
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

pub struct MultiPassResolver<G> {
    gateway: G,
    passes: &'static [PassDescriptor],
    workers: usize,
    batch_size: usize,
    checkpoints: Option<CheckpointStore>,
}

impl<G: SearchGateway> MultiPassResolver<G> {
    pub fn new(gateway: G, config: &ResolverConfig) -> Self {
        Self {
            gateway,
            passes: SEARCH_PASSES,
            workers: config.workers,
            batch_size: config.batch_size.max(1),
            checkpoints: config
                .checkpoint_dir
                .as_ref()
                .map(|dir| CheckpointStore::new(dir, config.table_name.clone())),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn checkpoints(&self) -> Option<&CheckpointStore> {
        self.checkpoints.as_ref()
    }

    /// `0` workers lets rayon pick the thread count.
    fn build_pool(&self) -> Option<ThreadPool> {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!(error = %e, "worker pool unavailable, resolving sequentially");
                None
            }
        }
    }

    /// Run the iterations chosen by `selector`.
    ///
    /// `All` and `Only(1)` classify `input` first. A single search iteration
    /// `n` ignores `input` and continues from the checkpoint of iteration
    /// `n - 1`, which requires a checkpoint directory.
    pub fn run(
        &self,
        selector: IterationSelector,
        input: Vec<VoterAddressRecord>,
    ) -> VoteTrackResult<ResolutionReport> {
        info!(%selector, rows = input.len(), "resolver run started");
        let pool = self.build_pool();
        let mut passes = Vec::new();

        let records = match selector {
            IterationSelector::All => {
                let mut records = self.classify(input, &mut passes)?;
                for pass in self.passes {
                    passes.push(self.execute_pass(pass, &mut records, pool.as_ref())?);
                    self.write_checkpoint(pass.iteration, &records)?;
                }
                records
            }
            IterationSelector::Only(CLASSIFIER_ITERATION) => self.classify(input, &mut passes)?,
            IterationSelector::Only(n) => {
                let pass = self
                    .passes
                    .iter()
                    .find(|p| p.iteration == n)
                    .ok_or(VoteTrackError::UnknownPass(n))?;
                let store = self.checkpoints.as_ref().ok_or_else(|| {
                    VoteTrackError::Checkpoint(format!(
                        "iteration {n:02} needs a checkpoint directory"
                    ))
                })?;
                if !input.is_empty() {
                    warn!(
                        rows = input.len(),
                        "single-iteration run ignores supplied rows and reads the previous checkpoint"
                    );
                }
                let mut records = store.read(n - 1)?;
                passes.push(self.execute_pass(pass, &mut records, pool.as_ref())?);
                self.write_checkpoint(n, &records)?;
                records
            }
        };

        let counts = StatusCounts::tally(&records);
        info!(%selector, %counts, "resolver run finished");
        Ok(ResolutionReport {
            selector,
            records,
            passes,
            counts,
        })
    }

    /// Run one search pass over `records` in place.
    pub fn run_pass(
        &self,
        pass: &PassDescriptor,
        records: &mut [ResolvedRecord],
    ) -> VoteTrackResult<PassReport> {
        let pool = self.build_pool();
        self.execute_pass(pass, records, pool.as_ref())
    }

    fn classify(
        &self,
        input: Vec<VoterAddressRecord>,
        passes: &mut Vec<PassReport>,
    ) -> VoteTrackResult<Vec<ResolvedRecord>> {
        let started = Instant::now();
        let attempted = input.len();
        let records = classify_initial(input);
        let counts = StatusCounts::tally(&records);
        passes.push(PassReport {
            iteration: CLASSIFIER_ITERATION,
            name: "classifier",
            attempted,
            resolved: attempted - counts.not_found,
            counts,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        self.write_checkpoint(CLASSIFIER_ITERATION, &records)?;
        Ok(records)
    }

    fn execute_pass(
        &self,
        pass: &PassDescriptor,
        records: &mut [ResolvedRecord],
        pool: Option<&ThreadPool>,
    ) -> VoteTrackResult<PassReport> {
        let started = Instant::now();
        let attempted = records.iter().filter(|r| r.is_unresolved()).count();
        info!(iteration = pass.iteration, pass = pass.name, attempted, "pass started");

        for &target in pass.steps {
            for batch in unresolved_batches(records, self.batch_size) {
                let size = batch.len();
                let step = batch.resolve_on(pool, |record| {
                    resolve_query(&self.gateway, &pass.query(target, record))
                })?;
                debug!(
                    iteration = pass.iteration,
                    ?target,
                    rows = size,
                    success = step.success,
                    too_many = step.too_many_results,
                    "batch resolved"
                );
            }
        }

        let counts = StatusCounts::tally(records);
        let report = PassReport {
            iteration: pass.iteration,
            name: pass.name,
            attempted,
            resolved: attempted.saturating_sub(counts.not_found),
            counts,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            iteration = report.iteration,
            pass = report.name,
            attempted = report.attempted,
            resolved = report.resolved,
            counts = %report.counts,
            elapsed_ms = report.elapsed_ms,
            "pass finished"
        );
        Ok(report)
    }

    fn write_checkpoint(&self, iteration: u8, records: &[ResolvedRecord]) -> VoteTrackResult<()> {
        if let Some(store) = &self.checkpoints {
            store.write(iteration, records)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::passes::pass_for;
    use crate::models::{PropertyMatch, ResolutionStatus};
    use crate::search::gateway::SearchQuery;
    use crate::search::memory::InMemoryGateway;

    fn doc(id: &str, full: &str, house: &str, street: &str, zip: &str) -> PropertyMatch {
        PropertyMatch {
            property_id: id.into(),
            address_full: full.into(),
            house_number: house.into(),
            street_name: street.into(),
            street_suffix: "ST".into(),
            city: "SALEM".into(),
            state: "OR".into(),
            zip: zip.into(),
            ..Default::default()
        }
    }

    fn gateway() -> InMemoryGateway {
        InMemoryGateway::new(
            vec![
                doc("P12", "12 MAIN ST", "12", "MAIN", "97301"),
                doc("E1", "7 ELM ST", "7", "ELM", "97303"),
                doc("E2", "7 ELM ST", "7", "ELM", "97303"),
            ],
            vec![doc("U4", "40 OAK ST APT 4", "40", "OAK", "97302")],
        )
    }

    fn voter(id: &str, house: &str, street: &str, zip: &str) -> VoterAddressRecord {
        VoterAddressRecord {
            state_voter_id: id.into(),
            county: "MARION".into(),
            physical_house_number: house.into(),
            physical_street_name: street.into(),
            physical_zip_code: zip.into(),
            physical_address_2: format!("{house} {street} RD"),
            precinct_link: format!("MARION_{id}"),
            ..Default::default()
        }
    }

    fn batch() -> Vec<VoterAddressRecord> {
        let mut confidential = voter("A", "12", "MAIN", "97301");
        confidential.confidential = true;
        let mut homeless = voter("B", "", "", "");
        homeless.physical_address_1 = "BEHIND THE LIBRARY".into();
        homeless.physical_address_2.clear();
        let mut unit = voter("D", "40", "OAK", "97302");
        unit.physical_unit_type = "APT".into();
        unit.physical_unit_number = "4".into();
        vec![
            confidential,
            homeless,
            voter("C", "12", "MAIN", "97301"),
            unit,
            voter("E", "7", "ELM", "97303"),
            voter("F", "999", "NOWHERE", "97301"),
        ]
    }

    fn config() -> ResolverConfig {
        ResolverConfig {
            workers: 2,
            batch_size: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_unresolved_batches_skip_resolved_rows() {
        let mut records: Vec<ResolvedRecord> = (0..5)
            .map(|i| ResolvedRecord::new(voter(&i.to_string(), "1", "A", "1")))
            .collect();
        records[1].result = ResolutionResult::homeless();
        records[3].result = ResolutionResult::too_many_results();

        let sizes: Vec<usize> = unresolved_batches(&mut records, 2).map(|b| b.len()).collect();
        assert_eq!(sizes, vec![2, 1]);

        let ids: Vec<String> = unresolved_batches(&mut records, 10)
            .flat_map(|b| b.records().map(|r| r.state_voter_id.clone()).collect::<Vec<_>>())
            .collect();
        assert_eq!(ids, vec!["0", "2", "4"]);
    }

    #[test]
    fn test_full_run_statuses() {
        let gw = gateway();
        let resolver = MultiPassResolver::new(&gw, &config());
        let report = resolver.run(IterationSelector::All, batch()).unwrap();

        let statuses: Vec<ResolutionStatus> = report.records.iter().map(|r| r.status()).collect();
        assert_eq!(
            statuses,
            vec![
                ResolutionStatus::Confidential,
                ResolutionStatus::Homeless,
                ResolutionStatus::Success,
                ResolutionStatus::Success,
                ResolutionStatus::TooManyResults,
                ResolutionStatus::NotFound,
            ]
        );
        assert_eq!(report.records[0].result.physical_id.as_deref(), Some("MARION_A"));
        assert_eq!(report.records[2].result.physical_id.as_deref(), Some("P12"));
        assert_eq!(report.records[3].result.physical_id.as_deref(), Some("U4"));
        assert_eq!(report.counts.total(), 6);
    }

    #[test]
    fn test_not_found_is_non_increasing() {
        let gw = gateway();
        let resolver = MultiPassResolver::new(&gw, &config());
        let report = resolver.run(IterationSelector::All, batch()).unwrap();

        let iterations: Vec<u8> = report.passes.iter().map(|p| p.iteration).collect();
        assert_eq!(iterations, vec![1, 2, 3, 4, 5, 6, 7]);
        let not_found: Vec<usize> = report.passes.iter().map(|p| p.counts.not_found).collect();
        assert!(not_found.windows(2).all(|w| w[1] <= w[0]), "{not_found:?}");
        // C succeeds and E becomes ambiguous in pass 2; D resolves on the unit index.
        assert_eq!(report.passes[1].resolved, 2);
        assert_eq!(report.passes[2].resolved, 1);
    }

    #[test]
    fn test_resolved_rows_are_never_requeried() {
        let gw = gateway();
        let resolver = MultiPassResolver::new(&gw, &config());
        resolver.run(IterationSelector::All, batch()).unwrap();

        // Pass 2: C, D, E, F. Pass 3: D, F. Passes 4 and 5: F. Passes 6 and 7: F twice.
        assert_eq!(gw.request_count(), 12);
        let main_st = gw
            .received()
            .into_iter()
            .filter(|q| matches!(q, SearchQuery::Fuzzy { text, .. } if text == "12 MAIN 97301"))
            .count();
        assert_eq!(main_st, 1);
    }

    struct SelectiveGateway {
        inner: InMemoryGateway,
    }

    impl SearchGateway for SelectiveGateway {
        fn search(&self, query: &SearchQuery) -> VoteTrackResult<Vec<PropertyMatch>> {
            match query {
                SearchQuery::Fuzzy { text, .. } if text.starts_with("999") => {
                    Err(VoteTrackError::Gateway("read timed out".into()))
                }
                _ => self.inner.search(query),
            }
        }
    }

    #[test]
    fn test_gateway_error_aborts_pass_without_partial_writes() {
        let gw = SelectiveGateway { inner: gateway() };
        let resolver = MultiPassResolver::new(&gw, &config());
        let mut records = vec![
            ResolvedRecord::new(voter("C", "12", "MAIN", "97301")),
            ResolvedRecord::new(voter("F", "999", "NOWHERE", "97301")),
        ];
        let err = resolver
            .run_pass(pass_for(2).unwrap(), &mut records)
            .unwrap_err();
        assert!(matches!(err, VoteTrackError::Gateway(_)));
        assert!(records.iter().all(|r| r.is_unresolved()));

        let err = resolver.run(IterationSelector::All, batch()).unwrap_err();
        assert!(matches!(err, VoteTrackError::Gateway(_)));
    }

    #[test]
    fn test_single_iteration_restarts_from_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ResolverConfig {
            checkpoint_dir: Some(tmp.path().to_path_buf()),
            ..config()
        };

        let gw = gateway();
        let resolver = MultiPassResolver::new(&gw, &config);
        resolver.run(IterationSelector::All, batch()).unwrap();
        let store = resolver.checkpoints().unwrap();
        for iteration in 1..=7 {
            assert!(store.exists(iteration), "missing checkpoint {iteration}");
        }
        let expected = store.read(3).unwrap();

        let fresh = gateway();
        let restarted = MultiPassResolver::new(&fresh, &config)
            .run(IterationSelector::Only(3), Vec::new())
            .unwrap();
        assert_eq!(restarted.records, expected);
        assert_eq!(restarted.passes.len(), 1);
        assert_eq!(restarted.passes[0].attempted, 2);
        // Only D and F were unresolved after iteration 2.
        assert_eq!(fresh.request_count(), 2);
    }

    #[test]
    fn test_single_iteration_without_checkpoints_fails() {
        let gw = gateway();
        let resolver = MultiPassResolver::new(&gw, &config());
        let err = resolver.run(IterationSelector::Only(4), batch()).unwrap_err();
        assert!(matches!(err, VoteTrackError::Checkpoint(_)));
    }
}
