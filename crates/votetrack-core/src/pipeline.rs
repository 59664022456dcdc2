//! End-to-end run: classify, resolve, project, diff, and load.

use tracing::info;

use crate::address::passes::IterationSelector;
use crate::address::resolver::{MultiPassResolver, ResolutionReport};
use crate::config::PipelineConfig;
use crate::errors::VoteTrackResult;
use crate::load::loader::{IncrementalLoader, LoadReport, Partitioning};
use crate::load::projection::Projection;
use crate::models::VoterAddressRecord;
use crate::search::cache::{CacheStats, CachingGateway};
use crate::search::gateway::SearchGateway;
use crate::store::repository::PartitionRepository;

/// Voter identity within a state-wide file.
pub const DIFF_KEY_COLUMNS: &[&str] = &["state", "county", "state_voter_id"];

impl Partitioning {
    /// One partition per processing date, formatted `YYYY-MM-DD`.
    pub fn by_file_date(config: &PipelineConfig) -> Self {
        Self::Fixed(config.file_date.format("%Y-%m-%d").to_string())
    }
}

#[derive(Debug)]
pub struct PipelineReport {
    pub resolution: ResolutionReport,
    pub cache: CacheStats,
    pub load: LoadReport,
}

/// Run every pass over `records` and append the new rows to `repository`.
///
/// Rows carry the voter-file columns. A [`Partitioning::Column`] outside
/// that set (e.g. `election_date`) is projected from each record's
/// attributes and persisted alongside.
///
/// Gateway errors abort the run before anything is written. Store errors are
/// confined to the partition they hit and reported in
/// [`PipelineReport::load`].
pub fn run_pipeline<G, R>(
    config: &PipelineConfig,
    mut records: Vec<VoterAddressRecord>,
    gateway: G,
    repository: R,
    partitioning: &Partitioning,
) -> VoteTrackResult<PipelineReport>
where
    G: SearchGateway,
    R: PartitionRepository,
{
    config.validate()?;
    if let Some(sample) = config.sample {
        if sample < records.len() {
            info!(sample, rows = records.len(), "sampling input");
            records.truncate(sample);
        }
    }

    let gateway = CachingGateway::new(gateway, config.search.cache_entries);
    let resolver = MultiPassResolver::new(gateway, &config.resolver);
    let resolution = resolver.run(IterationSelector::All, records)?;
    let cache = resolver.gateway().stats();
    info!(hits = cache.hits, misses = cache.misses, "search cache");

    let projection = match partitioning {
        Partitioning::Column(column) => Projection::voterfile(config).with_column(column),
        Partitioning::Fixed(_) => Projection::voterfile(config),
    };
    let batch = projection.project_all(&resolution.records)?;

    let loader = IncrementalLoader::new(
        repository,
        DIFF_KEY_COLUMNS.iter().map(|c| c.to_string()).collect(),
        &config.loader,
    );
    let load = loader.load(batch, partitioning)?;

    info!(
        state = %config.state_code(),
        file_date = %config.file_date,
        resolved = %resolution.counts,
        committed = load.committed(),
        "pipeline finished"
    );
    Ok(PipelineReport {
        resolution,
        cache,
        load,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::errors::VoteTrackError;
    use crate::load::diff::diff;
    use crate::models::{
        PropertyMatch, RecordBatch, ResolutionResult, ResolutionStatus, ResolvedRecord,
    };
    use crate::search::memory::InMemoryGateway;
    use crate::store::database::Database;
    use crate::store::repository::LoadStatus;

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig {
            file_date: NaiveDate::from_ymd_opt(2024, 5, 21).unwrap(),
            ..Default::default()
        };
        config.resolver.workers = 2;
        config
    }

    fn gateway() -> InMemoryGateway {
        InMemoryGateway::new(
            vec![PropertyMatch {
                property_id: "P-B".into(),
                address_full: "12 MAIN ST".into(),
                house_number: "12".into(),
                street_name: "MAIN".into(),
                street_suffix: "ST".into(),
                city: "SALEM".into(),
                state: "OR".into(),
                zip: "97301".into(),
                ..Default::default()
            }],
            vec![],
        )
    }

    fn voter(id: &str, house: &str, street: &str) -> VoterAddressRecord {
        VoterAddressRecord {
            state_voter_id: id.into(),
            county: "MARION".into(),
            physical_address_2: format!("{house} {street} ST"),
            physical_house_number: house.into(),
            physical_street_name: street.into(),
            physical_street_suffix: "ST".into(),
            physical_city: "SALEM".into(),
            physical_state: "OR".into(),
            physical_zip_code: "97301".into(),
            precinct_link: format!("MARION_{id}"),
            ..Default::default()
        }
    }

    /// A confidential, B one hit, C no hits.
    fn records() -> Vec<VoterAddressRecord> {
        let mut a = voter("A", "12", "MAIN");
        a.confidential = true;
        vec![a, voter("B", "12", "MAIN"), voter("C", "77", "PINE")]
    }

    fn ids(batch: &RecordBatch) -> Vec<&str> {
        (0..batch.len())
            .map(|i| batch.value(i, "state_voter_id").unwrap())
            .collect()
    }

    #[test]
    fn test_scenario_statuses_and_diff() {
        let config = config();
        let gw = gateway();
        let resolver = MultiPassResolver::new(&gw, &config.resolver);
        let report = resolver.run(IterationSelector::All, records()).unwrap();
        let statuses: Vec<ResolutionStatus> = report.records.iter().map(|r| r.status()).collect();
        assert_eq!(
            statuses,
            vec![
                ResolutionStatus::Confidential,
                ResolutionStatus::Success,
                ResolutionStatus::NotFound,
            ]
        );

        let projection = Projection::voterfile(&config);
        let batch = projection.project_all(&report.records).unwrap();
        let snapshot = projection.project_all(&report.records[1..2]).unwrap();
        let keys: Vec<String> = DIFF_KEY_COLUMNS.iter().map(|c| c.to_string()).collect();
        let new_rows = diff(&batch, &snapshot, &keys).unwrap();
        assert_eq!(ids(&new_rows), vec!["A", "C"]);
    }

    #[test]
    fn test_pipeline_loads_only_new_rows_and_is_rerunnable() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::new(tmp.path().join("votetracker.db"), "voters").unwrap();
        db.init_schema().unwrap();
        let config = config();
        let partitioning = Partitioning::by_file_date(&config);
        assert_eq!(partitioning, Partitioning::Fixed("2024-05-21".into()));

        // B was persisted by an earlier run.
        let projection = Projection::voterfile(&config);
        let prior = ResolvedRecord {
            record: voter("B", "12", "MAIN"),
            result: ResolutionResult::success(PropertyMatch {
                property_id: "P-B".into(),
                ..Default::default()
            }),
        };
        let keys: Vec<String> = DIFF_KEY_COLUMNS.iter().map(|c| c.to_string()).collect();
        db.ensure_partition("2024-05-21", projection.columns(), &keys)
            .unwrap();
        db.append_chunk("2024-05-21", projection.columns(), &[projection.project(&prior)])
            .unwrap();

        let first = run_pipeline(&config, records(), gateway(), &db, &partitioning).unwrap();
        assert_eq!(first.resolution.counts.confidential, 1);
        let run = first.load.partition("2024-05-21").unwrap();
        assert_eq!((run.attempted, run.committed), (2, 2));
        assert_eq!(db.count_rows("voters_2024_05_21").unwrap(), 3);

        let second = run_pipeline(&config, records(), gateway(), &db, &partitioning).unwrap();
        assert_eq!(second.load.partitions[0].status, LoadStatus::UpToDate);
        assert_eq!(db.count_rows("voters_2024_05_21").unwrap(), 3);
    }

    #[test]
    fn test_pipeline_partitions_by_election_date_attribute() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::new(tmp.path().join("votetracker.db"), "voters").unwrap();
        db.init_schema().unwrap();
        let mut input = records();
        for (record, date) in input.iter_mut().zip(["2024-05-21", "2024-11-05", "2024-11-05"]) {
            record.attributes.insert("election_date".into(), date.into());
        }

        let partitioning = Partitioning::Column("election_date".into());
        let report = run_pipeline(&config(), input, gateway(), &db, &partitioning).unwrap();
        let runs: Vec<(&str, usize)> = report
            .load
            .partitions
            .iter()
            .map(|r| (r.partition_key.as_str(), r.committed))
            .collect();
        assert_eq!(runs, vec![("2024-05-21", 1), ("2024-11-05", 2)]);
        assert_eq!(db.count_rows("voters_2024_11_05").unwrap(), 2);
        assert!(db
            .table_columns("voters_2024_11_05")
            .unwrap()
            .iter()
            .any(|c| c == "election_date"));
    }

    #[test]
    fn test_sample_caps_input() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::new(tmp.path().join("votetracker.db"), "voters").unwrap();
        db.init_schema().unwrap();
        let config = PipelineConfig {
            sample: Some(2),
            ..config()
        };
        let report = run_pipeline(
            &config,
            records(),
            gateway(),
            &db,
            &Partitioning::by_file_date(&config),
        )
        .unwrap();
        assert_eq!(report.resolution.records.len(), 2);
        assert_eq!(report.load.committed(), 2);
    }

    #[test]
    fn test_invalid_config_is_rejected_before_work() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::new(tmp.path().join("votetracker.db"), "voters").unwrap();
        let mut config = config();
        config.loader.chunk_size = 0;
        let gw = gateway();
        let err = run_pipeline(&config, records(), &gw, &db, &Partitioning::Fixed("x".into()))
            .unwrap_err();
        assert!(matches!(err, VoteTrackError::Config(_)));
        assert_eq!(gw.request_count(), 0);
    }
}
