//! Pass classifier: labels records that need no index lookup.

use tracing::info;

use crate::address::normalize::is_homeless;
use crate::models::{ResolutionResult, ResolvedRecord, StatusCounts, VoterAddressRecord};

/// Initial resolution of a single record.
///
/// Confidential voters resolve to their precinct link and are never
/// searched. Non-confidential records matching a homeless rule become
/// `Homeless`. Everything else starts as `NotFound`.
pub fn classify_record(record: &VoterAddressRecord) -> ResolutionResult {
    if record.confidential {
        return ResolutionResult::confidential(&record.precinct_link);
    }
    if is_homeless(record) {
        return ResolutionResult::homeless();
    }
    ResolutionResult::not_found()
}

/// Reset every record's resolution and apply [`classify_record`].
pub fn classify_initial(records: Vec<VoterAddressRecord>) -> Vec<ResolvedRecord> {
    let resolved: Vec<ResolvedRecord> = records
        .into_iter()
        .map(|record| {
            let result = classify_record(&record);
            ResolvedRecord { record, result }
        })
        .collect();
    let counts = StatusCounts::tally(&resolved);
    info!(
        confidential = counts.confidential,
        homeless = counts.homeless,
        not_found = counts.not_found,
        "classified records before search"
    );
    resolved
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
