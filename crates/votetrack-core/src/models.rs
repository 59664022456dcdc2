//! Shared typed models used across resolution, diffing, and loading.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::{VoteTrackError, VoteTrackResult};

// ---------------------------------------------------------------------------
// 1. VoterAddressRecord
// ---------------------------------------------------------------------------

/// One cleaned voter row as handed over by the upstream extract stages.
///
/// Address fields are plain strings; a missing value is the empty string.
/// Columns the resolution pipeline does not interpret (names, birthdate,
/// election date, ...) travel in `attributes` so they survive into the
/// final projection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoterAddressRecord {
    pub state_voter_id: String,
    pub county: String,
    pub physical_address_1: String,
    pub physical_address_2: String,
    pub physical_house_number: String,
    pub physical_house_suffix: String,
    pub physical_street_pre_direction: String,
    pub physical_street_name: String,
    pub physical_street_suffix: String,
    pub physical_street_post_direction: String,
    pub physical_unit_type: String,
    pub physical_unit_number: String,
    pub physical_city: String,
    pub physical_state: String,
    pub physical_zip_code: String,
    pub confidential: bool,
    /// County-precinct-split key used when the address must not be geocoded.
    pub precinct_link: String,
    pub attributes: IndexMap<String, String>,
}

impl VoterAddressRecord {
    /// Look up a column by its final-column name. Typed fields win over
    /// `attributes`.
    pub fn field(&self, column: &str) -> Option<&str> {
        let value = match column {
            "state_voter_id" => &self.state_voter_id,
            "county" => &self.county,
            "physical_address_1" => &self.physical_address_1,
            "physical_address_2" => &self.physical_address_2,
            "physical_house_number" => &self.physical_house_number,
            "physical_house_suffix" => &self.physical_house_suffix,
            "physical_street_pre_direction" => &self.physical_street_pre_direction,
            "physical_street_name" => &self.physical_street_name,
            "physical_street_suffix" => &self.physical_street_suffix,
            "physical_street_post_direction" => &self.physical_street_post_direction,
            "physical_unit_type" => &self.physical_unit_type,
            "physical_unit_number" => &self.physical_unit_number,
            "physical_city" => &self.physical_city,
            "physical_state" => &self.physical_state,
            "physical_zip_code" => &self.physical_zip_code,
            "precinct_link" => &self.precinct_link,
            "confidential" => {
                return Some(if self.confidential { "Confidential" } else { "" });
            }
            other => return self.attributes.get(other).map(String::as_str),
        };
        Some(value.as_str())
    }
}

// ---------------------------------------------------------------------------
// 2. ResolutionStatus
// ---------------------------------------------------------------------------

/// Fixed result taxonomy of the address resolution engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResolutionStatus {
    #[serde(rename = "Confidential")]
    Confidential,
    #[serde(rename = "Homeless")]
    Homeless,
    #[serde(rename = "Success")]
    Success,
    #[serde(rename = "Too Many Results")]
    TooManyResults,
    #[serde(rename = "Not Found")]
    NotFound,
}

impl ResolutionStatus {
    pub const ALL: [ResolutionStatus; 5] = [
        Self::Confidential,
        Self::Homeless,
        Self::Success,
        Self::TooManyResults,
        Self::NotFound,
    ];

    /// Label stored in the `results` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confidential => "Confidential",
            Self::Homeless => "Homeless",
            Self::Success => "Success",
            Self::TooManyResults => "Too Many Results",
            Self::NotFound => "Not Found",
        }
    }
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// 3. PropertyMatch
// ---------------------------------------------------------------------------

/// Normalized property address and geocoordinates of a single index hit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyMatch {
    pub property_id: String,
    pub address_full: String,
    pub house_number: String,
    pub street_direction: String,
    pub street_name: String,
    pub street_suffix: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub zip4: String,
    pub carrier_route: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

// ---------------------------------------------------------------------------
// 4. ResolutionResult
// ---------------------------------------------------------------------------

/// Outcome of resolving one record. Always replaced as a whole.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub status: ResolutionStatus,
    /// Property identifier on `Success`, precinct link on `Confidential`.
    pub physical_id: Option<String>,
    pub property: Option<PropertyMatch>,
}

impl ResolutionResult {
    pub fn not_found() -> Self {
        Self {
            status: ResolutionStatus::NotFound,
            physical_id: None,
            property: None,
        }
    }

    pub fn too_many_results() -> Self {
        Self {
            status: ResolutionStatus::TooManyResults,
            physical_id: None,
            property: None,
        }
    }

    pub fn homeless() -> Self {
        Self {
            status: ResolutionStatus::Homeless,
            physical_id: None,
            property: None,
        }
    }

    pub fn confidential(precinct_link: &str) -> Self {
        Self {
            status: ResolutionStatus::Confidential,
            physical_id: Some(precinct_link.to_string()),
            property: None,
        }
    }

    pub fn success(property: PropertyMatch) -> Self {
        Self {
            status: ResolutionStatus::Success,
            physical_id: Some(property.property_id.clone()),
            property: Some(property),
        }
    }
}

impl Default for ResolutionResult {
    fn default() -> Self {
        Self::not_found()
    }
}

// ---------------------------------------------------------------------------
// 5. ResolvedRecord
// ---------------------------------------------------------------------------

/// A voter row paired with its current resolution.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRecord {
    pub record: VoterAddressRecord,
    pub result: ResolutionResult,
}

impl ResolvedRecord {
    pub fn new(record: VoterAddressRecord) -> Self {
        Self {
            record,
            result: ResolutionResult::not_found(),
        }
    }

    pub fn status(&self) -> ResolutionStatus {
        self.result.status
    }

    pub fn is_unresolved(&self) -> bool {
        self.result.status == ResolutionStatus::NotFound
    }
}

// ---------------------------------------------------------------------------
// 6. StatusCounts
// ---------------------------------------------------------------------------

/// Per-status tally, logged after every pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub confidential: usize,
    pub homeless: usize,
    pub success: usize,
    pub too_many_results: usize,
    pub not_found: usize,
}

impl StatusCounts {
    pub fn tally(records: &[ResolvedRecord]) -> Self {
        let mut counts = Self::default();
        for record in records {
            counts.add(record.status());
        }
        counts
    }

    pub fn add(&mut self, status: ResolutionStatus) {
        match status {
            ResolutionStatus::Confidential => self.confidential += 1,
            ResolutionStatus::Homeless => self.homeless += 1,
            ResolutionStatus::Success => self.success += 1,
            ResolutionStatus::TooManyResults => self.too_many_results += 1,
            ResolutionStatus::NotFound => self.not_found += 1,
        }
    }

    pub fn get(&self, status: ResolutionStatus) -> usize {
        match status {
            ResolutionStatus::Confidential => self.confidential,
            ResolutionStatus::Homeless => self.homeless,
            ResolutionStatus::Success => self.success,
            ResolutionStatus::TooManyResults => self.too_many_results,
            ResolutionStatus::NotFound => self.not_found,
        }
    }

    pub fn total(&self) -> usize {
        ResolutionStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

impl fmt::Display for StatusCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = ResolutionStatus::ALL
            .iter()
            .map(|s| format!("{}={}", s.as_str(), self.get(*s)))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

// ---------------------------------------------------------------------------
// 7. RecordBatch
// ---------------------------------------------------------------------------

/// One row of a [`RecordBatch`]; `None` is SQL `NULL`.
pub type Row = Vec<Option<String>>;

/// Row-major table of text cells with named columns. Used for projected
/// records, persisted snapshots, and diff results.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RecordBatch {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl RecordBatch {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Row>) -> VoteTrackResult<Self> {
        let mut batch = Self::new(columns);
        for row in rows {
            batch.push(row)?;
        }
        Ok(batch)
    }

    pub fn push(&mut self, row: Row) -> VoteTrackResult<()> {
        if row.len() != self.columns.len() {
            return Err(VoteTrackError::Schema(format!(
                "row has {} cells, batch has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at (`row`, `column`); `None` for a null cell or unknown column.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
