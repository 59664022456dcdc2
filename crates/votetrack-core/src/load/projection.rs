//! Projection of resolved records onto the persisted column set.

use chrono::NaiveDate;

use crate::config::PipelineConfig;
use crate::errors::VoteTrackResult;
use crate::models::{RecordBatch, ResolutionStatus, ResolvedRecord, Row};

/// Persisted voter-file columns, in table order.
pub const FINAL_COLUMNS: &[&str] = &[
    "state_voter_id",
    "file_date",
    "state",
    "name_first",
    "name_last",
    "name_middle",
    "birthdate",
    "age",
    "party_affiliation",
    "registration_date",
    "voter_status",
    "confidential",
    "physical_id",
    "PropertyAddressFull",
    "PropertyAddressHouseNumber",
    "PropertyAddressStreetDirection",
    "PropertyAddressStreetName",
    "PropertyAddressStreetSuffix",
    "PropertyAddressCity",
    "PropertyAddressState",
    "PropertyAddressZIP",
    "PropertyAddressZIP4",
    "PropertyAddressCRRT",
    "PropertyLatitude",
    "PropertyLongitude",
    "precinct_link",
    "address_type",
    "results",
    "physical_address_1",
    "physical_address_2",
    "physical_city",
    "physical_state",
    "physical_zip_code",
    "physical_house_number",
    "physical_house_suffix",
    "physical_street_pre_direction",
    "physical_street_name",
    "physical_street_suffix",
    "physical_street_post_direction",
    "physical_unit_type",
    "physical_unit_number",
    "county",
    "precinct",
    "split",
    "mail_address_1",
    "mail_address_2",
    "mail_address_3",
    "mail_address_4",
    "mail_city",
    "mail_state",
    "mail_zip_code",
];

const HOMELESS: &str = "Homeless";
const NOT_FOUND_PREFIX: &str = "Not-Found-";

pub struct Projection {
    columns: Vec<String>,
    file_date: String,
    state: String,
}

impl Projection {
    pub fn new(columns: Vec<String>, file_date: NaiveDate, state: &str) -> Self {
        Self {
            columns,
            file_date: file_date.format("%Y-%m-%d").to_string(),
            state: state.to_lowercase(),
        }
    }

    /// [`FINAL_COLUMNS`] stamped with the configured file date and state.
    pub fn voterfile(config: &PipelineConfig) -> Self {
        Self::new(
            FINAL_COLUMNS.iter().map(|c| c.to_string()).collect(),
            config.file_date,
            &config.state,
        )
    }

    /// Append `column` unless already projected. Columns outside the fixed
    /// set are read from the record's pass-through attributes.
    pub fn with_column(mut self, column: &str) -> Self {
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn project(&self, resolved: &ResolvedRecord) -> Row {
        self.columns
            .iter()
            .map(|column| self.cell(resolved, column))
            .collect()
    }

    pub fn project_all(&self, records: &[ResolvedRecord]) -> VoteTrackResult<RecordBatch> {
        RecordBatch::with_rows(
            self.columns.clone(),
            records.iter().map(|r| self.project(r)).collect(),
        )
    }

    fn cell(&self, resolved: &ResolvedRecord, column: &str) -> Option<String> {
        let record = &resolved.record;
        let status = resolved.status();
        match column {
            "file_date" => Some(self.file_date.clone()),
            "state" => Some(self.state.clone()),
            "results" => Some(status.as_str().to_string()),
            "address_type" => Some(address_type(resolved).to_string()),
            "physical_id" => match status {
                ResolutionStatus::NotFound => Some(format!(
                    "{NOT_FOUND_PREFIX}{} {}",
                    record.physical_address_1, record.physical_address_2
                )),
                ResolutionStatus::Homeless => Some(HOMELESS.to_string()),
                _ => resolved.result.physical_id.clone(),
            },
            c if c.starts_with("Property") => property_cell(resolved, c),
            other => record.field(other).map(str::to_string),
        }
    }
}

fn address_type(resolved: &ResolvedRecord) -> &'static str {
    if resolved.status() == ResolutionStatus::Homeless {
        HOMELESS
    } else if !resolved.record.physical_unit_type.trim().is_empty() {
        "apartment"
    } else {
        "residential"
    }
}

/// Property columns: matched property on success, the voter's own address
/// when nothing was found, and a `Homeless` marker for homeless rows.
fn property_cell(resolved: &ResolvedRecord, column: &str) -> Option<String> {
    let record = &resolved.record;
    match resolved.status() {
        ResolutionStatus::Success => {
            let p = resolved.result.property.as_ref()?;
            let value = match column {
                "PropertyAddressFull" => &p.address_full,
                "PropertyAddressHouseNumber" => &p.house_number,
                "PropertyAddressStreetDirection" => &p.street_direction,
                "PropertyAddressStreetName" => &p.street_name,
                "PropertyAddressStreetSuffix" => &p.street_suffix,
                "PropertyAddressCity" => &p.city,
                "PropertyAddressState" => &p.state,
                "PropertyAddressZIP" => &p.zip,
                "PropertyAddressZIP4" => &p.zip4,
                "PropertyAddressCRRT" => &p.carrier_route,
                "PropertyLatitude" => return p.latitude.map(|v| v.to_string()),
                "PropertyLongitude" => return p.longitude.map(|v| v.to_string()),
                _ => return None,
            };
            Some(value.clone())
        }
        ResolutionStatus::NotFound => match column {
            "PropertyAddressFull" => Some(format!(
                "{} {}",
                record.physical_address_1, record.physical_address_2
            )),
            "PropertyAddressCity" => Some(record.physical_city.clone()),
            "PropertyAddressState" => Some(record.physical_state.clone()),
            "PropertyAddressZIP" => Some(record.physical_zip_code.clone()),
            _ => None,
        },
        ResolutionStatus::Homeless => match column {
            "PropertyAddressFull" | "PropertyAddressCity" | "PropertyAddressState"
            | "PropertyAddressZIP" => Some(HOMELESS.to_string()),
            _ => None,
        },
        ResolutionStatus::Confidential | ResolutionStatus::TooManyResults => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PropertyMatch, ResolutionResult, VoterAddressRecord};

    fn projection() -> Projection {
        Projection::new(
            FINAL_COLUMNS.iter().map(|c| c.to_string()).collect(),
            NaiveDate::from_ymd_opt(2024, 5, 21).unwrap(),
            "OREGON",
        )
    }

    fn resolved(result: ResolutionResult) -> ResolvedRecord {
        let mut record = VoterAddressRecord {
            state_voter_id: "100".into(),
            county: "MARION".into(),
            physical_address_1: "APT 4".into(),
            physical_address_2: "12 MAIN ST".into(),
            physical_city: "SALEM".into(),
            physical_state: "OR".into(),
            physical_zip_code: "97301".into(),
            physical_unit_type: "APT".into(),
            precinct_link: "MARION_101_A".into(),
            ..Default::default()
        };
        record.attributes.insert("name_first".into(), "ADA".into());
        ResolvedRecord { record, result }
    }

    fn cell<'a>(p: &Projection, row: &'a Row, column: &str) -> Option<&'a str> {
        let idx = p.columns().iter().position(|c| c == column).unwrap();
        row[idx].as_deref()
    }

    #[test]
    fn test_success_row_carries_property() {
        let p = projection();
        let row = p.project(&resolved(ResolutionResult::success(PropertyMatch {
            property_id: "P1".into(),
            address_full: "12 MAIN ST APT 4".into(),
            zip4: "1234".into(),
            latitude: Some(44.5),
            ..Default::default()
        })));
        assert_eq!(row.len(), FINAL_COLUMNS.len());
        assert_eq!(cell(&p, &row, "file_date"), Some("2024-05-21"));
        assert_eq!(cell(&p, &row, "state"), Some("oregon"));
        assert_eq!(cell(&p, &row, "physical_id"), Some("P1"));
        assert_eq!(cell(&p, &row, "PropertyAddressZIP4"), Some("1234"));
        assert_eq!(cell(&p, &row, "PropertyLatitude"), Some("44.5"));
        assert_eq!(cell(&p, &row, "PropertyLongitude"), None);
        assert_eq!(cell(&p, &row, "address_type"), Some("apartment"));
        assert_eq!(cell(&p, &row, "results"), Some("Success"));
        assert_eq!(cell(&p, &row, "name_first"), Some("ADA"));
        assert_eq!(cell(&p, &row, "mail_city"), None);
    }

    #[test]
    fn test_not_found_row_falls_back_to_voter_address() {
        let p = projection();
        let row = p.project(&resolved(ResolutionResult::not_found()));
        assert_eq!(cell(&p, &row, "physical_id"), Some("Not-Found-APT 4 12 MAIN ST"));
        assert_eq!(cell(&p, &row, "PropertyAddressFull"), Some("APT 4 12 MAIN ST"));
        assert_eq!(cell(&p, &row, "PropertyAddressCity"), Some("SALEM"));
        assert_eq!(cell(&p, &row, "PropertyAddressZIP"), Some("97301"));
        assert_eq!(cell(&p, &row, "PropertyAddressCRRT"), None);
        assert_eq!(cell(&p, &row, "results"), Some("Not Found"));
    }

    #[test]
    fn test_extra_column_comes_from_attributes() {
        let p = projection().with_column("election_date").with_column("state");
        assert_eq!(p.columns().len(), FINAL_COLUMNS.len() + 1);

        let mut r = resolved(ResolutionResult::not_found());
        r.record
            .attributes
            .insert("election_date".into(), "2024-11-05".into());
        let row = p.project(&r);
        assert_eq!(cell(&p, &row, "election_date"), Some("2024-11-05"));
        assert_eq!(cell(&p, &row, "state"), Some("oregon"));
    }

    #[test]
    fn test_homeless_and_confidential_rows() {
        let p = projection();
        let row = p.project(&resolved(ResolutionResult::homeless()));
        assert_eq!(cell(&p, &row, "physical_id"), Some("Homeless"));
        assert_eq!(cell(&p, &row, "PropertyAddressState"), Some("Homeless"));
        assert_eq!(cell(&p, &row, "address_type"), Some("Homeless"));

        let row = p.project(&resolved(ResolutionResult::confidential("MARION_101_A")));
        assert_eq!(cell(&p, &row, "physical_id"), Some("MARION_101_A"));
        assert_eq!(cell(&p, &row, "PropertyAddressFull"), None);
        assert_eq!(cell(&p, &row, "results"), Some("Confidential"));
    }
}
