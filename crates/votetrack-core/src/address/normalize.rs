//! Address normalization, query-string builders, and the homeless rule table.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::VoterAddressRecord;

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Trim and collapse internal runs of whitespace to a single space.
pub fn clean(value: &str) -> String {
    WHITESPACE_RE.replace_all(value.trim(), " ").into_owned()
}

/// Join the non-empty cleaned parts with single spaces.
pub fn join_parts(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| clean(p))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Query builders
// ---------------------------------------------------------------------------

/// How a pass turns a record into gateway input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryBuilder {
    /// House number, pre-direction, street name, zip, unit number.
    Address,
    /// [`QueryBuilder::Address`] followed by the unit type.
    AddressUnitType,
    /// [`QueryBuilder::AddressUnitType`] followed by the street suffix.
    AddressUnitTypeSuffix,
    /// Second physical address line followed by the zip code.
    SecondLineZip,
    /// House number, street name, and zip as separate exact terms.
    ExactFields,
}

/// Exact-term key of a record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExactKey {
    pub house_number: String,
    pub street_name: String,
    pub zip: String,
}

impl ExactKey {
    pub fn is_complete(&self) -> bool {
        !self.house_number.is_empty() && !self.street_name.is_empty() && !self.zip.is_empty()
    }
}

pub fn address_query(record: &VoterAddressRecord) -> String {
    join_parts(&[
        &record.physical_house_number,
        &record.physical_street_pre_direction,
        &record.physical_street_name,
        &record.physical_zip_code,
        &record.physical_unit_number,
    ])
}

pub fn address_unit_type_query(record: &VoterAddressRecord) -> String {
    join_parts(&[&address_query(record), &record.physical_unit_type])
}

pub fn address_unit_type_suffix_query(record: &VoterAddressRecord) -> String {
    join_parts(&[
        &address_unit_type_query(record),
        &record.physical_street_suffix,
    ])
}

pub fn second_line_zip_query(record: &VoterAddressRecord) -> String {
    join_parts(&[&record.physical_address_2, &record.physical_zip_code])
}

pub fn exact_key(record: &VoterAddressRecord) -> ExactKey {
    ExactKey {
        house_number: clean(&record.physical_house_number),
        street_name: clean(&record.physical_street_name),
        zip: clean(&record.physical_zip_code),
    }
}

impl QueryBuilder {
    /// Free-text query for the fuzzy builders; `None` for [`QueryBuilder::ExactFields`].
    pub fn text(self, record: &VoterAddressRecord) -> Option<String> {
        match self {
            Self::Address => Some(address_query(record)),
            Self::AddressUnitType => Some(address_unit_type_query(record)),
            Self::AddressUnitTypeSuffix => Some(address_unit_type_suffix_query(record)),
            Self::SecondLineZip => Some(second_line_zip_query(record)),
            Self::ExactFields => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Homeless rules
// ---------------------------------------------------------------------------

/// A single case-insensitive test against a physical address line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HomelessRule {
    StartsWith(&'static str),
    Contains(&'static str),
}

impl HomelessRule {
    /// `line_upper` must already be upper-cased.
    fn matches(self, line_upper: &str) -> bool {
        match self {
            Self::StartsWith(prefix) => line_upper.starts_with(prefix),
            Self::Contains(needle) => line_upper.contains(needle),
        }
    }
}

/// Rules applied to both physical address lines. Patterns are upper case.
pub const HOMELESS_RULES: &[HomelessRule] = &[
    HomelessRule::StartsWith("00"),
    HomelessRule::Contains("@"),
    HomelessRule::Contains("PARKING "),
    HomelessRule::Contains("LOT "),
    HomelessRule::Contains("AROUND "),
    HomelessRule::Contains(" & "),
    HomelessRule::Contains("SAFE CAMP"),
    HomelessRule::Contains("CORNER OF "),
    HomelessRule::Contains("BETWEEN "),
    HomelessRule::StartsWith("NEAR "),
    HomelessRule::StartsWith("0 "),
    HomelessRule::StartsWith("HOSELESS "),
    HomelessRule::StartsWith("HOMELESS "),
    HomelessRule::StartsWith("BEHIND "),
];

/// Extra rule applied to the second address line only.
pub const SECOND_LINE_CONJUNCTION: &str = " AND ";

pub fn is_homeless(record: &VoterAddressRecord) -> bool {
    let line_1 = record.physical_address_1.trim().to_uppercase();
    let line_2 = record.physical_address_2.trim().to_uppercase();
    let by_rule = [&line_1, &line_2]
        .iter()
        .filter(|line| !line.is_empty())
        .any(|line| HOMELESS_RULES.iter().any(|rule| rule.matches(line)));
    by_rule || line_2.contains(SECOND_LINE_CONJUNCTION)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
