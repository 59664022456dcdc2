//! HTTPS search gateway backed by an Elasticsearch property index.

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::SearchConfig;
use crate::errors::{VoteTrackError, VoteTrackResult};
use crate::models::PropertyMatch;
use crate::search::gateway::{IndexTarget, SearchGateway, SearchQuery};

/// Document fields matched by the fuzzy query.
const ADDRESS_FIELDS: &str = "PropertyAddress*";

pub struct ElasticsearchGateway {
    client: Client,
    host: String,
    username: String,
    password: String,
    address_index: String,
    unit_index: String,
    collapse_field: String,
}

impl ElasticsearchGateway {
    pub fn new(config: &SearchConfig) -> VoteTrackResult<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_secs.max(1)));
        if let Some(path) = &config.ca_cert_path {
            let pem = std::fs::read(path)?;
            let cert = reqwest::Certificate::from_pem(&pem)?;
            builder = builder.add_root_certificate(cert);
        }
        Ok(Self {
            client: builder.build()?,
            host: config.host.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            address_index: config.address_index.clone(),
            unit_index: config.unit_index.clone(),
            collapse_field: config.collapse_field.clone(),
        })
    }

    fn index_name(&self, target: IndexTarget) -> &str {
        match target {
            IndexTarget::Address => &self.address_index,
            IndexTarget::Unit => &self.unit_index,
        }
    }

    /// Query DSL body for `query`.
    pub fn request_body(&self, query: &SearchQuery) -> Value {
        match query {
            SearchQuery::Fuzzy { text, .. } => json!({
                "query": {
                    "bool": {
                        "must": [{
                            "simple_query_string": {
                                "query": text,
                                "fields": [ADDRESS_FIELDS],
                                "default_operator": "AND",
                                "analyzer": "standard"
                            }
                        }]
                    }
                },
                "collapse": { "field": self.collapse_field }
            }),
            SearchQuery::Exact { key, .. } => json!({
                "query": {
                    "bool": {
                        "must": [
                            { "term": { "PropertyAddressHouseNumber.keyword": key.house_number } },
                            { "term": { "PropertyAddressStreetName.keyword": key.street_name } },
                            { "term": { "PropertyAddressZIP.keyword": key.zip } }
                        ]
                    }
                }
            }),
        }
    }
}

impl SearchGateway for ElasticsearchGateway {
    fn search(&self, query: &SearchQuery) -> VoteTrackResult<Vec<PropertyMatch>> {
        let (target, kind) = match query {
            SearchQuery::Fuzzy { target, .. } => (*target, "fuzzy"),
            SearchQuery::Exact { target, .. } => (*target, "exact"),
        };
        let index = self.index_name(target);
        let url = format!("{}/{}/_search", self.host, index);
        debug!(index, kind, "search request");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&self.request_body(query))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(VoteTrackError::Gateway(format!(
                "{url} returned {status}: {body}"
            )));
        }
        let payload: Value = response.json()?;
        parse_hits(&payload, &self.collapse_field)
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

fn text(source: &Value, key: &str) -> String {
    match source.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn coordinate(source: &Value, key: &str) -> Option<f64> {
    match source.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Map one `_source` document onto the normalized property fields.
pub fn property_from_source(source: &Value, id_field: &str) -> PropertyMatch {
    PropertyMatch {
        property_id: text(source, id_field),
        address_full: text(source, "PropertyAddressFull"),
        house_number: text(source, "PropertyAddressHouseNumber"),
        street_direction: text(source, "PropertyAddressStreetDirection"),
        street_name: text(source, "PropertyAddressStreetName"),
        street_suffix: text(source, "PropertyAddressStreetSuffix"),
        city: text(source, "PropertyAddressCity"),
        state: text(source, "PropertyAddressState"),
        zip: text(source, "PropertyAddressZIP"),
        zip4: text(source, "PropertyAddressZIP4"),
        carrier_route: text(source, "PropertyAddressCRRT"),
        latitude: coordinate(source, "PropertyLatitude"),
        longitude: coordinate(source, "PropertyLongitude"),
    }
}

/// Extract the (already collapsed) hit list from a search response.
pub fn parse_hits(payload: &Value, id_field: &str) -> VoteTrackResult<Vec<PropertyMatch>> {
    let hits = payload
        .get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(Value::as_array)
        .ok_or_else(|| VoteTrackError::Gateway("response has no hits.hits array".into()))?;

    Ok(hits
        .iter()
        .map(|hit| {
            let empty = Value::Null;
            let source = hit.get("_source").unwrap_or(&empty);
            let mut property = property_from_source(source, id_field);
            if property.property_id.is_empty() {
                property.property_id = text(hit, "_id");
            }
            property
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
