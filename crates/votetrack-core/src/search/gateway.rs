//! Search gateway contract and the hit-count classification every pass
//! funnels through.

use std::sync::Arc;

use crate::address::normalize::ExactKey;
use crate::errors::VoteTrackResult;
use crate::models::{PropertyMatch, ResolutionResult};

/// Which property index a query targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexTarget {
    /// One document per property.
    Address,
    /// Apartment/unit level documents.
    Unit,
}

/// A single gateway request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SearchQuery {
    /// Free-text multi-field query, collapsed by property identifier.
    Fuzzy { target: IndexTarget, text: String },
    /// Conjunction of exact terms on house number, street name, and zip.
    Exact { target: IndexTarget, key: ExactKey },
}

impl SearchQuery {
    /// `false` when the query cannot possibly match (empty text or an
    /// incomplete exact key); such rows resolve to `NotFound` without a
    /// round trip.
    pub fn is_searchable(&self) -> bool {
        match self {
            Self::Fuzzy { text, .. } => !text.trim().is_empty(),
            Self::Exact { key, .. } => key.is_complete(),
        }
    }
}

/// Query/response service over the canonical property index.
///
/// Implementations must be deterministic for a fixed index snapshot and
/// safe to call from many worker threads at once. Transport or protocol
/// failures are returned as errors, never as an empty hit list.
pub trait SearchGateway: Send + Sync {
    fn search(&self, query: &SearchQuery) -> VoteTrackResult<Vec<PropertyMatch>>;
}

impl<G: SearchGateway + ?Sized> SearchGateway for &G {
    fn search(&self, query: &SearchQuery) -> VoteTrackResult<Vec<PropertyMatch>> {
        (**self).search(query)
    }
}

impl<G: SearchGateway + ?Sized> SearchGateway for Arc<G> {
    fn search(&self, query: &SearchQuery) -> VoteTrackResult<Vec<PropertyMatch>> {
        (**self).search(query)
    }
}

impl<G: SearchGateway + ?Sized> SearchGateway for Box<G> {
    fn search(&self, query: &SearchQuery) -> VoteTrackResult<Vec<PropertyMatch>> {
        (**self).search(query)
    }
}

/// Three-way classification of a raw hit list: one hit is a `Success`,
/// none is `NotFound`, anything more is `TooManyResults`.
pub fn classify_hits(mut hits: Vec<PropertyMatch>) -> ResolutionResult {
    match hits.len() {
        0 => ResolutionResult::not_found(),
        1 => match hits.pop() {
            Some(hit) => ResolutionResult::success(hit),
            None => ResolutionResult::not_found(),
        },
        _ => ResolutionResult::too_many_results(),
    }
}

/// Run `query` through `gateway` and classify the result.
pub fn resolve_query<G: SearchGateway + ?Sized>(
    gateway: &G,
    query: &SearchQuery,
) -> VoteTrackResult<ResolutionResult> {
    if !query.is_searchable() {
        return Ok(ResolutionResult::not_found());
    }
    Ok(classify_hits(gateway.search(query)?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
