//! Ordered pass table and the iteration selector.

use std::fmt;

use crate::address::normalize::{exact_key, QueryBuilder};
use crate::errors::{VoteTrackError, VoteTrackResult};
use crate::models::VoterAddressRecord;
use crate::search::gateway::{IndexTarget, SearchQuery};

/// Iteration number of the pass classifier.
pub const CLASSIFIER_ITERATION: u8 = 1;

/// Highest iteration in [`SEARCH_PASSES`].
pub const LAST_ITERATION: u8 = 7;

/// One search pass: a query builder and the index targets it tries, in
/// order. Multi-step passes recompute the unresolved set between steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassDescriptor {
    pub iteration: u8,
    pub name: &'static str,
    pub builder: QueryBuilder,
    pub steps: &'static [IndexTarget],
}

impl PassDescriptor {
    /// Gateway request for `record` against `target`. The query mode
    /// follows from the builder.
    pub fn query(&self, target: IndexTarget, record: &VoterAddressRecord) -> SearchQuery {
        match self.builder.text(record) {
            Some(text) => SearchQuery::Fuzzy { target, text },
            None => SearchQuery::Exact {
                target,
                key: exact_key(record),
            },
        }
    }
}

/// Search passes in their fixed order. Later passes are strictly more
/// permissive fallbacks.
pub const SEARCH_PASSES: &[PassDescriptor] = &[
    PassDescriptor {
        iteration: 2,
        name: "address",
        builder: QueryBuilder::Address,
        steps: &[IndexTarget::Address],
    },
    PassDescriptor {
        iteration: 3,
        name: "unit",
        builder: QueryBuilder::Address,
        steps: &[IndexTarget::Unit],
    },
    PassDescriptor {
        iteration: 4,
        name: "unit+type",
        builder: QueryBuilder::AddressUnitType,
        steps: &[IndexTarget::Unit],
    },
    PassDescriptor {
        iteration: 5,
        name: "exact",
        builder: QueryBuilder::ExactFields,
        steps: &[IndexTarget::Address],
    },
    PassDescriptor {
        iteration: 6,
        name: "unit+type+suffix",
        builder: QueryBuilder::AddressUnitTypeSuffix,
        steps: &[IndexTarget::Address, IndexTarget::Unit],
    },
    PassDescriptor {
        iteration: LAST_ITERATION,
        name: "line2+zip",
        builder: QueryBuilder::SecondLineZip,
        steps: &[IndexTarget::Address, IndexTarget::Unit],
    },
];

pub fn pass_for(iteration: u8) -> Option<&'static PassDescriptor> {
    SEARCH_PASSES.iter().find(|p| p.iteration == iteration)
}

// ---------------------------------------------------------------------------
// Iteration selector
// ---------------------------------------------------------------------------

/// Which part of the pass sequence a resolver run executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterationSelector {
    /// Classifier followed by every search pass.
    All,
    /// Exactly one iteration, for restart or debugging.
    Only(u8),
}

impl IterationSelector {
    /// `0` selects every pass; `1..=7` selects a single iteration.
    pub fn from_iteration(iteration: u8) -> VoteTrackResult<Self> {
        match iteration {
            0 => Ok(Self::All),
            CLASSIFIER_ITERATION => Ok(Self::Only(CLASSIFIER_ITERATION)),
            n if pass_for(n).is_some() => Ok(Self::Only(n)),
            n => Err(VoteTrackError::UnknownPass(n)),
        }
    }
}

impl fmt::Display for IterationSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(n) => write!(f, "{n:02}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
