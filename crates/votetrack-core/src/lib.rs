//! votetrack core library: address resolution and incremental loading for
//! voter-registration files.
//!
//! Cleaned voter rows are classified ([`address::classifier`]), resolved
//! against a property index through a [`search::gateway::SearchGateway`]
//! in an ordered sequence of passes ([`address::resolver`]), projected to
//! the persisted columns, diffed against what a partition already holds
//! ([`load::diff`]), and appended chunk by chunk ([`load::loader`]).
//! [`pipeline::run_pipeline`] wires the stages together.
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod address;
pub mod config;
pub mod errors;
pub mod load;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod store;

pub use config::PipelineConfig;
pub use errors::{VoteTrackError, VoteTrackResult};
pub use pipeline::{run_pipeline, PipelineReport};
