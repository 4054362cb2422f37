//! Episode recommendation and semantic dialogue search over a sitcom script
//! corpus.
//!
//! The crate reads two tables, episode metadata and per-line dialogue, and
//! offers two ways to find episodes:
//!
//! - [`recommend::Recommender`] ranks episodes by similarity to seed episodes
//!   over weighted composite feature vectors.
//! - [`semantic::SemanticQueryIndex`] ranks episodes by how well their dialogue
//!   matches a free-text query, after [`filters::EpisodeFilter`] narrows the
//!   candidates.
//!
//! [`service::EpisodeService`] ties both together with lazy model loading.

pub mod config;
pub mod dataset;
pub mod filters;
pub mod recommend;
pub mod semantic;
pub mod service;
pub mod speakers;

#[cfg(test)]
mod tests;
