//! Where trips come from.
//!
//! The pipeline only sees the [`TripSource`] trait; the warehouse export is
//! read through [`CsvTripSource`] and tests use [`MemoryTripSource`].

mod file;
mod memory;

pub use self::file::CsvTripSource;
pub use self::memory::MemoryTripSource;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::rules::RuleScope;
use crate::trip::Trip;

/// Filter pushed down to the source. `None` bounds are open.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Model filter in the same form rules use; empty means all models.
    pub models: Vec<String>,
}

impl TripQuery {
    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            models: Vec::new(),
        }
    }

    pub fn matches(&self, trip: &Trip) -> bool {
        let after = self.from.is_none_or(|from| trip.day >= from);
        let before = self.to.is_none_or(|to| trip.day <= to);
        let scope = RuleScope {
            models: self.models.clone(),
            ..RuleScope::default()
        };
        after && before && scope.matches_model(&trip.canonical_model())
    }
}

#[async_trait]
pub trait TripSource: Send + Sync {
    async fn fetch_trips(&self, query: &TripQuery) -> Result<Vec<Trip>>;
}
