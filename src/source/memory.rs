use anyhow::Result;
use async_trait::async_trait;

use super::{TripQuery, TripSource};
use crate::trip::Trip;

/// Trips held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryTripSource {
    trips: Vec<Trip>,
}

impl MemoryTripSource {
    pub fn new(trips: Vec<Trip>) -> Self {
        Self { trips }
    }
}

#[async_trait]
impl TripSource for MemoryTripSource {
    async fn fetch_trips(&self, query: &TripQuery) -> Result<Vec<Trip>> {
        Ok(self
            .trips
            .iter()
            .filter(|t| query.matches(t))
            .cloned()
            .collect())
    }
}
