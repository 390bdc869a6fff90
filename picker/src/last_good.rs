//! The last-good store remembers the most recent number successfully picked
//! for each agency, so a later request can still be answered while the
//! upstream is failing.
//!
//! Entries are hints, not state anyone depends on: they are lost on restart,
//! and concurrent requests for the same agency may overwrite each other
//! (last writer wins).

use crate::selector::CanonicalPhone;
use crate::types::{AgencyKey, UpstreamMeta};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;

pub trait LastGoodStore: Send + Sync {
    fn get(&self, agency: AgencyKey) -> Option<LastGoodEntry>;
    /// Replaces any previous entry for `agency`.
    fn put(&self, agency: AgencyKey, entry: LastGoodEntry);
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LastGoodEntry {
    pub number: CanonicalPhone,
    pub meta: LastGoodMeta,
}

/// How a last-good number was obtained.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LastGoodMeta {
    pub agency_id: AgencyKey,
    pub source: &'static str,
    pub recorded_at: DateTime<Utc>,
    pub upstream: UpstreamMeta,
    pub list_len: usize,
    pub mode: String,
}

/// Process-local store. Nothing is ever evicted.
#[derive(Default)]
pub struct InMemoryLastGood {
    entries: RwLock<HashMap<AgencyKey, LastGoodEntry>>,
}

impl InMemoryLastGood {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl LastGoodStore for InMemoryLastGood {
    fn get(&self, agency: AgencyKey) -> Option<LastGoodEntry> {
        self.entries.read().get(&agency).cloned()
    }

    fn put(&self, agency: AgencyKey, entry: LastGoodEntry) {
        self.entries.write().insert(agency, entry);
    }
}
