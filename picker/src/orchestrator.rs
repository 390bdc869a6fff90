use crate::config::{Config, ValidationError};
use crate::last_good::{LastGoodEntry, LastGoodMeta, LastGoodStore};
use crate::metrics_defs::{
    REQUEST_DURATION, RESOLVED_CACHE, RESOLVED_FALLBACK, RESOLVED_UPSTREAM, UNAVAILABLE,
    UPSTREAM_ATTEMPTS,
};
use crate::selector::{CanonicalPhone, Selection, SelectionError, select};
use crate::types::{AgencyKey, UpstreamMeta};
use crate::upstream::{FetchFailure, UpstreamClient};
use chrono::Utc;
use http::StatusCode;
use serde::Serialize;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;

const CACHE_NAME: &str = "LastGoodCache";
const FALLBACK_NAME: &str = "SupportFallback";
const NO_NUMBER_AVAILABLE: &str = "NO_NUMBER_AVAILABLE";
const WEIGHT: u32 = 1;

/// Anything that stops the upstream tier from producing a number.
#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("agency must be an integer, got {0:?}")]
    InvalidAgency(String),
    #[error(transparent)]
    Upstream(#[from] FetchFailure),
    #[error(transparent)]
    Selection(#[from] SelectionError),
}

#[derive(Debug, PartialEq, Serialize)]
pub struct UpstreamContact {
    pub number: CanonicalPhone,
    pub name: String,
    pub weight: u32,
    pub mode: String,
    pub agency_id: AgencyKey,
    pub chosen_from: &'static str,
    pub ms: u64,
    pub upstream: UpstreamMeta,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct CachedContact {
    pub number: CanonicalPhone,
    pub name: &'static str,
    pub weight: u32,
    pub mode: String,
    pub agency_id: AgencyKey,
    pub cache: bool,
    pub last_good_meta: LastGoodMeta,
    pub error: String,
    pub ms: u64,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct FallbackContact {
    pub number: CanonicalPhone,
    pub name: &'static str,
    pub weight: u32,
    pub mode: String,
    /// `None` when the requested agency could not be read.
    pub agency_id: Option<AgencyKey>,
    pub fallback: bool,
    pub error: String,
    pub ms: u64,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct Unavailable {
    pub error: &'static str,
    pub mode: String,
    pub agency_id: Option<AgencyKey>,
    pub details: String,
    pub ms: u64,
}

/// Outcome of one request. Exactly one tier of the cascade answers.
#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resolution {
    Upstream(UpstreamContact),
    Cache(CachedContact),
    Fallback(FallbackContact),
    Unavailable(Unavailable),
}

impl Resolution {
    /// Degraded answers are still 200 so clients always get a usable number.
    pub fn status(&self) -> StatusCode {
        match self {
            Resolution::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::OK,
        }
    }
}

struct PickerInner {
    upstream: UpstreamClient,
    store: Arc<dyn LastGoodStore>,
    brand_name: String,
    support_phone: Option<CanonicalPhone>,
}

/// Resolves a contact for an agency by walking the cascade:
/// upstream, then the agency's last-good number, then the support number.
#[derive(Clone)]
pub struct Picker {
    inner: Arc<PickerInner>,
}

impl Picker {
    pub fn new(config: &Config, store: Arc<dyn LastGoodStore>) -> Result<Self, ValidationError> {
        Ok(Picker {
            inner: Arc::new(PickerInner {
                upstream: UpstreamClient::new(&config.upstream),
                store,
                brand_name: config.brand_name.clone(),
                support_phone: config.support_phone()?,
            }),
        })
    }

    pub async fn handle(&self, agency: AgencyKey, mode: String) -> Resolution {
        let started = Instant::now();

        // Captured before the upstream call so a failure can only ever fall
        // back to what was known before this request.
        let last_good = self.inner.store.get(agency);

        let resolution = match self.pick_from_upstream(agency, &mode).await {
            Ok((selection, upstream)) => {
                self.inner.store.put(
                    agency,
                    LastGoodEntry {
                        number: selection.phone.clone(),
                        meta: LastGoodMeta {
                            agency_id: agency,
                            source: selection.chosen_from,
                            recorded_at: Utc::now(),
                            upstream: upstream.clone(),
                            list_len: selection.list_len,
                            mode: mode.clone(),
                        },
                    },
                );

                tracing::debug!(agency, number = %selection.phone, "picked number from upstream");
                counter!(RESOLVED_UPSTREAM).increment(1);

                Resolution::Upstream(UpstreamContact {
                    number: selection.phone,
                    name: self.inner.brand_name.clone(),
                    weight: WEIGHT,
                    mode,
                    agency_id: agency,
                    chosen_from: selection.chosen_from,
                    ms: elapsed_ms(started),
                    upstream,
                })
            }
            Err(err) => self.degrade(Some(agency), mode, last_good, err, started),
        };

        histogram!(REQUEST_DURATION).record(elapsed_ms(started) as f64);
        resolution
    }

    /// Answers a request whose agency could not be read. No upstream call is
    /// made and there is no last-good entry to serve, so only the support
    /// tier can still produce a number.
    pub fn handle_unresolved(&self, err: ResolveError, mode: String) -> Resolution {
        let started = Instant::now();
        let resolution = self.degrade(None, mode, None, err, started);

        histogram!(REQUEST_DURATION).record(elapsed_ms(started) as f64);
        resolution
    }

    async fn pick_from_upstream(
        &self,
        agency: AgencyKey,
        mode: &str,
    ) -> Result<(Selection, UpstreamMeta), ResolveError> {
        let fetched = self.inner.upstream.fetch(agency).await.inspect_err(|failure| {
            histogram!(UPSTREAM_ATTEMPTS).record(failure.meta.attempts as f64);
        })?;
        histogram!(UPSTREAM_ATTEMPTS).record(fetched.meta.attempts as f64);

        let selection = select(&fetched.payload).inspect_err(|err| {
            tracing::debug!(agency, mode, "unusable upstream payload: {err}");
        })?;

        Ok((selection, fetched.meta))
    }

    fn degrade(
        &self,
        agency: Option<AgencyKey>,
        mode: String,
        last_good: Option<LastGoodEntry>,
        err: ResolveError,
        started: Instant,
    ) -> Resolution {
        let error = err.to_string();

        // Entries hold a `CanonicalPhone`, so they are always long enough to serve.
        if let (Some(agency), Some(entry)) = (agency, last_good) {
            tracing::warn!(agency, %error, "serving last-good number");
            counter!(RESOLVED_CACHE).increment(1);

            return Resolution::Cache(CachedContact {
                number: entry.number,
                name: CACHE_NAME,
                weight: WEIGHT,
                mode,
                agency_id: agency,
                cache: true,
                last_good_meta: entry.meta,
                error,
                ms: elapsed_ms(started),
            });
        }

        if let Some(number) = &self.inner.support_phone {
            tracing::warn!(?agency, %error, "serving support fallback number");
            counter!(RESOLVED_FALLBACK).increment(1);

            return Resolution::Fallback(FallbackContact {
                number: number.clone(),
                name: FALLBACK_NAME,
                weight: WEIGHT,
                mode,
                agency_id: agency,
                fallback: true,
                error,
                ms: elapsed_ms(started),
            });
        }

        tracing::error!(?agency, %error, "no number available");
        counter!(UNAVAILABLE).increment(1);

        Resolution::Unavailable(Unavailable {
            error: NO_NUMBER_AVAILABLE,
            mode,
            agency_id: agency,
            details: error,
            ms: elapsed_ms(started),
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
