//! Metrics definitions for the picker.

use shared::metrics_defs::{MetricDef, MetricType};

pub const RESOLVED_UPSTREAM: MetricDef = MetricDef {
    name: "contact.resolved.upstream",
    metric_type: MetricType::Counter,
    description: "Requests answered with a number picked from the upstream list",
};

pub const RESOLVED_CACHE: MetricDef = MetricDef {
    name: "contact.resolved.cache",
    metric_type: MetricType::Counter,
    description: "Requests answered from the agency's last-good number",
};

pub const RESOLVED_FALLBACK: MetricDef = MetricDef {
    name: "contact.resolved.fallback",
    metric_type: MetricType::Counter,
    description: "Requests answered with the static support number",
};

pub const UNAVAILABLE: MetricDef = MetricDef {
    name: "contact.unavailable",
    metric_type: MetricType::Counter,
    description: "Requests for which no number could be returned",
};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "contact.request.duration",
    metric_type: MetricType::Histogram,
    description: "Time to resolve a contact request in milliseconds",
};

pub const UPSTREAM_ATTEMPT_FAILED: MetricDef = MetricDef {
    name: "upstream.attempt.failed",
    metric_type: MetricType::Counter,
    description: "Upstream attempts that timed out, errored or returned an unusable body",
};

pub const UPSTREAM_ATTEMPTS: MetricDef = MetricDef {
    name: "upstream.attempts",
    metric_type: MetricType::Histogram,
    description: "Upstream attempts made per request",
};

// Described at startup; a metric missing here is still emitted, just without a description.
pub const ALL_METRICS: &[MetricDef] = &[
    RESOLVED_UPSTREAM,
    RESOLVED_CACHE,
    RESOLVED_FALLBACK,
    UNAVAILABLE,
    REQUEST_DURATION,
    UPSTREAM_ATTEMPT_FAILED,
    UPSTREAM_ATTEMPTS,
];
