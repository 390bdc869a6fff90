use serde::Serialize;
use serde_json::Value;

/// Tenant identifier scoping both the upstream contact pool and the last-good entry.
pub type AgencyKey = i64;

/// Field of the upstream body holding the candidate numbers.
pub const CANDIDATE_FIELD: &str = "whatsapp";

/// Body returned by the contact-list service. Only [`CANDIDATE_FIELD`] is read.
#[derive(Clone, Debug, PartialEq)]
pub struct ContactPayload(Value);

impl ContactPayload {
    pub fn new(body: Value) -> Self {
        ContactPayload(body)
    }

    /// Candidate entries in upstream order. Anything other than a JSON array reads as empty.
    pub fn candidates(&self) -> &[Value] {
        self.0
            .get(CANDIDATE_FIELD)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Diagnostics about the upstream call made while handling one request.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UpstreamMeta {
    pub attempts: u32,
    pub last_error: Option<String>,
    pub elapsed_ms: Option<u64>,
    pub http_status: Option<u16>,
}
