use thiserror::Error;

/// Fatal engine outcomes surfaced to the caller as a single message.
///
/// Recoverable conditions (unmatched allocations, schema mismatches) are not errors; they
/// travel as warnings next to a successful result.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no opportunities match the criteria ({fetched} fetched); try relaxing filters")]
    NoOpportunities { fetched: usize },

    #[error("advisory payload is malformed: {detail}")]
    MalformedAdvisoryPayload { detail: String },

    #[error("invalid request: {detail}")]
    InvalidRequest { detail: String },
}

impl EngineError {
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedAdvisoryPayload {
            detail: detail.into(),
        }
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::InvalidRequest {
            detail: detail.into(),
        }
    }

    /// Whether the failure is the caller's to fix (bad constraints) rather than ours.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NoOpportunities { .. } | Self::InvalidRequest { .. })
    }
}
