use crate::llm::Provider;
use serde_json::Value;
use std::fmt;

/// Transport or decode failure from the advisory service, with whatever the service sent.
#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "advisory error (provider={}, stage={}): {}",
            self.provider, self.stage, self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_provider_and_stage() {
        let err = LlmDiagnosticsError {
            provider: Provider::Gemini,
            stage: "http",
            detail: "status=429".to_string(),
            raw_output: Some("{}".to_string()),
            raw_response_json: None,
        };
        assert_eq!(
            err.to_string(),
            "advisory error (provider=gemini, stage=http): status=429"
        );

        let wrapped: anyhow::Error = err.into();
        let back = wrapped.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(back.raw_output.as_deref(), Some("{}"));
    }
}
