use crate::config::Settings;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{json, prompt};
use crate::llm::{AdvisoryInput, LlmClient, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_TEMPERATURE: f32 = 0.7;

const TOP_P: f32 = 0.95;
const TOP_K: u32 = 40;
const RESPONSE_MIME_TYPE: &str = "application/json";
const FINISH_REASON_MAX_TOKENS: &str = "MAX_TOKENS";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_output_tokens: u32,
    temperature: f32,
}

impl GeminiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_gemini_api_key()?.to_string();
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_output_tokens = std::env::var("GEMINI_MAX_OUTPUT_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS);
        let temperature = std::env::var("GEMINI_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse::<f32>().ok())
            .unwrap_or(DEFAULT_TEMPERATURE);

        let timeout_secs = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_output_tokens,
            temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate_content(
        &self,
        req: &GenerateContentRequest,
    ) -> anyhow::Result<(serde_json::Value, GenerateContentResponse)> {
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", HeaderValue::from_str(&self.api_key)?);

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(req)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Gemini response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(LlmDiagnosticsError {
                provider: Provider::Gemini,
                stage: "http",
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        let raw_json = serde_json::from_str::<serde_json::Value>(&text)
            .with_context(|| format!("failed to parse Gemini response JSON: {text}"))?;
        let parsed = serde_json::from_value::<GenerateContentResponse>(raw_json.clone())
            .context("failed to decode Gemini response into GenerateContentResponse")?;
        Ok((raw_json, parsed))
    }

    fn request(&self, input: &AdvisoryInput, max_output_tokens: u32) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part {
                    text: prompt::system_prompt(),
                }],
            }),
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: prompt::user_prompt(input),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                top_p: TOP_P,
                top_k: TOP_K,
                max_output_tokens,
                response_mime_type: RESPONSE_MIME_TYPE,
            },
        }
    }

    fn response_text(res: &GenerateContentResponse) -> String {
        let mut out = String::new();
        let parts = res
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or_default();
        for part in parts {
            if let Some(text) = &part.text {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    fn finish_reason(res: &GenerateContentResponse) -> Option<&str> {
        res.candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
    }

    pub async fn generate_advice_with_raw(
        &self,
        input: &AdvisoryInput,
    ) -> anyhow::Result<(serde_json::Value, serde_json::Value)> {
        let (mut raw_json, mut res) = self
            .generate_content(&self.request(input, self.max_output_tokens))
            .await?;

        // If the model hit the output ceiling, retry once with a higher one.
        if Self::finish_reason(&res) == Some(FINISH_REASON_MAX_TOKENS) {
            let bumped = self.max_output_tokens.saturating_mul(2).max(8192);
            tracing::warn!(
                from = self.max_output_tokens,
                to = bumped,
                "Gemini finishReason=MAX_TOKENS; retrying once with higher maxOutputTokens"
            );
            let (rj, r) = self.generate_content(&self.request(input, bumped)).await?;
            raw_json = rj;
            res = r;
        }

        let text = Self::response_text(&res);
        if text.trim().is_empty() {
            return Err(LlmDiagnosticsError {
                provider: Provider::Gemini,
                stage: "empty_response",
                detail: format!(
                    "no text in response (finishReason={})",
                    Self::finish_reason(&res).unwrap_or("none")
                ),
                raw_output: None,
                raw_response_json: Some(raw_json),
            }
            .into());
        }

        match json::parse_payload(&text) {
            Ok(payload) => Ok((payload, raw_json)),
            Err(err) => {
                tracing::warn!(
                    model = %self.model,
                    error = %err,
                    "Gemini output is not a JSON object"
                );
                Err(anyhow::Error::new(err).context(LlmDiagnosticsError {
                    provider: Provider::Gemini,
                    stage: "parse",
                    detail: "response text is not a JSON object".to_string(),
                    raw_output: Some(text),
                    raw_response_json: Some(raw_json),
                }))
            }
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn generate_advice(&self, input: &AdvisoryInput) -> anyhow::Result<serde_json::Value> {
        tracing::info!(
            model = %self.model,
            amount_usd = input.amount_usd,
            risk = input.risk_tolerance.as_str(),
            opportunities = input.opportunities.len(),
            "requesting advisory payload"
        );
        let (payload, _raw) = self.generate_advice_with_raw(input).await?;
        Ok(payload)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joins_candidate_text_parts() {
        let res: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"summary\":"}, {"text": "\"x\"}"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"totalTokenCount": 10}
        }))
        .unwrap();

        assert_eq!(GeminiClient::finish_reason(&res), Some("STOP"));
        let text = GeminiClient::response_text(&res);
        assert_eq!(text, "{\"summary\":\n\"x\"}");
        assert_eq!(json::parse_payload(&text).unwrap(), json!({"summary": "x"}));
    }

    #[test]
    fn empty_candidates_yield_no_text() {
        let res: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(GeminiClient::response_text(&res), "");
        assert_eq!(GeminiClient::finish_reason(&res), None);
    }

    #[test]
    fn request_serializes_generation_config() {
        let req = GenerateContentRequest {
            system_instruction: None,
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: "hi".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.5,
                top_p: TOP_P,
                top_k: TOP_K,
                max_output_tokens: 4096,
                response_mime_type: RESPONSE_MIME_TYPE,
            },
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["generationConfig"]["maxOutputTokens"], json!(4096));
        assert_eq!(v["generationConfig"]["topK"], json!(40));
        assert_eq!(
            v["generationConfig"]["responseMimeType"],
            json!("application/json")
        );
        assert_eq!(v["contents"][0]["parts"][0]["text"], json!("hi"));
        assert!(v.get("systemInstruction").is_none());
    }
}
