use std::time::{Duration, Instant as StdInstant};

use async_trait::async_trait;
use market_data_provider::{MarketDataProvider, Operation, ProviderResult};
use pmcc_core::{AIAnalysis, ComponentScores, ProviderError, Recommendation};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const SUPPORTED: &[Operation] = &[Operation::AnalyzePmccOpportunity];

const SYSTEM_PROMPT: &str = r#"You are a options-trading risk analyst reviewing a single Poor Man's Covered Call (PMCC) candidate.

Respond with a single JSON object and nothing else, matching exactly this schema:
{
  "ai_score": number (0-100),
  "component_scores": {
    "risk": number (0-100),
    "strategy": number (0-100),
    "liquidity": number (0-100),
    "fundamental": number (0-100),
    "technical": number (0-100)
  },
  "recommendation": "strong_buy" | "buy" | "hold" | "avoid",
  "confidence": number (0-100),
  "reasoning": string,
  "key_strengths": [string],
  "key_risks": [string]
}

All five fields of component_scores, ai_score, recommendation, and confidence are required. Do not include any text before or after the JSON object."#;

/// Provider L: a single operation, `analyze_pmcc_opportunity`, backed by an
/// OpenAI-compatible chat completions endpoint. Responses are validated
/// strictly against the schema above; anything else is a parse failure, not
/// a retryable error.
pub struct LlmClient {
    provider_id: String,
    api_key: String,
    base_url: String,
    model_id: String,
    client: reqwest::Client,
    price_per_1k_prompt_usd: Decimal,
    price_per_1k_completion_usd: Decimal,
    max_tokens: u32,
    temperature: f64,
}

impl LlmClient {
    pub fn new(
        provider_id: impl Into<String>,
        api_key: String,
        base_url: String,
        model_id: String,
        price_per_1k_prompt_usd: Decimal,
        price_per_1k_completion_usd: Decimal,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            provider_id: provider_id.into(),
            api_key,
            base_url,
            model_id,
            client,
            price_per_1k_prompt_usd,
            price_per_1k_completion_usd,
            max_tokens: 800,
            temperature: 0.2,
        }
    }

    /// Rough pre-call cost estimate in USD, given an assumed dossier size.
    /// Used by the enrichment orchestrator to check the daily budget before
    /// dispatching; the true cost (from actual token usage) is recorded
    /// afterward on the `AIAnalysis` itself.
    pub fn estimate_cost_usd(&self, estimated_prompt_tokens: u64) -> Decimal {
        let prompt_cost = Decimal::from(estimated_prompt_tokens) * self.price_per_1k_prompt_usd
            / Decimal::from(1000);
        let completion_cost =
            Decimal::from(self.max_tokens as u64) * self.price_per_1k_completion_usd / Decimal::from(1000);
        prompt_cost + completion_cost
    }

    fn actual_cost_usd(&self, prompt_tokens: u32, completion_tokens: u32) -> Decimal {
        let prompt_cost = Decimal::from(prompt_tokens) * self.price_per_1k_prompt_usd / Decimal::from(1000);
        let completion_cost =
            Decimal::from(completion_tokens) * self.price_per_1k_completion_usd / Decimal::from(1000);
        prompt_cost + completion_cost
    }
}

#[async_trait]
impl MarketDataProvider for LlmClient {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn supported_ops(&self) -> &'static [Operation] {
        SUPPORTED
    }

    /// Credits for L are USD cents, distinct from the per-symbol/per-contract
    /// credit units the other providers use; `unit_count` is the estimated
    /// prompt token count.
    fn estimate_credits(&self, op: Operation, unit_count: u64) -> u64 {
        match op {
            Operation::AnalyzePmccOpportunity => {
                let usd = self.estimate_cost_usd(unit_count);
                (usd * Decimal::from(100)).round().to_u64().unwrap_or(0)
            }
            _ => 0,
        }
    }

    async fn health_probe(&self) -> ProviderResult<()> {
        let started = StdInstant::now();
        let url = format!("{}/models", self.base_url);
        let response = self.client.get(&url).bearer_auth(&self.api_key).send().await;
        let latency_ms = started.elapsed().as_millis() as u64;
        match response {
            Ok(r) if r.status().is_success() => ProviderResult::ok((), 0, latency_ms, false),
            Ok(r) => ProviderResult::err(
                ProviderError::UpstreamTransient {
                    provider_id: self.provider_id.clone(),
                    message: format!("HTTP {}", r.status()),
                },
                0,
                latency_ms,
            ),
            Err(e) => ProviderResult::err(
                ProviderError::UpstreamTransient {
                    provider_id: self.provider_id.clone(),
                    message: e.to_string(),
                },
                0,
                latency_ms,
            ),
        }
    }

    async fn analyze_pmcc_opportunity(&self, dossier: &serde_json::Value) -> ProviderResult<AIAnalysis> {
        let started = StdInstant::now();
        let symbol = dossier
            .get("symbol")
            .and_then(|v| v.as_str())
            .unwrap_or("UNKNOWN")
            .to_string();

        let request = ChatCompletionRequest {
            model: self.model_id.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: dossier.to_string(),
                },
            ],
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            response_format: Some(ResponseFormat {
                kind: "json_object".to_string(),
            }),
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = match self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                return ProviderResult::err(
                    ProviderError::UpstreamTransient {
                        provider_id: self.provider_id.clone(),
                        message: e.to_string(),
                    },
                    0,
                    started.elapsed().as_millis() as u64,
                )
            }
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let code = status.as_u16();
            let err = if code == 429 {
                ProviderError::RateLimited {
                    provider_id: self.provider_id.clone(),
                    retry_after_secs: None,
                }
            } else if code == 401 || code == 403 {
                ProviderError::AuthError {
                    provider_id: self.provider_id.clone(),
                    message: body,
                }
            } else if code == 408 || (500..600).contains(&code) {
                ProviderError::UpstreamTransient {
                    provider_id: self.provider_id.clone(),
                    message: format!("HTTP {code}: {body}"),
                }
            } else {
                ProviderError::UpstreamClientError {
                    provider_id: self.provider_id.clone(),
                    message: format!("HTTP {code}: {body}"),
                }
            };
            return ProviderResult::err(err, 0, latency_ms);
        }

        let parsed: ChatCompletionResponse = match serde_json::from_str(&body) {
            Ok(p) => p,
            Err(e) => {
                return ProviderResult::err(
                    ProviderError::ParseError {
                        provider_id: self.provider_id.clone(),
                        message: format!("malformed chat completion envelope: {e}"),
                    },
                    0,
                    latency_ms,
                )
            }
        };

        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.as_ref())
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let prompt_tokens = parsed.usage.as_ref().and_then(|u| u.prompt_tokens).unwrap_or(0);
        let completion_tokens = parsed.usage.as_ref().and_then(|u| u.completion_tokens).unwrap_or(0);

        let analysis = match parse_and_validate(&content, &symbol, self.model_id.clone(), prompt_tokens, completion_tokens) {
            Ok(mut a) => {
                a.cost_estimate = self.actual_cost_usd(prompt_tokens, completion_tokens);
                a
            }
            Err(message) => {
                return ProviderResult::err(
                    ProviderError::ParseError {
                        provider_id: self.provider_id.clone(),
                        message,
                    },
                    0,
                    latency_ms,
                )
            }
        };

        let credits = (analysis.cost_estimate * Decimal::from(100))
            .round()
            .to_u64()
            .unwrap_or(0);

        ProviderResult::ok(analysis, credits, latency_ms, false)
    }
}

/// Strict schema validation: every required field of `AIAnalysis` must be
/// present and of the right shape, or this is a parse failure, not a
/// best-effort partial result.
fn parse_and_validate(
    content: &str,
    symbol: &str,
    model_id: String,
    prompt_tokens: u32,
    completion_tokens: u32,
) -> Result<AIAnalysis, String> {
    let value: serde_json::Value =
        serde_json::from_str(content.trim()).map_err(|e| format!("response is not valid JSON: {e}"))?;

    let ai_score = value
        .get("ai_score")
        .and_then(|v| v.as_f64())
        .ok_or("missing required field ai_score")?;
    let confidence = value
        .get("confidence")
        .and_then(|v| v.as_f64())
        .ok_or("missing required field confidence")?;
    let recommendation_str = value
        .get("recommendation")
        .and_then(|v| v.as_str())
        .ok_or("missing required field recommendation")?;
    let recommendation = match recommendation_str {
        "strong_buy" => Recommendation::StrongBuy,
        "buy" => Recommendation::Buy,
        "hold" => Recommendation::Hold,
        "avoid" => Recommendation::Avoid,
        other => return Err(format!("unrecognized recommendation value: {other}")),
    };

    let component_scores_value = value
        .get("component_scores")
        .ok_or("missing required field component_scores")?;
    let component_scores = ComponentScores {
        risk: component_field(component_scores_value, "risk")?,
        strategy: component_field(component_scores_value, "strategy")?,
        liquidity: component_field(component_scores_value, "liquidity")?,
        fundamental: component_field(component_scores_value, "fundamental")?,
        technical: component_field(component_scores_value, "technical")?,
    };

    let reasoning = value
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let key_strengths = string_array(value.get("key_strengths"));
    let key_risks = string_array(value.get("key_risks"));

    Ok(AIAnalysis {
        symbol: pmcc_core::Symbol::new(symbol),
        ai_score: Decimal::from_f64_retain(ai_score).unwrap_or_default(),
        component_scores,
        recommendation,
        confidence: Decimal::from_f64_retain(confidence).unwrap_or_default(),
        reasoning,
        key_strengths,
        key_risks,
        model_id,
        prompt_tokens,
        completion_tokens,
        cost_estimate: Decimal::ZERO,
        completed_at: chrono::Utc::now(),
    })
}

fn component_field(value: &serde_json::Value, key: &str) -> Result<Decimal, String> {
    value
        .get(key)
        .and_then(|v| v.as_f64())
        .and_then(Decimal::from_f64_retain)
        .ok_or_else(|| format!("missing or invalid component_scores.{key}"))
}

fn string_array(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageOut>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMessageOut {
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_response_missing_component_scores() {
        let raw = r#"{"ai_score": 80, "confidence": 70, "recommendation": "buy"}"#;
        let result = parse_and_validate(raw, "AAPL", "test-model".to_string(), 10, 10);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_unrecognized_recommendation() {
        let raw = r#"{"ai_score": 80, "confidence": 70, "recommendation": "maybe",
            "component_scores": {"risk":1,"strategy":1,"liquidity":1,"fundamental":1,"technical":1}}"#;
        let result = parse_and_validate(raw, "AAPL", "test-model".to_string(), 10, 10);
        assert!(result.is_err());
    }

    #[test]
    fn accepts_well_formed_response() {
        let raw = r#"{
            "ai_score": 82.5,
            "confidence": 71.0,
            "recommendation": "buy",
            "component_scores": {"risk":70,"strategy":80,"liquidity":90,"fundamental":75,"technical":65},
            "reasoning": "solid setup",
            "key_strengths": ["liquid chain"],
            "key_risks": ["earnings in window"]
        }"#;
        let result = parse_and_validate(raw, "AAPL", "test-model".to_string(), 120, 80).unwrap();
        assert_eq!(result.recommendation, Recommendation::Buy);
        assert_eq!(result.key_strengths.len(), 1);
    }
}
