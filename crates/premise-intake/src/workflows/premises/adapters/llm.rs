//! Chat-completions backed scoring and classification.
//!
//! Scoring and classification each own a separate [`ChatClient`]; one endpoint
//! failing or throttling does not consume the other's retry budget.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::trace;

use super::taxonomy::{OccupancyCategory, OccupancyTaxonomy};
use super::AdapterError;
use crate::workflows::premises::domain::{OccupancyResult, PremiseAttributes};
use crate::workflows::premises::services::{
    ClassificationFailure, OccupancyClassifier, ScoringFailure, SimilarityScorer,
};

const SCORING_SYSTEM_PROMPT: &str = "You compare a new premises record against an existing \
record at the same or a nearby location and judge whether they are the SAME BUSINESS. \
The business name is the primary factor. 10 means exact or trivially different names \
(capitalization, punctuation, Inc vs LLC); 8-9 clearly the same business with minor \
variations; 6-7 the same brand with a branch or location suffix; 4-5 probably different; \
1-3 different businesses. Respond with ONLY a single number from 1 to 10.";

const CLASSIFICATION_SYSTEM_PROMPT: &str = "You classify premises into occupancy categories \
for fire safety regulation. Choose the single best matching option from the numbered list. \
Prefer the most specific applicable category; if several apply, choose the most common one. \
Respond with JSON only: {\"option\": <number>, \"confidence\": <0.0-1.0>}.";

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("chat completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("chat completion returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("chat completion returned no choices")]
    EmptyReply,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

/// Minimal OpenAI-compatible chat-completions client.
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AdapterError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AdapterError::HttpClient)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ]
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        let reply: ChatResponse = response.json().await?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(LlmError::EmptyReply)?;
        trace!(model = %self.model, reply = %content, "chat completion");
        Ok(content)
    }
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("number pattern compiles"))
}

/// First number in a free-text reply, e.g. "Score: 8", "8.5" or "8/10".
pub(crate) fn first_number(reply: &str) -> Option<f64> {
    number_pattern()
        .find(reply)
        .and_then(|found| found.as_str().parse().ok())
}

/// JSON payload from a reply, tolerating markdown code fences around it.
pub(crate) fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> Result<T, serde_json::Error> {
    let json_str = if reply.contains("```json") {
        reply
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(str::trim)
            .unwrap_or(reply)
    } else if reply.contains("```") {
        reply.split("```").nth(1).map(str::trim).unwrap_or(reply)
    } else {
        reply.trim()
    };
    serde_json::from_str(json_str)
}

fn describe(attributes: &PremiseAttributes) -> String {
    let business_type = if attributes.business_type.is_empty() {
        "N/A"
    } else {
        &attributes.business_type
    };
    format!(
        "- Name: {}\n- Address: {}\n- Business type: {}",
        attributes.name, attributes.address, business_type
    )
}

/// Remote scorer: a 1-10 judgement mapped to n/10. Never falls back to a default score.
pub struct LlmSimilarityScorer {
    client: ChatClient,
}

impl LlmSimilarityScorer {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }

    /// Temperature 0 makes the reply deterministic, so a bad reply is not retried.
    pub(crate) fn parse_score(reply: &str) -> Result<f64, ScoringFailure> {
        match first_number(reply) {
            Some(n) if (1.0..=10.0).contains(&n) => Ok(n / 10.0),
            _ => Err(ScoringFailure::Unparseable(format!(
                "similarity reply {reply:?} is not a number from 1 to 10"
            ))),
        }
    }
}

#[async_trait]
impl SimilarityScorer for LlmSimilarityScorer {
    async fn score(
        &self,
        candidate: &PremiseAttributes,
        neighbor: &PremiseAttributes,
    ) -> Result<f64, ScoringFailure> {
        let prompt = format!(
            "New record:\n{}\n\nExisting record:\n{}\n\nRate 1-10 that these are the SAME BUSINESS.",
            describe(candidate),
            describe(neighbor)
        );
        let reply = self
            .client
            .complete(SCORING_SYSTEM_PROMPT, &prompt)
            .await
            .map_err(|err| ScoringFailure::Unavailable(err.to_string()))?;
        Self::parse_score(&reply)
    }
}

#[derive(Debug, Deserialize)]
struct ClassificationReply {
    option: usize,
    #[serde(default = "default_reply_confidence")]
    confidence: f64,
}

fn default_reply_confidence() -> f64 {
    0.5
}

/// Remote classifier choosing among the jurisdiction's taxonomy categories.
pub struct LlmOccupancyClassifier {
    client: ChatClient,
    taxonomy: Arc<OccupancyTaxonomy>,
}

impl LlmOccupancyClassifier {
    pub fn new(client: ChatClient, taxonomy: Arc<OccupancyTaxonomy>) -> Self {
        Self { client, taxonomy }
    }

    pub(crate) fn parse_choice(
        reply: &str,
        categories: &[OccupancyCategory],
    ) -> Result<OccupancyResult, ClassificationFailure> {
        let parsed: ClassificationReply = parse_json_reply(reply).map_err(|err| {
            ClassificationFailure::Unavailable(format!("malformed classification reply: {err}"))
        })?;

        let category = parsed
            .option
            .checked_sub(1)
            .and_then(|index| categories.get(index))
            .ok_or_else(|| {
                ClassificationFailure::Unavailable(format!(
                    "classification chose option {} of {}",
                    parsed.option,
                    categories.len()
                ))
            })?;

        let confidence = if parsed.confidence.is_finite() {
            parsed.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Ok(OccupancyResult {
            category: category.name.clone(),
            confidence,
        })
    }
}

#[async_trait]
impl OccupancyClassifier for LlmOccupancyClassifier {
    async fn classify(
        &self,
        business_type: &str,
        state_code: &str,
    ) -> Result<OccupancyResult, ClassificationFailure> {
        let categories = self.taxonomy.require(state_code)?;
        let options = categories
            .iter()
            .enumerate()
            .map(|(index, category)| format!("{}. {}", index + 1, category.name))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Business type: {business_type}\nState: {state_code}\n\nOptions:\n{options}"
        );

        let reply = self
            .client
            .complete(CLASSIFICATION_SYSTEM_PROMPT, &prompt)
            .await
            .map_err(|err| ClassificationFailure::Unavailable(err.to_string()))?;
        Self::parse_choice(&reply, categories)
    }
}
