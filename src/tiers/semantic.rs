//! Last-resort extraction: hand the page text to a language model with a
//! strict JSON schema and let it pull the fields out.
//!
//! Runs only when the cheaper tiers left the result incomplete, and only
//! when a credential is configured. The tier never invents page content: it
//! reuses HTML already fetched by an earlier tier when available.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use schemars::{schema_for, JsonSchema};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{ExtractError, Result};
use crate::tiers::{dom, PageContext, Tier};
use crate::types::{ExtractedFields, TierAttempt, TierName};

const SYSTEM_PROMPT: &str = r#"You are a job posting extraction assistant. You are given the visible text of a web page that contains a job posting.

Extract exactly these fields:
- title: the job title
- company: the hiring company or organization name
- location: where the job is located (city/region/country, or "Remote")
- salary: the stated compensation, as written
- description: the job description text

Rules:
- Use null for any field the page does not state. Never guess or invent values.
- Copy values from the page; do not paraphrase titles, companies, or salaries.
- Do not include contact names, emails, phone numbers, or social handles in any field."#;

/// Model reply shape. Unknown keys are a schema violation, not noise.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct JobFieldsResponse {
    title: Option<String>,
    company: Option<String>,
    location: Option<String>,
    salary: Option<String>,
    description: Option<String>,
}

impl From<JobFieldsResponse> for ExtractedFields {
    fn from(r: JobFieldsResponse) -> Self {
        ExtractedFields {
            title: r.title,
            company: r.company,
            location: r.location,
            salary: r.salary,
            description: r.description,
        }
        .normalized()
    }
}

pub struct SemanticTier {
    client: Client,
    api_key: Option<SecretString>,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl SemanticTier {
    pub fn new(api_key: Option<SecretString>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout,
        }
    }

    /// Read the credential from `OPENAI_API_KEY`; the tier reports itself
    /// unavailable when the variable is absent.
    pub fn from_env(timeout: Duration) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);
        Self::new(api_key, timeout)
    }

    /// Set the chat model (default: gpt-4o).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn page_text(&self, url: &Url, ctx: &PageContext) -> Result<String> {
        if let Some(html) = &ctx.html {
            return Ok(dom::visible_text(html));
        }

        // No earlier tier got this far (e.g. rendering disabled); fetch once.
        let response = self
            .client
            .get(url.clone())
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| ExtractError::network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ExtractError::http_status(
                response.status().as_u16(),
                url.as_str(),
            ));
        }
        let html = response
            .text()
            .await
            .map_err(|e| ExtractError::network(e.to_string()))?;
        Ok(dom::visible_text(&html))
    }

    async fn extract_with_model(&self, url: &Url, text: &str) -> Result<ExtractedFields> {
        #[derive(Serialize)]
        struct ChatMessage {
            role: String,
            content: String,
        }

        #[derive(Serialize)]
        struct JsonSchemaFormat {
            name: String,
            strict: bool,
            schema: serde_json::Value,
        }

        #[derive(Serialize)]
        struct ResponseFormat {
            #[serde(rename = "type")]
            format_type: String,
            json_schema: JsonSchemaFormat,
        }

        #[derive(Serialize)]
        struct StructuredRequest {
            model: String,
            messages: Vec<ChatMessage>,
            temperature: f32,
            response_format: ResponseFormat,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<ChatChoice>,
        }

        #[derive(Deserialize)]
        struct ChatChoice {
            message: ChatResponseMessage,
        }

        #[derive(Deserialize)]
        struct ChatResponseMessage {
            content: String,
        }

        let api_key = self
            .api_key
            .as_ref()
            .ok_or(ExtractError::TierUnavailable {
                tier: TierName::Semantic,
            })?;

        let schema = response_schema().map_err(|e| ExtractError::model_call(e.to_string()))?;

        let request = StructuredRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("URL: {url}\n\nPage text:\n{text}"),
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: "job_fields".to_string(),
                    strict: true,
                    schema,
                },
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractError::model_call(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ExtractError::model_call(format!(
                "model API error ({status}): {error_text}"
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::model_call(e.to_string()))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ExtractError::model_call("empty model response"))?;

        let fields: JobFieldsResponse = parse_model_json(&content)?;
        Ok(fields.into())
    }
}

/// JSON schema for the strict response format.
///
/// Strict mode requires every property to be listed in `required`;
/// optionality is expressed through the null type union the derive already
/// emits, so all five keys are marked required here.
fn response_schema() -> serde_json::Result<serde_json::Value> {
    let mut schema = serde_json::to_value(schema_for!(JobFieldsResponse))?;
    let keys: Option<Vec<serde_json::Value>> = schema
        .get("properties")
        .and_then(serde_json::Value::as_object)
        .map(|props| props.keys().cloned().map(serde_json::Value::String).collect());
    if let Some(keys) = keys {
        schema["required"] = serde_json::Value::Array(keys);
    }
    Ok(schema)
}

/// Parse the model reply, tolerating a markdown code fence around the JSON.
fn parse_model_json(content: &str) -> Result<JobFieldsResponse> {
    serde_json::from_str(content)
        .or_else(|_| {
            let fenced = content
                .trim()
                .trim_start_matches("```json")
                .trim_start_matches("```")
                .trim_end_matches("```")
                .trim();
            serde_json::from_str(fenced)
        })
        .map_err(|e| ExtractError::model_schema(e.to_string()))
}

#[async_trait]
impl Tier for SemanticTier {
    fn name(&self) -> TierName {
        TierName::Semantic
    }

    fn available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn attempt(&self, url: &Url, ctx: &mut PageContext) -> TierAttempt {
        debug!(url = %url, model = %self.model, "semantic tier extracting");

        let run = async {
            let text = self.page_text(url, ctx).await?;
            self.extract_with_model(url, &text).await
        };

        let fields = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                return TierAttempt::from_error(TierName::Semantic, ExtractError::Cancelled);
            }
            outcome = tokio::time::timeout(self.timeout, run) => match outcome {
                Ok(Ok(fields)) => fields,
                Ok(Err(e)) => return TierAttempt::from_error(TierName::Semantic, e),
                Err(_) => {
                    return TierAttempt::from_error(
                        TierName::Semantic,
                        ExtractError::model_call(format!("model call timed out for {url}")),
                    );
                }
            },
        };

        TierAttempt::from_fields(TierName::Semantic, fields)
    }
}
