//! Gemini client deriving structured notes from a transcript.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ytx_models::{Analysis, RawContent};

use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::Deriver;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// System prompt for transcript analysis. Part of every derived cache key,
/// together with the user prompt built from the transcript.
pub const ANALYSIS_PROMPT: &str = r#"You turn video transcripts into study notes.

Return ONLY a single JSON object with this schema:
{
  "summary": "3-5 sentence overview of the video",
  "key_insights": ["Insight stated as a full sentence"],
  "frameworks": [
    {"name": "Framework name", "description": "What it is for", "steps": ["Step"]}
  ],
  "key_moments": [
    {"time": "MM:SS", "note": "What happens at this point"}
  ]
}

Rules:
- Use only information present in the transcript.
- Leave "frameworks" empty when the video teaches no method or process.
- Timestamps in "key_moments" must come from the transcript."#;

/// Gemini API client.
pub struct GeminiDeriver {
    api_key: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    #[serde(rename = "systemInstruction")]
    system_instruction: Content,
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GeminiDeriver {
    pub fn new(api_key: impl Into<String>) -> WorkerResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| WorkerError::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        })
    }

    /// Create a client using `GEMINI_API_KEY`.
    pub fn from_env() -> WorkerResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| WorkerError::config("GEMINI_API_KEY not set"))?;
        Self::new(api_key)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call_gemini_api(&self, model: &str, prompt: &str) -> WorkerResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let request = build_request(prompt);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, retry_after, &body));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            WorkerError::derivation(format!("Failed to parse Gemini response: {}", e))
        })?;

        let text: String = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default();

        Ok(text)
    }
}

#[async_trait]
impl Deriver for GeminiDeriver {
    fn key_material(&self, raw: &RawContent) -> String {
        format!("{}\n\n{}", ANALYSIS_PROMPT, build_prompt(raw))
    }

    async fn derive(&self, raw: &RawContent, model_id: &str) -> WorkerResult<Analysis> {
        info!(video_id = %raw.meta.video_id, model = %model_id, "Requesting analysis");
        let prompt = build_prompt(raw);
        let text = self.call_gemini_api(model_id, &prompt).await?;
        let analysis = parse_analysis(&text)?;
        debug!(
            video_id = %raw.meta.video_id,
            insights = analysis.key_insights.len(),
            "Analysis parsed"
        );
        Ok(analysis)
    }
}

fn build_request(prompt: &str) -> GeminiRequest {
    GeminiRequest {
        system_instruction: Content {
            parts: vec![Part {
                text: ANALYSIS_PROMPT.to_string(),
            }],
        },
        contents: vec![Content {
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json".to_string(),
        },
    }
}

fn build_prompt(raw: &RawContent) -> String {
    let mut transcript = String::new();
    for line in &raw.transcript {
        let secs = line.start.max(0.0) as u64;
        transcript.push_str(&format!("[{:02}:{:02}] {}\n", secs / 60, secs % 60, line.text.trim()));
    }
    format!(
        "Title: {}\nChannel: {}\n\nTRANSCRIPT:\n{}",
        raw.meta.title, raw.meta.channel, transcript
    )
}

/// Transport failures are worded so the retry layer treats them as
/// transient.
fn request_error(e: reqwest::Error) -> WorkerError {
    if e.is_timeout() {
        WorkerError::derivation(format!("Gemini request timed out: {}", e))
    } else {
        WorkerError::derivation(format!("Gemini connection error: {}", e))
    }
}

/// 429 is rate limiting, 5xx is transient, any other status is rejected.
fn status_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> WorkerError {
    let body = body.trim();
    if status == StatusCode::TOO_MANY_REQUESTS {
        WorkerError::rate_limited(format!("Gemini API returned {}: {}", status, body), retry_after)
    } else if status.is_server_error() {
        WorkerError::derivation(format!("Gemini API returned {}: {}", status, body))
    } else {
        WorkerError::rejected(format!("Gemini API returned {}: {}", status, body))
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Parse the model reply, tolerating markdown code fences.
fn parse_analysis(text: &str) -> WorkerResult<Analysis> {
    let text = text.trim();
    if text.is_empty() {
        return Err(WorkerError::derivation("Model returned empty content"));
    }

    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text).trim();

    let start = text.find('{');
    let end = text.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => return Err(WorkerError::derivation("No JSON found in model response")),
    };

    let analysis: Analysis = serde_json::from_str(json).map_err(|e| {
        WorkerError::derivation(format!("No JSON found in model response: {}", e))
    })?;
    if analysis.is_empty() {
        return Err(WorkerError::derivation("Model returned empty content"));
    }
    Ok(analysis)
}
