//! Per-item news summarization via the Gemini `generateContent` API.
//!
//! Each selected news item is summarized independently. The model is asked
//! for structured JSON output (`{"summary": "..."}`) so the reply can be
//! parsed without scraping free text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use meetnews_shared::{CandidateItem, MeetNewsError, Result, SummarizeConfig, read_secret};

/// User-Agent string for summarization requests.
const USER_AGENT: &str = concat!("MeetNews/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Produces a short summary of one article body.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Shape of the structured reply.
#[derive(Debug, Deserialize)]
struct NewsSummary {
    summary: String,
}

/// Summarizer backed by Google Gemini.
pub struct GeminiSummarizer {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_input_chars: usize,
}

impl GeminiSummarizer {
    /// Build a summarizer, reading the API key from the env var named in `config`.
    pub fn from_config(config: &SummarizeConfig) -> Result<Self> {
        let api_key = read_secret(&config.api_key_env);
        if api_key.is_none() {
            warn!(
                key_env = %config.api_key_env,
                "summarization API key not set, items will be left unsummarized"
            );
        }
        Self::new(config, api_key)
    }

    pub fn new(config: &SummarizeConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MeetNewsError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            max_input_chars: config.max_input_chars,
        })
    }
}

/// Prompt sent for one article.
fn news_prompt(text: &str) -> String {
    format!("다음 뉴스를 한국어로 3~4문장으로 요약해줘: {text}")
}

fn request_body(prompt: &str) -> serde_json::Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": { "summary": { "type": "STRING" } },
                "required": ["summary"]
            }
        }
    })
}

/// Cut content to at most `max_chars` characters.
fn truncate_content(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    async fn summarize(&self, text: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| MeetNewsError::Summarization("API key not configured".into()))?;

        let prompt = news_prompt(truncate_content(text, self.max_input_chars));
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&request_body(&prompt))
            .send()
            .await
            .map_err(|e| MeetNewsError::Network(format!("generateContent: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MeetNewsError::Summarization(format!(
                "generateContent: HTTP {status}"
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| MeetNewsError::Summarization(format!("invalid response: {e}")))?;

        let reply = body
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .ok_or_else(|| MeetNewsError::Summarization("response has no text".into()))?;

        let parsed: NewsSummary = serde_json::from_str(&reply)
            .map_err(|e| MeetNewsError::Summarization(format!("reply is not summary JSON: {e}")))?;

        let summary = parsed.summary.trim();
        if summary.is_empty() {
            return Err(MeetNewsError::Summarization("empty summary".into()));
        }
        Ok(summary.to_string())
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Summarize every item that has text, concurrently.
///
/// A failed item keeps `summary = None`, or `placeholder` when one is given.
/// Items without text are passed through untouched. Order is preserved.
#[instrument(skip_all, fields(items = items.len()))]
pub async fn summarize_items(
    summarizer: &dyn Summarizer,
    mut items: Vec<CandidateItem>,
    placeholder: Option<&str>,
) -> Vec<CandidateItem> {
    let targets: Vec<usize> = (0..items.len()).filter(|&i| items[i].has_text()).collect();

    let outcomes = futures::future::join_all(
        targets
            .iter()
            .map(|&i| summarizer.summarize(items[i].text_str())),
    )
    .await;

    let mut failed = 0usize;
    for (&i, outcome) in targets.iter().zip(outcomes) {
        match outcome {
            Ok(summary) => items[i].summary = Some(summary),
            Err(e) => {
                failed += 1;
                warn!(url = %items[i].url, error = %e, "news summarization failed");
                items[i].summary = placeholder.map(str::to_string);
            }
        }
    }

    debug!(attempted = targets.len(), failed, "summaries collected");
    info!(
        summarized = targets.len() - failed,
        failed,
        "summarization completed"
    );
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> SummarizeConfig {
        SummarizeConfig {
            endpoint: format!("{}/v1beta", server.uri()),
            ..SummarizeConfig::default()
        }
    }

    fn reply(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        })
    }

    #[tokio::test]
    async fn parses_structured_summary() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash-lite:generateContent"))
            .and(query_param("key", "secret"))
            .and(body_string_contains("responseSchema"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(reply(r#"{"summary": "칩 수요가 늘었다."}"#)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let summarizer = GeminiSummarizer::new(&test_config(&server), Some("secret".into())).unwrap();
        let summary = summarizer.summarize("기사 본문").await.unwrap();
        assert_eq!(summary, "칩 수요가 늘었다.");
    }

    #[tokio::test]
    async fn http_error_is_summarization_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let summarizer = GeminiSummarizer::new(&test_config(&server), Some("k".into())).unwrap();
        let err = summarizer.summarize("body").await.unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn non_json_reply_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("just prose")))
            .mount(&server)
            .await;

        let summarizer = GeminiSummarizer::new(&test_config(&server), Some("k".into())).unwrap();
        assert!(summarizer.summarize("body").await.is_err());
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply(r#"{"summary":"x"}"#)))
            .expect(0)
            .mount(&server)
            .await;

        let summarizer = GeminiSummarizer::new(&test_config(&server), None).unwrap();
        assert!(summarizer.summarize("body").await.is_err());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_content("가나다라", 2), "가나");
        assert_eq!(truncate_content("abc", 10), "abc");
    }

    /// Fails for any text containing "fail".
    struct PickySummarizer;

    #[async_trait]
    impl Summarizer for PickySummarizer {
        async fn summarize(&self, text: &str) -> Result<String> {
            if text.contains("fail") {
                Err(MeetNewsError::Summarization("model refused".into()))
            } else {
                Ok(format!("summary of {text}"))
            }
        }
    }

    fn items() -> Vec<CandidateItem> {
        vec![
            CandidateItem::new("u1", "t1", "one"),
            CandidateItem::new("u2", "t2", "please fail"),
            CandidateItem::new("u3", "t3", "three"),
        ]
    }

    #[tokio::test]
    async fn one_failure_does_not_affect_others() {
        let out = summarize_items(&PickySummarizer, items(), None).await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].summary.as_deref(), Some("summary of one"));
        assert!(out[1].summary.is_none());
        assert_eq!(out[2].summary.as_deref(), Some("summary of three"));
    }

    #[tokio::test]
    async fn failure_uses_placeholder_when_configured() {
        let out = summarize_items(&PickySummarizer, items(), Some("요약 실패")).await;
        assert_eq!(out[1].summary.as_deref(), Some("요약 실패"));
        assert_eq!(out[0].summary.as_deref(), Some("summary of one"));
    }

    #[tokio::test]
    async fn items_without_text_are_skipped() {
        let mut list = items();
        list[0].text = None;
        let out = summarize_items(&PickySummarizer, list, None).await;
        assert!(out[0].summary.is_none());
        assert_eq!(out[2].summary.as_deref(), Some("summary of three"));
    }
}
