
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use url::Url;

use super::EmbeddingService;
use crate::config::EmbeddingConfig;

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Blocking client for an HTTP embedding service exposing `POST /embed`
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    embed_url: Url,
    max_length: u32,
    agent: ureq::Agent,
    timeout: Duration,
    max_attempts: u32,
    backoff_base: Duration,
    /// Stop retrying once a call has run this long
    deadline: Option<Duration>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
    max_length: u32,
}

/// Parsed body of a successful `/embed` response
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedResponse {
    pub embedding: Vec<f32>,
    pub dimension: Option<usize>,
    pub text: Option<String>,
}

impl EmbedResponse {
    /// Parse a response body, matching field names case-insensitively
    #[inline]
    pub fn parse(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body).context("Response body is not JSON")?;
        let object = value
            .as_object()
            .context("Response body is not a JSON object")?;

        let field = |name: &str| {
            object
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        };

        let embedding = field("embedding")
            .context("Response has no embedding field")?
            .as_array()
            .context("Embedding field is not an array")?
            .iter()
            .map(|component| {
                component
                    .as_f64()
                    .map(|c| c as f32)
                    .context("Embedding contains a non-numeric component")
            })
            .collect::<Result<Vec<f32>>>()?;

        let dimension = match field("dimension") {
            Some(Value::Null) | None => None,
            Some(value) => Some(
                value
                    .as_u64()
                    .and_then(|d| usize::try_from(d).ok())
                    .context("Dimension field is not a non-negative integer")?,
            ),
        };

        let text = field("text").and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            embedding,
            dimension,
            text,
        })
    }

    /// Check the response describes a usable vector
    #[inline]
    pub fn into_vector(self) -> Result<Vec<f32>> {
        if self.embedding.is_empty() {
            anyhow::bail!("Embedding service returned an empty embedding");
        }
        match self.dimension {
            Some(dimension) if dimension != self.embedding.len() => anyhow::bail!(
                "Embedding length {} does not match reported dimension {}",
                self.embedding.len(),
                dimension
            ),
            _ => {}
        }
        Ok(self.embedding)
    }
}

impl HttpEmbeddingClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config
            .service_url()
            .context("Failed to build embedding service URL from config")?;
        let embed_url = Self::endpoint(&base_url, "embed")?;

        let timeout = config.timeout();
        Ok(Self {
            embed_url,
            max_length: config.max_length,
            agent: Self::build_agent(timeout),
            timeout,
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_secs(1),
            deadline: None,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = Self::build_agent(timeout);
        self.timeout = timeout;
        self
    }

    #[inline]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Longest one `embed` call can take: every attempt at the full
    /// timeout plus the backoff between attempts
    #[inline]
    pub fn call_budget(&self) -> Duration {
        let backoff: Duration = (1..self.max_attempts)
            .map(|attempt| self.backoff_delay(attempt))
            .sum();
        self.timeout * self.max_attempts + backoff
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) as u32
    }

    #[inline]
    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    #[inline]
    pub fn embed_url(&self) -> &Url {
        &self.embed_url
    }

    fn build_agent(timeout: Duration) -> ureq::Agent {
        ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into()
    }

    /// Append a path segment, keeping any path already on the base URL
    fn endpoint(base_url: &Url, segment: &str) -> Result<Url> {
        let mut url = base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("Embedding service URL cannot be a base: {}", base_url))?
            .pop_if_empty()
            .push(segment);
        Ok(url)
    }

    /// Request an embedding for `text` from the service
    #[inline]
    pub fn request_embedding(&self, text: &str) -> Result<EmbedResponse> {
        debug!("Requesting embedding for text (length: {})", text.len());

        let request_json = serde_json::to_string(&EmbedRequest {
            text,
            max_length: self.max_length,
        })
        .context("Failed to serialize embedding request")?;

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(self.embed_url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to request embedding")?;

        EmbedResponse::parse(&response_text).context("Failed to parse embedding response")
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let started = Instant::now();
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.max_attempts);

            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.max_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.max_attempts
                            );
                            true
                        }
                        _ => false,
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.max_attempts {
                        let delay = self.backoff_delay(attempt);
                        if let Some(deadline) = self.deadline {
                            if started.elapsed() + delay >= deadline {
                                warn!(
                                    "Deadline of {:?} reached after attempt {}, not retrying",
                                    deadline, attempt
                                );
                                break;
                            }
                        }
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.embed_url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

impl EmbeddingService for HttpEmbeddingClient {
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request_embedding(text)?.into_vector()
    }
}
