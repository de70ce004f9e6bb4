use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use wagf_core::{LlmError, LlmInvoke, LlmReply, TokenCounts};

/// Scripted LLM for tests and dry runs: canned responses in order, optional
/// cycling, injected errors and latency, full prompt history.
#[derive(Clone)]
pub struct MockLlm {
    inner: Arc<RwLock<MockLlmInner>>,
    model_name: String,
}

struct MockLlmInner {
    responses: Vec<String>,
    response_index: usize,
    cycle: bool,
    error: Option<String>,
    latency: Duration,
    prompts: Vec<String>,
}

impl MockLlm {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MockLlmInner {
                responses: Vec::new(),
                response_index: 0,
                cycle: false,
                error: None,
                latency: Duration::ZERO,
                prompts: Vec::new(),
            })),
            model_name: model_name.into(),
        }
    }

    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.inner.write().responses.push(response.into());
        self
    }

    pub fn with_responses<I, S>(self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut inner = self.inner.write();
            inner.responses.extend(responses.into_iter().map(Into::into));
        }
        self
    }

    /// Repeat the response list instead of repeating the last entry.
    pub fn cycling(self) -> Self {
        self.inner.write().cycle = true;
        self
    }

    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.inner.write().error = Some(message.into());
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.inner.write().latency = latency;
        self
    }

    pub fn call_count(&self) -> usize {
        self.inner.read().prompts.len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.inner.read().prompts.clone()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.inner.read().prompts.last().cloned()
    }
}

#[async_trait]
impl LlmInvoke for MockLlm {
    async fn invoke(&self, prompt: &str) -> Result<LlmReply, LlmError> {
        let (latency, error, response) = {
            let mut inner = self.inner.write();
            inner.prompts.push(prompt.to_string());

            let error = inner.error.clone();
            let response = if inner.responses.is_empty() {
                String::new()
            } else {
                let index = if inner.cycle {
                    inner.response_index % inner.responses.len()
                } else {
                    inner.response_index.min(inner.responses.len() - 1)
                };
                inner.response_index += 1;
                inner.responses[index].clone()
            };
            (inner.latency, error, response)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(message) = error {
            return Err(LlmError::Transport(message));
        }

        // heuristic accounting, the way providers without usage reporting
        // are counted elsewhere
        let tokens = TokenCounts::new(
            prompt.len().div_ceil(4) as u32,
            response.len().div_ceil(4).max(1) as u32,
        );
        Ok(LlmReply::new(response, tokens))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
