use std::collections::VecDeque;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Test double that replays a fixed script of completions. Each call pops the
/// next entry; an exhausted script is an error so tests fail loudly when the
/// code under test makes more model calls than expected.
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<Result<String, String>>>,
}

impl ScriptedLlmClient {
    pub fn new(responses: Vec<Result<String, String>>) -> Self {
        Self { responses: Mutex::new(responses.into_iter().collect()) }
    }

    pub fn replying(responses: Vec<&str>) -> Self {
        Self::new(responses.into_iter().map(|response| Ok(response.to_string())).collect())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        let mut responses = self.responses.lock().await;
        match responses.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("scripted client ran out of responses")),
        }
    }
}

/// Strips chat-model framing from a completion so the JSON decoder sees only
/// the payload: markdown code fences and any prose before the first `{` or
/// after the last `}`.
pub(crate) fn json_payload(raw: &str) -> &str {
    let trimmed = raw.trim();
    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start <= end => &trimmed[start..=end],
        _ => trimmed,
    }
}
