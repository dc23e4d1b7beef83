//! Dummy provider: echoes the latest prompt line back prefixed with `[echo]`.
//! Used to exercise the full exchange without an API key or network.

use serde_json::json;

use crate::llm::{RawResponse, TransportError};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn post_inputs(&self, prompt: &str) -> Result<RawResponse, TransportError> {
        let last = prompt.lines().last().unwrap_or_default();
        let content = last.split_once(": ").map_or(last, |(_, content)| content);
        let body = json!([{ "generated_text": format!("[echo] {content}") }]);
        Ok(RawResponse::new(200, body.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GenerationBody, extract_text};

    #[tokio::test]
    async fn echoes_latest_line_content() {
        let resp = DummyProvider.post_inputs("system: be nice\nuser: hello").await.unwrap();
        assert_eq!(resp.status, 200);
        let body = GenerationBody::parse(&resp.body).unwrap();
        assert_eq!(extract_text(&body), Some("[echo] hello"));
    }

    #[tokio::test]
    async fn empty_prompt() {
        let resp = DummyProvider.post_inputs("").await.unwrap();
        let body = GenerationBody::parse(&resp.body).unwrap();
        assert_eq!(extract_text(&body), Some("[echo] "));
    }
}
