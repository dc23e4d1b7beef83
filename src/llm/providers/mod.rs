//! Text-generation backends.
//!
//! `build(config, api_key)` is the factory, called once at startup.
//! Adding a new backend = new module + new variant + new match arms.

pub mod dummy;
pub mod huggingface;

use crate::config::LlmConfig;
use crate::llm::{ProviderError, RawResponse, Transport, TransportError};

/// Environment variable holding the inference API token.
pub const HUGGINGFACE_API_KEY_ENV: &str = "HUGGINGFACE_API_KEY";

/// All available backends.
///
/// Enum dispatch keeps the executor's transport a concrete type, so the
/// binary needs no trait objects.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(dummy::DummyProvider),
    HuggingFace(huggingface::HuggingFaceProvider),
}

impl LlmProvider {
    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Dummy(_) => "dummy",
            LlmProvider::HuggingFace(_) => "huggingface",
        }
    }
}

impl Transport for LlmProvider {
    async fn post_inputs(&self, prompt: &str) -> Result<RawResponse, TransportError> {
        match self {
            LlmProvider::Dummy(p) => p.post_inputs(prompt).await,
            LlmProvider::HuggingFace(p) => p.post_inputs(prompt).await,
        }
    }
}

/// Construct a provider from config and an optional API key.
///
/// `api_key` is sourced from `HUGGINGFACE_API_KEY` (never TOML). The hosted
/// backend refuses to start without it.
pub fn build(config: &LlmConfig, api_key: Option<String>) -> Result<LlmProvider, ProviderError> {
    match config.provider.as_str() {
        "dummy" => Ok(LlmProvider::Dummy(dummy::DummyProvider)),
        "huggingface" | "hf" => {
            let api_key = api_key
                .filter(|k| !k.trim().is_empty())
                .ok_or(ProviderError::MissingApiKey(HUGGINGFACE_API_KEY_ENV))?;
            let hf = &config.huggingface;
            let p = huggingface::HuggingFaceProvider::new(
                &hf.api_base_url,
                &hf.model,
                hf.timeout_seconds,
                api_key,
            )?;
            Ok(LlmProvider::HuggingFace(p))
        }
        _ => Err(ProviderError::UnknownProvider(config.provider.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_dummy_without_key() {
        let mut config = LlmConfig::test_default();
        config.provider = "dummy".into();
        assert_eq!(build(&config, None).unwrap().name(), "dummy");
    }

    #[test]
    fn huggingface_requires_key() {
        let mut config = LlmConfig::test_default();
        config.provider = "huggingface".into();
        let err = build(&config, None).unwrap_err();
        assert!(err.to_string().contains(HUGGINGFACE_API_KEY_ENV));
        assert!(build(&config, Some("   ".into())).is_err());
    }

    #[test]
    fn huggingface_with_key() {
        let mut config = LlmConfig::test_default();
        config.provider = "huggingface".into();
        let p = build(&config, Some("hf_test".into())).unwrap();
        assert_eq!(p.name(), "huggingface");
    }

    #[test]
    fn unknown_provider_errors() {
        let mut config = LlmConfig::test_default();
        config.provider = "mystery".into();
        assert!(matches!(build(&config, None), Err(ProviderError::UnknownProvider(_))));
    }
}
