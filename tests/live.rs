use std::env;
use std::sync::Arc;

use dotenvy::dotenv;
use llm_bridge::{
    AnalysisEngine, AnalysisInput, ConfigRegistry, ParsedOutput, ProviderConfig, ProviderKind,
    RequestOptions,
};

fn load_env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Reads `LLM_BRIDGE_LIVE_PROVIDER` plus optional `_BASE_URL` / `_MODEL` overrides.
fn engine_from_env() -> Option<(AnalysisEngine, String)> {
    let provider = load_env_var("LLM_BRIDGE_LIVE_PROVIDER")?;
    let kind: ProviderKind = provider.parse().ok()?;
    let registry = Arc::new(ConfigRegistry::new());
    let mut config = ProviderConfig::builtin(kind);
    if let Some(base_url) = load_env_var("LLM_BRIDGE_LIVE_BASE_URL") {
        config.base_url = base_url;
    }
    if let Some(model) = load_env_var("LLM_BRIDGE_LIVE_MODEL") {
        config.default_model = model;
    }
    registry.set_provider_config(config).ok()?;
    let engine = AnalysisEngine::builder().registry(registry).build().ok()?;
    Some((engine, provider))
}

#[tokio::test]
#[ignore = "requires a reachable provider and credentials"]
async fn live_analysis_sync_and_stream() {
    let _ = dotenv();
    let Some((engine, provider)) = engine_from_env() else {
        eprintln!("skip live test: LLM_BRIDGE_LIVE_PROVIDER missing or invalid");
        return;
    };

    let input = AnalysisInput::prompt(
        "Reply with a markdown section '## Summary' containing one sentence about Rust.",
    );
    let result = engine
        .analyze(&provider, input.clone(), RequestOptions::default())
        .await;
    assert!(result.success, "sync call failed: {}", result.error_message);
    assert!(!result.content.is_empty());

    let streamed = engine
        .analyze(&provider, input, RequestOptions::default().with_stream(true))
        .await;
    assert!(streamed.success, "streaming call failed: {}", streamed.error_message);
    let parsed = ParsedOutput::from_result(&streamed);
    assert!(!parsed.text().is_empty());
}
