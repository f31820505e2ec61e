//! Vision models offered to the user, keyed by display name.

/// Display name used when nothing (or something unknown) is configured.
pub const DEFAULT_MODEL: &str = "Qwen2.5 VL 72B (Free)";

/// (display name, OpenRouter model id)
pub const MODELS: &[(&str, &str)] = &[
    ("Qwen2.5 VL 32B (Free)", "qwen/qwen2.5-vl-32b-instruct"),
    ("Qwen2.5 VL 72B (Free)", "qwen/qwen2.5-vl-72b-instruct"),
    (
        "Mistral 3.2 Small 24B (Free)",
        "mistralai/mistral-small-3.2-24b-instruct",
    ),
    ("Gemma 3 12B IT (Free)", "google/gemma-3-12b-it"),
    ("Gemma 3 27B IT (Free)", "google/gemma-3-27b-it"),
    ("Gemini 2.5 Flash Lite", "google/gemini-2.5-flash-lite"),
    ("GPT-4.1 Mini", "openai/gpt-4.1-mini"),
];

/// Resolves a display name (case-insensitive) to a model id.
/// Raw ids such as `vendor/model` are passed through unchanged.
pub fn resolve_model(name: &str) -> Option<&str> {
    let name = name.trim();
    if let Some((_, id)) = MODELS
        .iter()
        .find(|(display, _)| display.eq_ignore_ascii_case(name))
    {
        return Some(id);
    }
    if name.contains('/') && !name.contains(char::is_whitespace) {
        return Some(name);
    }
    None
}

/// Model id for the configured name, falling back to the default model.
pub fn model_id_or_default(name: &str) -> &str {
    resolve_model(name).unwrap_or_else(|| {
        tracing::warn!(model = %name, "Unknown model, using default");
        default_model_id()
    })
}

fn default_model_id() -> &'static str {
    MODELS
        .iter()
        .find(|(display, _)| *display == DEFAULT_MODEL)
        .map(|(_, id)| *id)
        .unwrap_or("qwen/qwen2.5-vl-72b-instruct")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_display_names() {
        assert_eq!(resolve_model("GPT-4.1 Mini"), Some("openai/gpt-4.1-mini"));
        assert_eq!(
            resolve_model("qwen2.5 vl 32b (free)"),
            Some("qwen/qwen2.5-vl-32b-instruct")
        );
    }

    #[test]
    fn test_resolve_raw_id_and_unknown() {
        assert_eq!(
            resolve_model("anthropic/claude-3.5-sonnet"),
            Some("anthropic/claude-3.5-sonnet")
        );
        assert_eq!(resolve_model("Some Model"), None);
        assert_eq!(model_id_or_default("nope"), "qwen/qwen2.5-vl-72b-instruct");
    }

    #[test]
    fn test_default_model_is_listed() {
        assert!(resolve_model(DEFAULT_MODEL).is_some());
    }
}
