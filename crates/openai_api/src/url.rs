/// Default base URL for OpenAI-compatible endpoints.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Normalize a base URL to a chat completions endpoint.
///
/// Keeps `…/chat/completions` unchanged, otherwise appends it.
pub fn chat_completions_url(input: &str) -> String {
    let trimmed = base_or_default(input);
    if trimmed.ends_with("/chat/completions") {
        return trimmed.to_string();
    }
    format!("{trimmed}/chat/completions")
}

/// Normalize a base URL to a responses endpoint.
///
/// Keeps `…/responses` unchanged, otherwise appends it.
pub fn responses_url(input: &str) -> String {
    let trimmed = base_or_default(input);
    if trimmed.ends_with("/responses") {
        return trimmed.to_string();
    }
    format!("{trimmed}/responses")
}

/// Retrieval URL for one stored response: `{responses}/{response_id}`.
pub fn response_retrieval_url(input: &str, response_id: &str) -> String {
    format!("{}/{}", responses_url(input), response_id.trim())
}

fn base_or_default(input: &str) -> &str {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };
    base.trim_end_matches('/')
}
