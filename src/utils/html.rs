// src/utils/html.rs

/// Clean HTML content using the ammonia library.
///
/// Problem and choice bodies are authored as rich text in the admin panel;
/// this whitelist-based sanitization keeps safe tags (<b>, <sub>, <sup>, ...)
/// and strips script tags and event-handler attributes before storage.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
