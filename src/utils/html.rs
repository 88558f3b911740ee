use ammonia;

/// Clean HTML content using the ammonia library.
///
/// Item descriptions are free text typed by reporters and rendered by the
/// SPA; this strips dangerous tags (like <script>, <iframe>) and malicious
/// attributes (like onclick) while preserving harmless markup. Plain text
/// passes through unchanged apart from entity escaping.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
