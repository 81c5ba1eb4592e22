use std::collections::HashMap;

/// Parse query parameters from a URI string
///
/// Handles URL decoding and returns a HashMap of parameter key-value pairs.
/// Multiple values for the same key are not supported (only the last is kept).
///
/// # Example
/// ```
/// use scribe::core::query_params::parse_query_params;
///
/// let params = parse_query_params("/group/cats/?page=2&q=a%20b");
/// assert_eq!(params.get("page"), Some(&"2".to_string()));
/// assert_eq!(params.get("q"), Some(&"a b".to_string()));
/// ```
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    if let Some(query_start) = uri.find('?') {
        let query = &uri[query_start + 1..];
        for param in query.split('&').filter(|p| !p.is_empty()) {
            if let Some(eq_idx) = param.find('=') {
                let key = &param[..eq_idx];
                let encoded_value = &param[eq_idx + 1..];
                params.insert(key.to_string(), decode(encoded_value));
            } else {
                // Flag parameter without value
                params.insert(param.to_string(), String::new());
            }
        }
    }

    params
}

fn decode(value: &str) -> String {
    let spaced = value.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Raw `page` parameter, left unparsed for the paginator.
pub fn page_param(params: &HashMap<String, String>) -> Option<&str> {
    params.get("page").map(String::as_str)
}

/// Path plus query string, used as the `next` target after login.
pub fn full_path(path: &str, uri: &str) -> String {
    match uri.find('?') {
        Some(idx) if idx + 1 < uri.len() => format!("{}{}", path, &uri[idx..]),
        _ => path.to_string(),
    }
}
