//! Notion identifier extraction.
//!
//! Accepted inputs:
//! - raw 32-char hex id: `a1b2...c3d4`
//! - dashed UUID: `a1b2c3d4-e5f6-...`
//! - Notion URL with a human-readable slug: `https://www.notion.so/ws/Page-Title-<id>`
//! - any of the URL forms with a query string appended

fn is_hex(c: char) -> bool {
    c.is_ascii_hexdigit()
}

fn is_dashed_uuid(s: &str) -> bool {
    let bytes: Vec<char> = s.chars().collect();
    if bytes.len() != 36 {
        return false;
    }
    for (i, c) in bytes.iter().enumerate() {
        match i {
            8 | 13 | 18 | 23 => {
                if *c != '-' {
                    return false;
                }
            }
            _ => {
                if !is_hex(*c) {
                    return false;
                }
            }
        }
    }
    true
}

/// Extract the raw (dash-stripped) 32-char hex id from a URL or id string.
/// Returns `None` when no valid id can be found.
pub fn extract_notion_id(input: &str) -> Option<String> {
    let trimmed = input.trim();

    if is_dashed_uuid(trimmed) {
        return Some(trimmed.chars().filter(|c| *c != '-').collect());
    }

    if trimmed.len() == 32 && trimmed.chars().all(is_hex) {
        return Some(trimmed.to_string());
    }

    // URL form: drop any query component, then take the trailing hex run.
    // Notion appends the id after the slug, so the last 32 hex chars are it.
    let without_query = trimmed.split('?').next().unwrap_or(trimmed);
    let tail_hex: usize = without_query
        .chars()
        .rev()
        .take_while(|c| is_hex(*c))
        .count();
    if tail_hex >= 32 {
        let chars: Vec<char> = without_query.chars().collect();
        let id: String = chars[chars.len() - 32..].iter().collect();
        return Some(id);
    }

    None
}

/// Format a raw 32-char hex id as a dashed UUID for the Notion API.
/// Anything that is not 32 hex chars after dash-stripping passes through
/// unchanged.
pub fn format_notion_id(raw_id: &str) -> String {
    let clean: String = raw_id.chars().filter(|c| *c != '-').collect();
    if clean.len() != 32 || !clean.chars().all(is_hex) {
        return raw_id.to_string();
    }
    format!(
        "{}-{}-{}-{}-{}",
        &clean[0..8],
        &clean[8..12],
        &clean[12..16],
        &clean[16..20],
        &clean[20..32]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4";

    #[test]
    fn accepts_raw_hex_id() {
        assert_eq!(extract_notion_id(RAW).as_deref(), Some(RAW));
    }

    #[test]
    fn accepts_dashed_uuid() {
        let dashed = "a1b2c3d4-e5f6-a1b2-c3d4-e5f6a1b2c3d4";
        assert_eq!(extract_notion_id(dashed).as_deref(), Some(RAW));
    }

    #[test]
    fn extracts_from_slug_url() {
        let url = format!("https://www.notion.so/workspace/Page-Title-{}", RAW);
        assert_eq!(extract_notion_id(&url).as_deref(), Some(RAW));
    }

    #[test]
    fn strips_query_component() {
        let url = format!("https://notion.so/workspace/{}?v=abc123&p=1", RAW);
        assert_eq!(extract_notion_id(&url).as_deref(), Some(RAW));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(extract_notion_id("not an id"), None);
        assert_eq!(extract_notion_id(""), None);
        assert_eq!(extract_notion_id("https://notion.so/workspace/short-1234"), None);
    }

    #[test]
    fn formats_as_dashed_uuid() {
        assert_eq!(
            format_notion_id(RAW),
            "a1b2c3d4-e5f6-a1b2-c3d4-e5f6a1b2c3d4"
        );
        // Idempotent on already-dashed input
        assert_eq!(
            format_notion_id("a1b2c3d4-e5f6-a1b2-c3d4-e5f6a1b2c3d4"),
            "a1b2c3d4-e5f6-a1b2-c3d4-e5f6a1b2c3d4"
        );
    }
}
