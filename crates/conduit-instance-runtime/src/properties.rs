//! Flat `key=value` payload parsing for lifecycle requests.
//!
//! Accepts the classic properties layout: one entry per line, `=` or `:` as
//! separator, `#`/`!` comment lines, surrounding whitespace ignored. Lines
//! without a separator become keys with an empty value. Later keys override
//! earlier ones.

use super::models::InstanceProperties;

/// Parses an optional request payload. No payload yields an empty set.
pub fn parse_properties(payload: Option<&str>) -> InstanceProperties {
    let mut props = InstanceProperties::new();
    let Some(payload) = payload else {
        return props;
    };
    for line in payload.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) = match line.find(|c: char| c == '=' || c == ':') {
            Some(idx) => (line[..idx].trim(), line[idx + 1..].trim()),
            None => (line, ""),
        };
        if key.is_empty() {
            continue;
        }
        props.insert(key.to_string(), value.to_string());
    }
    props
}
