// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

/// Split a path into its non-empty segments
///
/// # Returns
/// `"/users/{id}/posts"` -> `["users", "{id}", "posts"]`
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Name of a `{placeholder}` segment, or `None` for a static segment
pub fn placeholder(segment: &str) -> Option<&str> {
    segment
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .filter(|name| !name.is_empty() && !name.contains(['{', '}']))
}

/// Every placeholder name in a path template, in order of appearance
///
/// Placeholders may share a segment with static text (`/files/{name}.{ext}`).
pub fn template_parameters(path: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                if !name.is_empty() {
                    names.push(name);
                }
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}

/// Whether the braces in a path template are balanced and non-nested
pub fn is_well_formed(path: &str) -> bool {
    let mut open = false;
    for c in path.chars() {
        match c {
            '{' if open => return false,
            '{' => open = true,
            '}' if !open => return false,
            '}' => open = false,
            _ => {}
        }
    }
    !open
}

/// Static segment immediately preceding the placeholder `name`
///
/// # Returns
/// `("/users/{id}", "id")` -> `Some("users")`
pub fn segment_before<'a>(path: &'a str, name: &str) -> Option<&'a str> {
    let segs = segments(path);
    let idx = segs.iter().position(|s| placeholder(s) == Some(name))?;
    segs[..idx]
        .iter()
        .rev()
        .find(|s| placeholder(s).is_none())
        .copied()
}

/// Whether a media type carries JSON (`application/json`, `application/problem+json`, ...)
pub fn is_json_media_type(media_type: &str) -> bool {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json") || essence == "*/*"
}
