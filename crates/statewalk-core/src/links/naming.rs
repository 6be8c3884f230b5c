// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Naming heuristics for resource inference.
//!
//! Maps parameter names and path segments to resource names (`userId` and
//! `/users/{id}` both mean `User`) and matches parameter names against
//! response fields.

use statewalk_dsl::paths;

/// Plural forms that do not follow the suffix rules, as `(singular, plural)`.
const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("mouse", "mice"),
    ("goose", "geese"),
    ("foot", "feet"),
    ("tooth", "teeth"),
    ("ox", "oxen"),
    ("die", "dice"),
    ("quiz", "quizzes"),
    ("thief", "thieves"),
    ("genus", "genera"),
    ("axe", "axes"),
    ("use", "uses"),
    ("case", "cases"),
    ("base", "bases"),
    ("phase", "phases"),
    ("house", "houses"),
    ("horse", "horses"),
    ("course", "courses"),
    ("purpose", "purposes"),
    ("response", "responses"),
    ("license", "licenses"),
    ("expense", "expenses"),
    ("cause", "causes"),
    ("pause", "pauses"),
    ("dose", "doses"),
    ("rose", "roses"),
    ("echo", "echoes"),
    ("volcano", "volcanoes"),
    ("canvas", "canvases"),
];

/// Words whose singular and plural are the same.
const UNCOUNTABLE: &[&str] = &[
    "advice",
    "aircraft",
    "analytics",
    "audio",
    "data",
    "deer",
    "equipment",
    "feedback",
    "firmware",
    "hardware",
    "information",
    "mail",
    "media",
    "metadata",
    "news",
    "personnel",
    "research",
    "series",
    "sheep",
    "software",
    "species",
    "staff",
    "status",
    "traffic",
];

/// Field names too generic to link across resources on their own.
const GENERIC_FIELDS: &[&str] = &["id", "uuid", "key", "name", "slug", "code"];

/// Path segments that never name a resource.
const NON_RESOURCE_SEGMENTS: &[&str] = &["api", "rest"];

/// Singular form of an English noun.
pub fn to_singular(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }
    if let Some((singular, _)) = IRREGULAR.iter().find(|(_, plural)| *plural == lower) {
        return restore_case(word, singular);
    }
    let n = word.len();
    if lower.ends_with("ies") && n > 3 && !is_vowel(lower.as_bytes()[n - 4]) {
        return format!("{}y", &word[..n - 3]);
    }
    if lower.ends_with("sses") {
        return word[..n - 2].to_string();
    }
    if ["xes", "zes", "ches", "shes"]
        .iter()
        .any(|suffix| lower.ends_with(suffix))
    {
        return word[..n - 2].to_string();
    }
    if lower.ends_with("ses") && n > 3 {
        return word[..n - 2].to_string();
    }
    if lower.ends_with("ss") || lower.ends_with("us") {
        return word.to_string();
    }
    if lower.ends_with('s') && n > 1 {
        return word[..n - 1].to_string();
    }
    word.to_string()
}

fn is_vowel(b: u8) -> bool {
    matches!(b, b'a' | b'e' | b'i' | b'o' | b'u')
}

fn restore_case(original: &str, replacement: &str) -> String {
    if original.starts_with(|c: char| c.is_ascii_uppercase()) {
        upper_first(replacement)
    } else {
        replacement.to_string()
    }
}

fn upper_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `user_profile`, `user-profile` and `userProfile` all become `UserProfile`.
pub fn to_pascal_case(text: &str) -> String {
    text.split(['_', '-', ' ', '.'])
        .filter(|part| !part.is_empty())
        .map(upper_first)
        .collect()
}

/// Lowercase with `_` and `-` removed, for separator-insensitive comparison.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Resource named by the last static segment of a path: `/users/{id}` -> `User`.
pub fn from_path(path: &str) -> Option<String> {
    paths::segments(path)
        .into_iter()
        .filter(|s| !s.contains('{'))
        .filter(|s| !is_version_segment(s) && !NON_RESOURCE_SEGMENTS.contains(s))
        .last()
        .map(|s| to_pascal_case(&to_singular(s)))
}

fn is_version_segment(segment: &str) -> bool {
    segment
        .strip_prefix(['v', 'V'])
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit() || c == '.'))
}

/// Split `channelId` / `channel_id` / `Channel-Id` into a resource prefix and
/// an id suffix; anything else has no prefix.
pub fn split_parameter_name(name: &str) -> (&str, &str) {
    if name.len() > 3 && ["_id", "-id", "_Id", "-Id"].iter().any(|s| name.ends_with(s)) {
        return name.split_at(name.len() - 3);
    }
    if name.len() > 2 && name.ends_with("Id") {
        return name.split_at(name.len() - 2);
    }
    ("", name)
}

/// Resource a parameter refers to.
///
/// `userId` and `user_id` name `User`; a bare `id` takes the static segment
/// right before it in the path (`/users/{id}` -> `User`).
pub fn from_parameter(parameter: &str, path: &str) -> Option<String> {
    let (prefix, _) = split_parameter_name(parameter);
    if !prefix.is_empty() {
        return Some(to_pascal_case(&to_singular(prefix)));
    }
    if normalize(parameter) == "id" {
        return paths::segment_before(path, parameter)
            .filter(|s| !is_version_segment(s))
            .map(|s| to_pascal_case(&to_singular(s)))
            .or_else(|| from_path(path));
    }
    None
}

/// Whether a field name identifies a resource (`id`, `userId`, `user_id`).
pub fn is_identifier(field: &str) -> bool {
    let normalized = normalize(field);
    normalized == "id" || normalized == "uuid" || !split_parameter_name(field).0.is_empty()
}

pub fn is_generic(field: &str) -> bool {
    GENERIC_FIELDS.contains(&normalize(field).as_str())
}

/// How closely a response field matches a parameter name.
///
/// Variants are ordered from the strongest to the weakest match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldMatch {
    /// `userId` == `userId`
    Exact,
    /// `user_id` ~ `userId`
    Normalized,
    /// Parameter `channelId` ~ field `Channel.id`
    PrefixStripped,
    /// Parameter `id` ~ field `Channel.channelId`
    ResourcePrefixed,
}

/// Best field of `resource` that can supply `parameter`.
///
/// Ties within a match kind resolve to the alphabetically first field.
pub fn find_matching_field<'a>(
    parameter: &str,
    resource: &str,
    fields: impl IntoIterator<Item = &'a str>,
) -> Option<(&'a str, FieldMatch)> {
    let parameter_normalized = normalize(parameter);
    let resource_normalized = normalize(resource);
    let (prefix, suffix) = split_parameter_name(parameter);
    let prefix_matches_resource =
        !prefix.is_empty() && normalize(&to_singular(prefix)) == resource_normalized;
    let suffix_normalized = normalize(suffix);

    fields
        .into_iter()
        .filter_map(|field| {
            let field_normalized = normalize(field);
            let kind = if field == parameter {
                FieldMatch::Exact
            } else if field_normalized == parameter_normalized {
                FieldMatch::Normalized
            } else if prefix_matches_resource && field_normalized == suffix_normalized {
                FieldMatch::PrefixStripped
            } else if prefix.is_empty()
                && field_normalized == format!("{}{}", resource_normalized, suffix_normalized)
            {
                FieldMatch::ResourcePrefixed
            } else {
                return None;
            };
            Some((field, kind))
        })
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_singular() {
        assert_eq!(to_singular("users"), "user");
        assert_eq!(to_singular("categories"), "category");
        assert_eq!(to_singular("days"), "day");
        assert_eq!(to_singular("addresses"), "address");
        assert_eq!(to_singular("boxes"), "box");
        assert_eq!(to_singular("branches"), "branch");
        assert_eq!(to_singular("people"), "person");
        assert_eq!(to_singular("People"), "Person");
        assert_eq!(to_singular("status"), "status");
        assert_eq!(to_singular("news"), "news");
        assert_eq!(to_singular("class"), "class");
        assert_eq!(to_singular("user"), "user");
    }

    #[test]
    fn test_to_pascal_case() {
        assert_eq!(to_pascal_case("user"), "User");
        assert_eq!(to_pascal_case("user_profile"), "UserProfile");
        assert_eq!(to_pascal_case("user-profile"), "UserProfile");
        assert_eq!(to_pascal_case("orderItem"), "OrderItem");
    }

    #[test]
    fn test_from_path() {
        assert_eq!(from_path("/users/{id}").as_deref(), Some("User"));
        assert_eq!(from_path("/api/v1/orders").as_deref(), Some("Order"));
        assert_eq!(
            from_path("/users/{userId}/posts").as_deref(),
            Some("Post")
        );
        assert_eq!(from_path("/"), None);
    }

    #[test]
    fn test_from_parameter() {
        assert_eq!(from_parameter("userId", "/users/{userId}").as_deref(), Some("User"));
        assert_eq!(from_parameter("order_id", "/x/{order_id}").as_deref(), Some("Order"));
        assert_eq!(from_parameter("id", "/orders/{id}").as_deref(), Some("Order"));
        assert_eq!(
            from_parameter("id", "/users/{userId}/posts/{id}").as_deref(),
            Some("Post")
        );
        assert_eq!(from_parameter("limit", "/users"), None);
        assert_eq!(from_parameter("User-Id", "/orders").as_deref(), Some("User"));
    }

    #[test]
    fn test_split_parameter_name() {
        assert_eq!(split_parameter_name("userId"), ("user", "Id"));
        assert_eq!(split_parameter_name("user_id"), ("user", "_id"));
        assert_eq!(split_parameter_name("User-Id"), ("User", "-Id"));
        assert_eq!(split_parameter_name("id"), ("", "id"));
    }

    #[test]
    fn test_identifier_fields() {
        assert!(is_identifier("id"));
        assert!(is_identifier("ownerId"));
        assert!(is_identifier("owner_id"));
        assert!(!is_identifier("name"));
        assert!(is_generic("ID"));
        assert!(!is_generic("ownerId"));
    }

    #[test]
    fn test_find_matching_field_tiers() {
        assert_eq!(
            find_matching_field("userId", "User", ["userId", "id"]),
            Some(("userId", FieldMatch::Exact))
        );
        assert_eq!(
            find_matching_field("userId", "User", ["user_id", "id"]),
            Some(("user_id", FieldMatch::Normalized))
        );
        assert_eq!(
            find_matching_field("channelId", "Channel", ["id", "name"]),
            Some(("id", FieldMatch::PrefixStripped))
        );
        assert_eq!(
            find_matching_field("id", "Channel", ["channelId", "name"]),
            Some(("channelId", FieldMatch::ResourcePrefixed))
        );
        assert_eq!(find_matching_field("userId", "Order", ["id"]), None);
    }

    #[test]
    fn test_find_matching_field_is_deterministic() {
        // Neither ownerId nor managerId matches `id` for resource `User`
        assert_eq!(find_matching_field("id", "User", ["ownerId", "managerId"]), None);
        // Equal match kinds resolve alphabetically
        assert_eq!(
            find_matching_field("userId", "User", ["user-id", "user_id"]),
            Some(("user-id", FieldMatch::Normalized))
        );
    }
}
