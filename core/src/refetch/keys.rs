//! Decoding of field keys that carry call arguments inline, and validation
//! of range-behavior lookup keys.
//!
//! Two legacy encodings survive in response payloads and are tried in order:
//! the canonical form `name(arg:value,...)` and the dotted chain form
//! `name.call(value).call(value)`. Anything else is a hard error.

use mutara_proto::{Call, FieldNode};

use crate::{config::SchemaConfig, error::UsageError};

/// A field key decoded into its name and ordered call list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedKey {
    pub name: String,
    pub calls: Vec<Call>,
}

pub fn decode_field_key(key: &str) -> Result<DecodedKey, UsageError> {
    if let Some(decoded) = decode_canonical(key) {
        return Ok(decoded);
    }
    if let Some(decoded) = decode_dotted(key) {
        return Ok(decoded);
    }
    Err(UsageError::MalformedFieldKey(key.to_string()))
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `name` or `name(arg:value,arg:value)`.
fn decode_canonical(key: &str) -> Option<DecodedKey> {
    let (name, rest) = match key.find('(') {
        None => return is_ident(key).then(|| DecodedKey { name: key.to_string(), calls: Vec::new() }),
        Some(open) => (&key[..open], &key[open..]),
    };
    if !is_ident(name) {
        return None;
    }
    let args = rest.strip_prefix('(')?.strip_suffix(')')?;
    if args.is_empty() || args.contains('(') || args.contains(')') {
        return None;
    }
    let mut calls = Vec::new();
    for pair in args.split(',') {
        let (arg, value) = pair.split_once(':')?;
        if !is_ident(arg) || value.is_empty() {
            return None;
        }
        calls.push(Call::new(arg, value));
    }
    Some(DecodedKey { name: name.to_string(), calls })
}

/// `name.call(value).call(value)`: a bare field name followed by one call
/// per dotted segment.
fn decode_dotted(key: &str) -> Option<DecodedKey> {
    let mut segments = split_on_dots(key);
    let name = segments.next()?;
    if !is_ident(&name) {
        return None;
    }
    let mut calls = Vec::new();
    for segment in segments {
        let open = segment.find('(')?;
        let call_name = &segment[..open];
        let value = segment[open..].strip_prefix('(')?.strip_suffix(')')?;
        if !is_ident(call_name) || value.is_empty() || value.contains('(') || value.contains(')') {
            return None;
        }
        calls.push(Call::new(call_name, value));
    }
    Some(DecodedKey { name, calls })
}

/// Split on `.` but not inside parentheses, so call values may carry dots.
fn split_on_dots(key: &str) -> impl Iterator<Item = String> + '_ {
    let mut depth = 0usize;
    let mut current = String::new();
    let mut out = Vec::new();
    for c in key.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '.' if depth == 0 => out.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    out.push(current);
    out.into_iter()
}

/// Range-behavior keys are dot-joined call segments and must arrive already
/// sorted; unsorted keys would silently miss lookups, so they are rejected
/// with the expected form spelled out.
pub fn ensure_sorted_range_key(key: &str) -> Result<(), UsageError> {
    if key.is_empty() {
        // The empty signature (a connection with no non-pagination calls).
        return Ok(());
    }
    let segments: Vec<String> = split_on_dots(key).collect();
    let mut sorted = segments.clone();
    sorted.sort_unstable();
    if segments != sorted {
        return Err(UsageError::UnsortedRangeBehaviorKey { key: key.to_string(), expected: sorted.join(".") });
    }
    Ok(())
}

/// The lookup key for a tracked connection: its non-pagination calls printed
/// `name(value)`, sorted, dot-joined.
pub fn range_behavior_key(connection: &FieldNode, config: &SchemaConfig) -> String {
    let mut parts: Vec<String> =
        connection.calls.iter().filter(|c| !config.is_range_call(&c.name)).map(|c| c.to_string()).collect();
    parts.sort_unstable();
    parts.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bare_names() {
        let decoded = decode_field_key("viewer").unwrap();
        assert_eq!(decoded.name, "viewer");
        assert!(decoded.calls.is_empty());
    }

    #[test]
    fn decodes_canonical_form() {
        let decoded = decode_field_key("friends(first:10,orderby:name)").unwrap();
        assert_eq!(decoded.name, "friends");
        assert_eq!(decoded.calls, vec![Call::new("first", "10"), Call::new("orderby", "name")]);
    }

    #[test]
    fn decodes_dotted_form() {
        let decoded = decode_field_key("profile_picture.size(32)").unwrap();
        assert_eq!(decoded.name, "profile_picture");
        assert_eq!(decoded.calls, vec![Call::new("size", "32")]);
    }

    #[test]
    fn dotted_values_may_contain_dots() {
        let decoded = decode_field_key("avatar.scale(1.5)").unwrap();
        assert_eq!(decoded.calls, vec![Call::new("scale", "1.5")]);
    }

    #[test]
    fn malformed_keys_are_hard_errors() {
        for key in ["", "friends(", "friends()", "friends(first)", "9lives", "a.b", "a.(x)", "a.b(x))"] {
            assert!(matches!(decode_field_key(key), Err(UsageError::MalformedFieldKey(_))), "{key:?} should be rejected");
        }
    }

    #[test]
    fn sorted_range_keys_pass() {
        assert!(ensure_sorted_range_key("").is_ok());
        assert!(ensure_sorted_range_key("friends(first:10)").is_ok());
        assert!(ensure_sorted_range_key("first(10).orderby(name)").is_ok());
    }

    #[test]
    fn unsorted_range_keys_name_the_expected_form() {
        let err = ensure_sorted_range_key("orderby(name).first(10)").unwrap_err();
        match err {
            UsageError::UnsortedRangeBehaviorKey { key, expected } => {
                assert_eq!(key, "orderby(name).first(10)");
                assert_eq!(expected, "first(10).orderby(name)");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn range_behavior_key_drops_pagination_calls() {
        let config = SchemaConfig::default();
        let connection = FieldNode::leaf("friends")
            .with_calls(vec![Call::new("orderby", "name"), Call::new("first", "10"), Call::new("isViewerFriend", "true")]);
        assert_eq!(range_behavior_key(&connection, &config), "isViewerFriend(true).orderby(name)");
    }
}
