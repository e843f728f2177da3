//! Path identifiers used as usage tree keys
//!
//! Tree keys are slash-delimited logical paths (`bucket/dir/sub`). Objects
//! whose name ends in `/` are stored under a directory marker name so they
//! can sit next to real objects; the marker must never surface in a prefix
//! reported to a caller.

/// Path separator
pub const SLASH_SEPARATOR: &str = "/";

/// Suffix that replaces the trailing slash of a directory object
pub const DIR_OBJECT_SUFFIX: &str = "__OBJDIR__";

/// Encode a directory object name (`a/b/` -> `a/b__OBJDIR__`)
#[must_use]
pub fn encode_dir_object(object: &str) -> String {
    match object.strip_suffix(SLASH_SEPARATOR) {
        Some(stripped) if !stripped.is_empty() => format!("{stripped}{DIR_OBJECT_SUFFIX}"),
        _ => object.to_string(),
    }
}

/// Decode directory markers back to their logical form
///
/// A marker on the last segment becomes a trailing slash; markers on inner
/// segments are dropped since the separator is already there.
/// Decoding an already-decoded path returns it unchanged.
#[must_use]
pub fn decode_dir_object(object: &str) -> String {
    if !object.contains(DIR_OBJECT_SUFFIX) {
        return object.to_string();
    }

    let segments: Vec<&str> = object.split(SLASH_SEPARATOR).collect();
    let last = segments.len() - 1;
    let mut out = String::with_capacity(object.len());
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push_str(SLASH_SEPARATOR);
        }
        match segment.strip_suffix(DIR_OBJECT_SUFFIX) {
            Some(stripped) => {
                out.push_str(stripped);
                if i == last {
                    out.push_str(SLASH_SEPARATOR);
                }
            }
            None => out.push_str(segment),
        }
    }
    out
}

/// Join path elements with single separators, ignoring empty elements
#[must_use]
pub fn path_join(elements: &[&str]) -> String {
    let mut out = String::new();
    for element in elements {
        let trimmed = element.trim_matches('/');
        if trimmed.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push_str(SLASH_SEPARATOR);
        }
        out.push_str(trimmed);
    }
    out
}

/// Prefix of `id` relative to `bucket`, markers decoded
///
/// An id outside the bucket is returned as-is (decoded).
#[must_use]
pub fn bucket_relative_prefix(bucket: &str, id: &str) -> String {
    let relative = id
        .strip_prefix(bucket)
        .and_then(|rest| rest.strip_prefix(SLASH_SEPARATOR))
        .unwrap_or(id);
    decode_dir_object(relative)
}
