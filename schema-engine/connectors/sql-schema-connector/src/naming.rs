//! Builds a migration file's name from the change segments the differ
//! produced.

const MAX_NAME_LEN: usize = 40;

/// One named change contributed to the synthesized file name, e.g.
/// `create_users`, `rename_name_to_username`.
#[derive(Debug, Clone)]
pub struct NameSegment(pub String);

/// Joins segments with `__`, then truncates the *whole* joined string to
/// [`MAX_NAME_LEN`] bytes. Truncation happens after concatenation: if the
/// first segment alone already exceeds the cap, every later segment is
/// silently truncated away rather than each segment being pre-shortened.
pub fn build_name(segments: &[NameSegment]) -> Option<String> {
    if segments.is_empty() {
        return None;
    }
    let joined = segments.iter().map(|s| s.0.as_str()).collect::<Vec<_>>().join("__");
    Some(truncate_utf8(&joined, MAX_NAME_LEN))
}

fn truncate_utf8(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_owned();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_owned()
}
