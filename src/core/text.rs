/// Text helpers shared by the indexers and the renderer.
///
/// All lengths are in characters, not bytes.

/// Keep the first `head` and last `tail` characters of `s`, joined by
/// `...`, when `s` is longer than `head + tail`.
pub fn abbrev_text(s: &str, head: usize, tail: usize) -> String {
    let len = s.chars().count();
    if len <= head + tail {
        return s.to_string();
    }
    let start: String = s.chars().take(head).collect();
    let end: String = s.chars().skip(len - tail).collect();
    format!("{start}...{end}")
}

/// Clip `s` to `max_len` characters, ending with `…` when cut. A zero
/// limit disables clipping.
pub fn clip_line(s: &str, max_len: usize) -> String {
    if max_len == 0 || s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_len - 1).collect();
    out.push('…');
    out
}

/// Collapse runs of whitespace to a single space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove every whitespace character.
pub fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}
