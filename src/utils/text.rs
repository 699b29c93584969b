use sha2::{Digest, Sha256};

/// Hard cap applied to clamped descriptions, ellipsis marker included.
pub const DESCRIPTION_MAX_CHARS: usize = 300;

/// Collapse all whitespace runs (including newlines) into single spaces
/// and trim the ends.
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize free text for display: collapsed whitespace, at most two
/// sentence-terminated clauses, hard length cap with an ellipsis marker.
pub fn clamp_description(input: &str) -> String {
    let collapsed = collapse_whitespace(input);
    if collapsed.is_empty() {
        return collapsed;
    }

    let mut sentence_ends = 0usize;
    let mut cut = collapsed.len();
    for (idx, ch) in collapsed.char_indices() {
        if matches!(ch, '.' | '!' | '?') {
            sentence_ends += 1;
            if sentence_ends == 2 {
                cut = idx + ch.len_utf8();
                break;
            }
        }
    }
    let mut clamped = collapsed[..cut].trim_end().to_string();

    if clamped.chars().count() > DESCRIPTION_MAX_CHARS {
        clamped = clamped
            .chars()
            .take(DESCRIPTION_MAX_CHARS - 1)
            .collect::<String>()
            .trim_end()
            .to_string();
        clamped.push('…');
    }
    clamped
}

/// Normalization used to join user-task display names against master-data
/// step names: trim, collapse internal whitespace, ASCII case-fold.
/// Punctuation is kept on purpose; punctuation drift is treated as a real
/// mismatch and logged by the caller.
pub fn normalize_for_match(input: &str) -> String {
    collapse_whitespace(input).to_ascii_lowercase()
}

/// Sanitize a display name into a filename-safe slug: lowercase ASCII
/// alphanumerics with single hyphens between runs.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_sep = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('-');
            }
            pending_sep = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("unnamed");
    }
    slug
}

/// Sanitize a string into a valid XML NCName: first char letter or
/// underscore, rest alphanumeric, underscore, hyphen, or period.
pub fn sanitize_ncname(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for (i, ch) in s.chars().enumerate() {
        if i == 0 {
            if ch.is_ascii_alphabetic() || ch == '_' {
                result.push(ch);
            } else {
                result.push('_');
                if ch.is_ascii_alphanumeric() {
                    result.push(ch);
                }
            }
        } else if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || ch == '.' {
            result.push(ch);
        } else {
            result.push('_');
        }
    }
    if result.is_empty() {
        result.push_str("_id");
    }
    result
}

/// First 4 bytes (8 hex chars) of SHA-256 — deterministic short suffix used
/// to disambiguate same-named subprocess files.
pub fn short_hash(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..4])
}
