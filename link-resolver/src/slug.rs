//! Team name to URL handle derivations.
//!
//! Two derivations have been used over the life of the product. Teams created
//! before slugs were persisted are matched against both, so each stays a
//! separate function.

const FALLBACK_SLUG: &str = "team";

/// Current derivation: lowercase, keep only `[a-z0-9]`.
pub fn normalize_slug(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect();

    if cleaned.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        cleaned
    }
}

/// Older derivation: every run of characters outside `[a-z0-9]` becomes a
/// single `-`, with leading and trailing dashes removed.
pub fn legacy_slug(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut pending_dash = false;

    for c in lowered.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// True when either derivation of `name` equals `candidate`.
pub fn name_matches_slug(name: &str, candidate: &str) -> bool {
    normalize_slug(name) == candidate || legacy_slug(name) == candidate
}
