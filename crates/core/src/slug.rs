//! Slug normalization.
//!
//! Turns a display name into a URL-safe identifier. Uniqueness within an
//! owner's project set is handled by the server-side resolver; this module
//! only covers the pure normalization step, so the client can compute the
//! same guess for optimistic cache entries.

use uuid::Uuid;

/// Normalize a display name into a slug candidate.
///
/// Lowercases, replaces every character outside `[a-z0-9]` with `-`,
/// collapses consecutive dashes, and trims leading/trailing dashes.
///
/// A name with no alphanumeric characters at all normalizes to the empty
/// string; that case falls back to a generated `project-<hex>` slug, since
/// an empty slug would be useless as a URL segment.
///
/// # Examples
///
/// ```
/// use focal_core::slug::slugify;
///
/// assert_eq!(slugify("Marketing Site"), "marketing-site");
/// assert_eq!(slugify("Marketing Site!!"), "marketing-site");
/// assert_eq!(slugify("  --Q3--Plan--  "), "q3-plan");
/// ```
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = true; // suppress leading dashes

    for c in name.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }

    while out.ends_with('-') {
        out.pop();
    }

    if out.is_empty() {
        return fallback_slug();
    }
    out
}

/// Generated slug for names that normalize to nothing (e.g. `"!!!"`).
fn fallback_slug() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("project-{}", &id[..8])
}

/// Append a numeric suffix to a base slug: `my-project` -> `my-project-3`.
pub fn suffixed(base: &str, n: u32) -> String {
    format!("{base}-{n}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_dashes() {
        assert_eq!(slugify("Marketing Site"), "marketing-site");
    }

    #[test]
    fn collapses_consecutive_separators() {
        assert_eq!(slugify("A  --  B"), "a-b");
        assert_eq!(slugify("Marketing Site!!"), "marketing-site");
    }

    #[test]
    fn trims_leading_and_trailing() {
        assert_eq!(slugify("  hello  "), "hello");
        assert_eq!(slugify("--x--"), "x");
    }

    #[test]
    fn keeps_digits() {
        assert_eq!(slugify("Q3 2025 Plan"), "q3-2025-plan");
    }

    #[test]
    fn no_alphanumerics_falls_back() {
        let s = slugify("!!!");
        assert!(s.starts_with("project-"));
        assert_eq!(s.len(), "project-".len() + 8);
    }

    #[test]
    fn output_alphabet_is_clean() {
        for input in ["  Weird &*( Name 42 ", "ALL CAPS", "a", "ünïcödé"] {
            let s = slugify(input);
            assert!(!s.is_empty());
            assert!(!s.starts_with('-') && !s.ends_with('-'));
            assert!(!s.contains("--"));
            assert!(s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }
    }

    #[test]
    fn suffix_format() {
        assert_eq!(suffixed("my-project", 1), "my-project-1");
    }
}
