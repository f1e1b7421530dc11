//! URL slugs for blog posts.

use regex::Regex;

lazy_static::lazy_static! {
    /// Valid slug pattern: lowercase letters, numbers, and single hyphens
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();

    static ref DISALLOWED: Regex = Regex::new(r"[^a-z0-9\s-]").unwrap();

    static ref SEPARATORS: Regex = Regex::new(r"[\s-]+").unwrap();
}

/// Derive a slug from a post title.
///
/// Lowercases, drops everything outside `[a-z0-9]`, whitespace and `-`,
/// collapses separator runs into one hyphen and trims hyphens from both ends.
/// Returns an empty string when the title has no ASCII letters or digits.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let kept = DISALLOWED.replace_all(&lowered, "");
    let joined = SEPARATORS.replace_all(&kept, "-");
    joined.trim_matches('-').to_string()
}

pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_REGEX.is_match(slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_example_title() {
        assert_eq!(slugify("Hello, World! 2025"), "hello-world-2025");
    }

    #[test]
    fn test_slugify_collapses_and_trims_hyphens() {
        assert_eq!(slugify("  --Rust -- and   Axum--  "), "rust-and-axum");
        assert_eq!(slugify("a\t\tb\nc"), "a-b-c");
    }

    #[test]
    fn test_slugify_drops_non_ascii() {
        assert_eq!(slugify("Café Übersicht"), "caf-bersicht");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_slugify_output_is_always_valid_or_empty() {
        let titles = [
            "Hello, World! 2025",
            "-leading",
            "trailing-",
            "double--hyphen",
            "MiXeD CaSe 42",
            "   ",
            "emoji 🚀 launch",
            "under_score and.dots",
        ];
        for title in titles {
            let slug = slugify(title);
            assert!(
                slug.is_empty() || is_valid_slug(&slug),
                "{:?} produced invalid slug {:?}",
                title,
                slug
            );
            assert!(!slug.contains("--"));
            assert_eq!(slug, slug.to_lowercase());
        }
    }

    #[test]
    fn test_is_valid_slug() {
        assert!(is_valid_slug("hello-world-2025"));
        assert!(!is_valid_slug("Hello"));
        assert!(!is_valid_slug("-hello"));
        assert!(!is_valid_slug("hello--world"));
        assert!(!is_valid_slug(""));
    }
}
