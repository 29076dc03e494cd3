//! Picks the extension appended to a new remote key.

use crate::models::policy::ExtensionPolicy;

/// Resolve the extension for a new key, first match wins:
///
/// 1. the forced extension,
/// 2. the original file's extension, unless ignored,
/// 3. the content-derived guess, if guessing is on,
/// 4. nothing.
///
/// Non-empty results always start with a single `.`.
pub fn resolve_extension(
    policy: &ExtensionPolicy,
    original: Option<&str>,
    guessed: Option<&str>,
) -> String {
    fn non_empty(ext: Option<&str>) -> Option<&str> {
        ext.filter(|e| !e.trim_start_matches('.').is_empty())
    }

    let chosen = non_empty(policy.force.as_deref())
        .or_else(|| {
            (!policy.ignore_original)
                .then(|| non_empty(original))
                .flatten()
        })
        .or_else(|| policy.guess.then(|| non_empty(guessed)).flatten());

    chosen.map(with_leading_dot).unwrap_or_default()
}

fn with_leading_dot(ext: &str) -> String {
    format!(".{}", ext.trim_start_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(force: Option<&str>, ignore_original: bool, guess: bool) -> ExtensionPolicy {
        ExtensionPolicy {
            force: force.map(str::to_string),
            ignore_original,
            guess,
        }
    }

    #[test]
    fn precedence_without_force() {
        // (has original, ignore original, guess) -> expected
        let cases = [
            ((false, false, false), ""),
            ((false, false, true), ".gif"),
            ((false, true, false), ""),
            ((false, true, true), ".gif"),
            ((true, false, false), ".png"),
            ((true, false, true), ".png"),
            ((true, true, false), ""),
            ((true, true, true), ".gif"),
        ];
        for ((has_original, ignore, guess), expected) in cases {
            let original = has_original.then_some(".png");
            let got = resolve_extension(&policy(None, ignore, guess), original, Some(".gif"));
            assert_eq!(got, expected, "original={has_original} ignore={ignore} guess={guess}");
        }
    }

    #[test]
    fn force_always_wins() {
        for ignore in [false, true] {
            for guess in [false, true] {
                let got = resolve_extension(&policy(Some("webp"), ignore, guess), Some(".png"), Some(".gif"));
                assert_eq!(got, ".webp");
            }
        }
    }

    #[test]
    fn all_sources_absent_yields_empty() {
        assert_eq!(resolve_extension(&policy(None, false, true), None, None), "");
    }

    #[test]
    fn dot_is_normalized() {
        assert_eq!(resolve_extension(&policy(Some("..tar"), false, false), None, None), ".tar");
        assert_eq!(resolve_extension(&policy(None, false, false), Some("txt"), None), ".txt");
        assert_eq!(resolve_extension(&policy(Some("."), false, true), None, Some("gif")), ".gif");
    }
}
