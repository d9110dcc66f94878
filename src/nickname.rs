//! Temporary nickname formatting
//!
//! Temporary nicknames take the form `"<name> <NNN>"` where `NNN` is a
//! zero-padded counter between 001 and 999.

use crate::error::{NicknameError, NicknameResult};
use rand::Rng;
use std::collections::HashSet;

/// Discord's nickname length limit, in characters
pub const MAX_NICKNAME_CHARS: usize = 32;
/// Space plus three digits
const SUFFIX_CHARS: usize = 4;
/// Longest base name that still fits once the suffix is appended
pub const MAX_BASE_CHARS: usize = MAX_NICKNAME_CHARS - SUFFIX_CHARS;
/// Upper bound of the counter suffix
pub const MAX_COUNTER: u16 = 999;
/// Redraws of the counter before accepting a collision
const SUFFIX_ATTEMPTS: usize = 16;

/// Starter names used when the database is unavailable
pub const DEFAULT_FALLBACK_NICKNAMES: &[&str] = &[
    "Subject", "Operator", "Agent", "Specimen", "Entity", "Unit", "Asset", "Contact", "Target",
    "Source",
];

/// Trim and validate nickname text before it is stored
///
/// # Errors
///
/// Returns `InvalidNickname` if the text is empty after trimming or too long
/// to carry the counter suffix.
pub fn normalize(text: &str) -> NicknameResult<String> {
    let cleaned = text.trim();
    if cleaned.is_empty() {
        return Err(NicknameError::InvalidNickname(
            "Nickname cannot be empty.".to_string(),
        ));
    }
    if cleaned.chars().count() > MAX_BASE_CHARS {
        return Err(NicknameError::InvalidNickname(format!(
            "Nickname must be at most {MAX_BASE_CHARS} characters."
        )));
    }
    Ok(cleaned.to_string())
}

/// Case-folded form used to compare pool entries
///
/// Unicode aware, so `"Élan"` and `"élan"` share a key.
#[must_use]
pub fn match_key(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Format a base name with a counter, e.g. `("Baron", 7)` -> `"Baron 007"`
#[must_use]
pub fn format_nickname(base: &str, counter: u16) -> String {
    let base: String = base.trim().chars().take(MAX_BASE_CHARS).collect();
    format!("{base} {:03}", counter.clamp(1, MAX_COUNTER))
}

/// Format a base name with a random counter, avoiding names already in use
///
/// Uniqueness is best effort: after a bounded number of draws the last
/// candidate is returned even if it collides.
#[must_use]
pub fn assign(base: &str, taken: &HashSet<String>) -> String {
    let mut rng = rand::rng();
    let mut candidate = format_nickname(base, rng.random_range(1..=MAX_COUNTER));
    for _ in 1..SUFFIX_ATTEMPTS {
        if !taken.contains(&candidate) {
            break;
        }
        candidate = format_nickname(base, rng.random_range(1..=MAX_COUNTER));
    }
    candidate
}

/// Whether a nickname has the temporary `"<name> <NNN>"` shape
#[must_use]
pub fn is_temporary(nickname: &str) -> bool {
    nickname.rsplit_once(' ').is_some_and(|(base, digits)| {
        !base.is_empty() && digits.len() == 3 && digits.bytes().all(|b| b.is_ascii_digit())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_pads_counter() {
        assert_eq!(format_nickname("Baron", 1), "Baron 001");
        assert_eq!(format_nickname("Operator", 42), "Operator 042");
        assert_eq!(format_nickname("Naib", 999), "Naib 999");
    }

    #[test]
    fn test_format_clamps_counter() {
        assert_eq!(format_nickname("Baron", 0), "Baron 001");
        assert_eq!(format_nickname("Baron", 5000), "Baron 999");
    }

    #[test]
    fn test_format_fits_discord_limit() {
        let long = "X".repeat(60);
        let formatted = format_nickname(&long, 12);
        assert_eq!(formatted.chars().count(), MAX_NICKNAME_CHARS);
        assert!(formatted.ends_with(" 012"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Baron ").unwrap(), "Baron");
        assert!(matches!(
            normalize("   "),
            Err(NicknameError::InvalidNickname(_))
        ));
        assert!(matches!(
            normalize(&"a".repeat(MAX_BASE_CHARS + 1)),
            Err(NicknameError::InvalidNickname(_))
        ));
        assert!(normalize(&"a".repeat(MAX_BASE_CHARS)).is_ok());
    }

    #[test]
    fn test_assign_shape() {
        let nickname = assign("Operator", &HashSet::new());
        assert!(nickname.starts_with("Operator "));
        assert!(is_temporary(&nickname));
    }

    #[test]
    fn test_assign_avoids_taken_names() {
        // Nearly exhausted: the result is still well-formed even on collision
        let taken: HashSet<String> = (1..=MAX_COUNTER)
            .filter(|n| *n != 500)
            .map(|n| format_nickname("Unit", n))
            .collect();
        let nickname = assign("Unit", &taken);
        assert!(is_temporary(&nickname));

        let nearly_free: HashSet<String> = [format_nickname("Unit", 1)].into_iter().collect();
        for _ in 0..50 {
            assert_ne!(assign("Unit", &nearly_free), "Unit 001");
        }
    }

    #[test]
    fn test_match_key_folds_unicode() {
        assert_eq!(match_key(" Élan "), match_key("élan"));
        assert_eq!(match_key("ΣΟΦΙΑ"), match_key("σοφια"));
        assert_ne!(match_key("Baron"), match_key("Baroness"));
    }

    #[test]
    fn test_is_temporary() {
        assert!(is_temporary("Baron 001"));
        assert!(is_temporary("Big Baron 120"));
        assert!(!is_temporary("Alice"));
        assert!(!is_temporary("Baron 01"));
        assert!(!is_temporary(" 001"));
    }
}
