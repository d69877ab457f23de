//! Inbound payload sanitization.
//!
//! The server never errors on malformed profile fields; it trims, truncates
//! and falls back to defaults so a join can always proceed.

use super::types::{BoundsHint, JoinProfile};

/// Maximum rendered display-name length.
pub const MAX_NAME_LENGTH: usize = 24;
/// Maximum stored avatar reference length.
pub const MAX_AVATAR_LENGTH: usize = 256;

/// Sanitize a display name: trim, strip control characters, cap length,
/// fall back to "Guest" when nothing printable remains.
#[must_use]
pub fn sanitize_name(raw: Option<&str>) -> String {
    let cleaned: String = raw
        .unwrap_or("")
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_LENGTH)
        .collect();
    if cleaned.is_empty() {
        "Guest".to_string()
    } else {
        cleaned
    }
}

/// Sanitize an avatar reference; empty or oversized values become empty.
#[must_use]
pub fn sanitize_avatar(raw: Option<&str>) -> String {
    let trimmed = raw.unwrap_or("").trim();
    if trimmed.len() > MAX_AVATAR_LENGTH {
        String::new()
    } else {
        trimmed.to_string()
    }
}

/// Sanitize chat content: trim, cap at `max_length` characters. Returns
/// `None` for content that is empty after trimming (silently dropped).
#[must_use]
pub fn sanitize_chat_content(raw: &str, max_length: usize) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_length).collect())
}

/// Display name from a join profile after sanitization.
#[must_use]
pub fn profile_name(profile: &JoinProfile) -> String {
    sanitize_name(profile.raw_name())
}

/// Normalized boss-arena bounds. Client hints are advisory; the server
/// enforces minimum playable dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedBounds {
    pub width: f64,
    pub height: f64,
    pub top: f64,
}

/// Clamp a bounds hint into a playable arena.
#[must_use]
pub fn normalize_bounds(
    hint: Option<BoundsHint>,
    default_width: f64,
    default_height: f64,
    default_top: f64,
) -> NormalizedBounds {
    let hint = hint.unwrap_or_default();
    let width = hint
        .width
        .filter(|w| w.is_finite())
        .unwrap_or(default_width)
        .max(480.0);
    let height = hint
        .height
        .filter(|h| h.is_finite())
        .unwrap_or(default_height)
        .max(360.0);
    let top = hint
        .top
        .filter(|t| t.is_finite())
        .unwrap_or(default_top)
        .clamp(0.0, height - 120.0);
    NormalizedBounds { width, height, top }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_sanitization() {
        assert_eq!(sanitize_name(Some("  Rook  ")), "Rook");
        assert_eq!(sanitize_name(Some("")), "Guest");
        assert_eq!(sanitize_name(None), "Guest");
        assert_eq!(sanitize_name(Some("\u{0000}\u{0007}")), "Guest");
        let long = "x".repeat(100);
        assert_eq!(sanitize_name(Some(&long)).len(), MAX_NAME_LENGTH);
    }

    #[test]
    fn chat_content_empty_is_dropped() {
        assert_eq!(sanitize_chat_content("   ", 280), None);
        assert_eq!(
            sanitize_chat_content("  hi there ", 280).as_deref(),
            Some("hi there")
        );
        let long = "y".repeat(400);
        assert_eq!(sanitize_chat_content(&long, 280).unwrap().len(), 280);
    }

    #[test]
    fn bounds_normalization_enforces_minimums() {
        let b = normalize_bounds(
            Some(BoundsHint {
                width: Some(100.0),
                height: Some(100.0),
                top: Some(5000.0),
            }),
            1100.0,
            600.0,
            200.0,
        );
        assert_eq!(b.width, 480.0);
        assert_eq!(b.height, 360.0);
        assert_eq!(b.top, 240.0);

        let b = normalize_bounds(None, 1100.0, 600.0, 200.0);
        assert_eq!(
            b,
            NormalizedBounds {
                width: 1100.0,
                height: 600.0,
                top: 200.0
            }
        );
    }

    #[test]
    fn non_finite_hints_fall_back() {
        let b = normalize_bounds(
            Some(BoundsHint {
                width: Some(f64::NAN),
                height: Some(f64::INFINITY),
                top: None,
            }),
            1100.0,
            600.0,
            200.0,
        );
        assert_eq!(b.width, 1100.0);
        assert_eq!(b.height, 600.0);
    }
}
