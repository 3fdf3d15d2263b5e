//! Request handlers for the `/api/1.0/...` and `/public/...` surfaces.
//!
//! Every handler draws a tid from the stamper first, so even a 404 reply
//! carries the operation's place in the global order. Only mutations are
//! journaled.

pub mod layers;
pub mod public;
pub mod records;
pub mod search;
pub mod system;

/// API resource paths end in `.json`; the suffix is part of the path,
/// not of the name.
pub(crate) fn strip_json_suffix(segment: &str) -> Option<&str> {
    segment.strip_suffix(".json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_suffix() {
        assert_eq!(strip_json_suffix("cities.json"), Some("cities"));
        assert_eq!(strip_json_suffix("a/b.json"), Some("a/b"));
        assert_eq!(strip_json_suffix("cities"), None);
    }
}
