//! Sender identifier normalization.

/// Separates a source-channel tag from the phone number, as in `sms_13800138000`.
pub const SENDER_SEPARATOR: char = '_';

/// Map a raw sender identifier to its canonical digits-only key.
///
/// Takes the segment after the last [`SENDER_SEPARATOR`] (or the whole input
/// if there is none) and keeps only ASCII digits. An empty result means the
/// sender carries no phone number.
pub fn normalize_sender(raw: &str) -> String {
    let number = raw
        .rsplit_once(SENDER_SEPARATOR)
        .map_or(raw, |(_, tail)| tail);

    number.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_channel_prefix() {
        assert_eq!(normalize_sender("sms_13800138000"), "13800138000");
    }

    #[test]
    fn test_bare_number() {
        assert_eq!(normalize_sender("13800138000"), "13800138000");
    }

    #[test]
    fn test_strips_formatting() {
        assert_eq!(normalize_sender("+86 138-0013-8000"), "8613800138000");
        assert_eq!(normalize_sender("sim1_(415) 555-1234"), "4155551234");
    }

    #[test]
    fn test_uses_last_separator() {
        assert_eq!(normalize_sender("sms_sim2_13800138000"), "13800138000");
        // Digits before the last separator are discarded
        assert_eq!(normalize_sender("123_456"), "456");
    }

    #[test]
    fn test_no_digits() {
        assert_eq!(normalize_sender(""), "");
        assert_eq!(normalize_sender("sms_"), "");
        assert_eq!(normalize_sender("13800138000_"), "");
        assert_eq!(normalize_sender("unknown"), "");
    }

    #[test]
    fn test_non_ascii_digits_are_dropped() {
        assert_eq!(normalize_sender("sms_１３８0013"), "0013");
    }

    #[test]
    fn test_idempotent_on_digits() {
        for input in ["13800138000", "0", "00000000000", ""] {
            let once = normalize_sender(input);
            assert_eq!(normalize_sender(&once), once);
        }

        for input in ["sms_13800138000", "+1 (415) 555-1234", "a_b_c_42"] {
            let once = normalize_sender(input);
            assert_eq!(normalize_sender(&once), once);
        }
    }
}
