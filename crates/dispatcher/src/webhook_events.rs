//! Maps the assorted event-type strings different providers send on their
//! webhook callbacks onto one closed, canonical set. Deliberately total:
//! anything unrecognized maps to `"custom.event"` rather than being
//! rejected, so a provider adding a new callback type never breaks
//! ingestion.

/// Canonical event types dispatch_events.event_type is allowed to hold.
pub const DELIVERED: &str = "delivered";
pub const BOUNCED: &str = "bounced";
pub const COMPLAINED: &str = "complained";
pub const OPENED: &str = "opened";
pub const CLICKED: &str = "clicked";
pub const CUSTOM: &str = "custom.event";

/// Normalizes a provider's raw event-type string to one of the canonical
/// constants above. Matching is case-insensitive and covers the SES,
/// Resend and Telnyx callback vocabularies this system's modules front.
pub fn canonical_event_type(raw: &str) -> &'static str {
    match raw.to_ascii_lowercase().as_str() {
        "delivery" | "delivered" | "message.sent" => DELIVERED,
        "bounce" | "bounced" | "message.bounced" => BOUNCED,
        "complaint" | "complained" | "message.complained" => COMPLAINED,
        "open" | "opened" | "message.opened" => OPENED,
        "click" | "clicked" | "message.clicked" => CLICKED,
        _ => CUSTOM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_provider_strings_map_to_canonical_set() {
        assert_eq!(canonical_event_type("Bounce"), BOUNCED);
        assert_eq!(canonical_event_type("message.opened"), OPENED);
    }

    #[test]
    fn unknown_strings_fall_back_to_custom_rather_than_erroring() {
        assert_eq!(canonical_event_type("some-new-provider-thing"), CUSTOM);
    }
}
