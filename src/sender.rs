//! Sender address extraction from raw `From` header values

use mail_parser::MessageParser;
use once_cell::sync::Lazy;
use regex::Regex;

/// Bare address anywhere in the value, e.g. `alice@example.com (Alice)`
static BARE_ADDR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[^\s<>()"',;:]+@[^\s<>()"',;:]+"#).unwrap());

/// Extract the bare email address from a `From` header value.
///
/// With several mailboxes the first one wins. Quoted display names are
/// never mistaken for the address. Returns `None` when nothing address-like
/// is present. Never panics on malformed input.
pub fn extract_address(raw: &str) -> Option<String> {
    // keep the value on one header line
    let raw = raw.replace(['\r', '\n'], " ");
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let header = format!("From: {}\r\n\r\n", raw);
    let parsed = MessageParser::default().parse(header.as_bytes());
    let first = parsed
        .as_ref()
        .and_then(|message| message.from())
        .and_then(|from| from.first())
        .and_then(|addr| addr.address())
        .map(str::trim)
        .filter(|address| address.contains('@'));

    if let Some(address) = first {
        return Some(address.to_string());
    }

    BARE_ADDR.find(raw).map(|m| m.as_str().to_string())
}

/// Domain part of an address: everything after the last `@`.
///
/// `None` when there is no `@` or nothing follows it.
pub fn domain_of(address: &str) -> Option<&str> {
    let (_, domain) = address.rsplit_once('@')?;
    let domain = domain.trim();
    (!domain.is_empty()).then_some(domain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_display_name_form() {
        assert_eq!(
            extract_address("Alice <alice@work.com>").as_deref(),
            Some("alice@work.com")
        );
        assert_eq!(
            extract_address("\"Doe, John\" <john.doe@college.com>").as_deref(),
            Some("john.doe@college.com")
        );
    }

    #[test]
    fn test_bare_address() {
        assert_eq!(
            extract_address("alice@work.com").as_deref(),
            Some("alice@work.com")
        );
        assert_eq!(
            extract_address("  alice@work.com (Alice) ").as_deref(),
            Some("alice@work.com")
        );
    }

    #[test]
    fn test_no_address() {
        assert_eq!(extract_address(""), None);
        assert_eq!(extract_address("   "), None);
        assert_eq!(extract_address("Undisclosed recipients"), None);
        assert_eq!(extract_address("Nobody <>"), None);
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("alice@work.com"), Some("work.com"));
        assert_eq!(domain_of("weird@name@linkedin.com"), Some("linkedin.com"));
        assert_eq!(domain_of("localpart"), None);
        assert_eq!(domain_of("trailing@"), None);
    }

    #[test]
    fn test_angle_without_at_has_no_domain() {
        let domain = extract_address("Postmaster <postmaster>")
            .as_deref()
            .and_then(domain_of)
            .map(str::to_string);
        assert_eq!(domain, None);
    }

    #[test]
    fn test_first_mailbox_wins() {
        assert_eq!(
            extract_address("Alice <alice@work.com>, Bob <bob@college.com>").as_deref(),
            Some("alice@work.com")
        );
        assert_eq!(
            extract_address("alice@work.com, bob@college.com").as_deref(),
            Some("alice@work.com")
        );
    }

    #[test]
    fn test_address_in_quoted_name_is_ignored() {
        assert_eq!(
            extract_address("\"bob@college.com\" <alice@work.com>").as_deref(),
            Some("alice@work.com")
        );
        assert_eq!(
            extract_address("\"Team <ops@college.com>\" <team@work.com>").as_deref(),
            Some("team@work.com")
        );
    }

    #[test]
    fn test_line_breaks_do_not_escape_header() {
        assert_eq!(
            extract_address("Alice\r\n <alice@work.com>").as_deref(),
            Some("alice@work.com")
        );
    }

    proptest! {
        #[test]
        fn prop_display_name_yields_address(
            name in "[A-Za-z][A-Za-z ]{0,20}",
            user in "[a-z0-9._]{1,16}",
            domain in "[a-z0-9]{1,12}\\.(com|org|net)",
        ) {
            let address = format!("{}@{}", user, domain);
            let header = format!("{} <{}>", name, address);
            prop_assert_eq!(extract_address(&header), Some(address.clone()));
            prop_assert_eq!(domain_of(&address), Some(domain.as_str()));
        }

        #[test]
        fn prop_bare_address_unchanged(
            user in "[a-z0-9][a-z0-9_+-]{0,15}",
            domain in "[a-z0-9-]{1,12}\\.[a-z]{2,4}",
        ) {
            let address = format!("{}@{}", user, domain);
            prop_assert_eq!(extract_address(&address), Some(address.clone()));
        }

        #[test]
        fn prop_never_panics(raw in ".*") {
            let _ = extract_address(&raw).as_deref().map(domain_of);
        }
    }
}
