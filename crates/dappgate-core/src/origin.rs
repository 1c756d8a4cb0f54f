//! Origin extraction for tab URLs.
//!
//! Follows the WHATWG URL origin rules via the `url` crate: scheme, host and
//! non-default port. URLs with an opaque origin (`about:blank`, `data:`,
//! `file:` and the like) have no origin and never match a connected site.

use url::Url;

/// Extract the origin of a URL, or `None` if it is unparsable or opaque.
pub fn origin_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let origin = url.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_path_query_and_fragment() {
        assert_eq!(
            origin_of("https://app.uniswap.org/swap?chain=1#top").as_deref(),
            Some("https://app.uniswap.org")
        );
    }

    #[test]
    fn drops_default_ports_only() {
        assert_eq!(
            origin_of("https://example.com:443/").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(
            origin_of("https://example.com:0443/").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(
            origin_of("http://localhost:3000/dapp").as_deref(),
            Some("http://localhost:3000")
        );
    }

    #[test]
    fn lowercases_scheme_and_host() {
        assert_eq!(
            origin_of("HTTPS://Example.COM/Path").as_deref(),
            Some("https://example.com")
        );
    }

    #[test]
    fn handles_userinfo_and_ipv6() {
        assert_eq!(
            origin_of("https://user:pw@example.com/").as_deref(),
            Some("https://example.com")
        );
        assert_eq!(
            origin_of("http://[::1]:8545/").as_deref(),
            Some("http://[::1]:8545")
        );
    }

    #[test]
    fn backslash_ends_the_host() {
        assert_eq!(
            origin_of("http://a.example\\evil/").as_deref(),
            Some("http://a.example")
        );
    }

    #[test]
    fn out_of_range_port_is_rejected() {
        assert_eq!(origin_of("https://example.com:99999/"), None);
    }

    #[test]
    fn urls_without_authority_have_no_origin() {
        assert_eq!(origin_of("about:blank"), None);
        assert_eq!(origin_of("file:///etc/hosts"), None);
        assert_eq!(origin_of("data:text/html,hi"), None);
        assert_eq!(origin_of(""), None);
    }
}
