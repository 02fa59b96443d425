//! URL canonicalization and article identity.
//!
//! Two links to the same article must compare equal after
//! [`canonical_url`], and [`url_uid`] turns that canonical form into the short
//! identifier stored in the `UID` column of the destination database.

use sha2::{Digest, Sha256};
use url::Url;

/// Query parameters that only carry click or campaign tracking.
const TRACKING_PARAMS: [&str; 8] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_name",
    "gclid",
    "fbclid",
];

/// Hex characters kept from the digest.
pub const UID_LEN: usize = 12;

/// Normalize a URL for deduplication and storage.
///
/// - lowercases scheme and host
/// - drops tracking parameters and the fragment
/// - sorts the remaining query pairs, keeping repeated keys
/// - trims trailing slashes from the path (`/` if that leaves nothing)
///
/// Empty input yields an empty string; anything that does not parse as an
/// absolute URL is returned as given.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(
///     canonical_url("HTTPS://Example.COM/a/?b=2&utm_source=x&a=1#top"),
///     "https://example.com/a?a=1&b=2"
/// );
/// ```
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut url = match Url::parse(trimmed) {
        Ok(u) => u,
        Err(_) => return raw.to_string(),
    };

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.to_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    url.set_fragment(None);

    if !url.cannot_be_a_base() {
        let path = url.path().trim_end_matches('/').to_string();
        url.set_path(if path.is_empty() { "/" } else { &path });
    }

    url.to_string()
}

/// Short, stable identifier for a canonical URL.
///
/// The first [`UID_LEN`] hex characters of the SHA-256 digest of the
/// canonical form's bytes.
pub fn url_uid(canonical: &str) -> String {
    let digest = Sha256::digest(canonical.as_bytes());
    let mut uid = hex::encode(digest);
    uid.truncate(UID_LEN);
    uid
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_lowercases_host_and_drops_fragment() {
        assert_eq!(
            canonical_url("HTTPS://Example.COM/News/Story#comments"),
            "https://example.com/News/Story"
        );
    }

    #[test]
    fn test_strips_tracking_and_sorts_query() {
        assert_eq!(
            canonical_url(
                "https://example.com/a?utm_source=rss&b=2&UTM_Medium=feed&a=1&gclid=x&fbclid=y"
            ),
            "https://example.com/a?a=1&b=2"
        );
        assert_eq!(
            canonical_url("https://example.com/a?b=2&a=1"),
            canonical_url("https://example.com/a?a=1&b=2")
        );
    }

    #[test]
    fn test_keeps_repeated_keys() {
        assert_eq!(
            canonical_url("https://example.com/?tag=b&tag=a"),
            "https://example.com/?tag=a&tag=b"
        );
    }

    #[test]
    fn test_only_tracking_params_removes_question_mark() {
        assert_eq!(
            canonical_url("https://example.com/post/?utm_campaign=x"),
            "https://example.com/post"
        );
    }

    #[test]
    fn test_trailing_slashes_and_root() {
        assert_eq!(canonical_url("https://example.com/a//"), "https://example.com/a");
        assert_eq!(canonical_url("https://example.com"), "https://example.com/");
        assert_eq!(canonical_url("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn test_malformed_and_empty_input() {
        assert_eq!(canonical_url(""), "");
        assert_eq!(canonical_url("   "), "");
        assert_eq!(canonical_url("not a url"), "not a url");
        assert_eq!(canonical_url("/relative/path?x=1"), "/relative/path?x=1");
        assert_eq!(canonical_url("http://[::1"), "http://[::1");
    }

    #[test]
    fn test_idempotent_on_samples() {
        for u in [
            "https://Example.com/a/b/?z=1&utm_term=q&a=hello%20world#x",
            "http://example.com:8080/?q=a+b&q=c",
            "https://example.com/%7Euser/",
            "mailto:someone@example.com",
            "garbage",
            "",
        ] {
            let once = canonical_url(u);
            assert_eq!(canonical_url(&once), once, "not idempotent for {u}");
        }
    }

    #[test]
    fn test_uid_is_deterministic_and_short() {
        let a = url_uid(&canonical_url("https://example.com/a?b=2&a=1#frag"));
        let b = url_uid(&canonical_url("HTTPS://EXAMPLE.com/a/?a=1&b=2&utm_source=x"));
        assert_eq!(a, b);
        assert_eq!(a.len(), UID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_uid_no_collisions_in_corpus() {
        let uids: HashSet<String> = (0..10_000)
            .map(|i| url_uid(&canonical_url(&format!("https://example.com/articles/{i}"))))
            .collect();
        assert_eq!(uids.len(), 10_000);
    }

    proptest! {
        #[test]
        fn prop_canonical_url_is_idempotent(
            host in "[a-zA-Z][a-zA-Z0-9]{0,10}\\.(com|org|io)",
            segments in proptest::collection::vec("[a-zA-Z0-9_~-]{0,8}", 0..4),
            params in proptest::collection::vec(("(utm_source|gclid|[a-z]{1,5})", "[a-zA-Z0-9 %+&=]{0,6}"), 0..5),
            trailing in proptest::bool::ANY,
            fragment in proptest::option::of("[a-z]{1,6}"),
        ) {
            let mut raw = format!("https://{host}/{}", segments.join("/"));
            if trailing {
                raw.push('/');
            }
            if !params.is_empty() {
                let query: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
                raw.push('?');
                raw.push_str(&query.join("&"));
            }
            if let Some(f) = fragment {
                raw.push('#');
                raw.push_str(&f);
            }
            let once = canonical_url(&raw);
            prop_assert_eq!(canonical_url(&once), once);
        }

        #[test]
        fn prop_equal_canonical_forms_share_uid(path in "[a-z]{1,10}", a in "[a-z]{1,4}", b in "[a-z]{1,4}") {
            let x = canonical_url(&format!("https://example.com/{path}?a={a}&b={b}&utm_source=rss"));
            let y = canonical_url(&format!("https://EXAMPLE.com/{path}/?b={b}&a={a}#top"));
            prop_assert_eq!(&x, &y);
            prop_assert_eq!(url_uid(&x), url_uid(&y));
        }
    }
}
