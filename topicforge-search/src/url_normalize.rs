//! URL normalisation used as the identity key for rank fusion.
//!
//! Equivalent pages that differ only in host case, a leading `www.`,
//! default port, trailing slash, fragment, parameter order, or tracking
//! parameters normalise to the same string.

use url::Url;

/// Exact tracking parameter names stripped during normalisation.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "msclkid", "mc_cid", "mc_eid", "ref", "ref_src", "si", "feature", "igshid",
];

/// Prefix shared by every UTM tracking parameter.
const UTM_PREFIX: &str = "utm_";

/// Normalise a URL for fusion identity.
///
/// Unparseable input is returned trimmed but otherwise unchanged.
///
/// # Examples
///
/// ```
/// use topicforge_search::url_normalize::normalize_url;
///
/// let a = normalize_url("https://WWW.Example.com/guide/?b=2&a=1&utm_source=x#top");
/// let b = normalize_url("https://example.com/guide?a=1&b=2");
/// assert_eq!(a, b);
/// ```
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut parsed) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    parsed.set_fragment(None);

    if matches!(
        (parsed.scheme(), parsed.port()),
        ("http", Some(80)) | ("https", Some(443))
    ) {
        let _ = parsed.set_port(None);
    }

    if let Some(host) = parsed.host_str().map(str::to_owned) {
        if let Some(bare) = host.strip_prefix("www.") {
            if !bare.is_empty() {
                let _ = parsed.set_host(Some(bare));
            }
        }
    }

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();

    if params.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(params);
    }

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(path.trim_end_matches('/'));
    }

    parsed.to_string()
}

/// Registrable-ish domain of a URL: lowercase host without a leading `www.`.
///
/// Returns `None` for unparseable URLs or URLs without a host.
pub fn domain_of(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_lowercase();
    key.starts_with(UTM_PREFIX) || TRACKING_PARAMS.contains(&key.as_str())
}
