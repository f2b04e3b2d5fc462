use crate::UrlError;
use url::Url;

/// Query parameters that only track the visitor and never select content
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "msclkid"];

/// Normalizes a URL before it is keyed, queued or fetched
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed (parsing also lowercases the host,
///    drops default ports and resolves dot segments)
/// 2. Reject anything but HTTP and HTTPS
/// 3. Require a host
/// 4. Collapse repeated slashes in the path
/// 5. Remove the fragment
/// 6. Remove tracking query parameters, keeping the order of the rest
///
/// The host is kept as-is apart from case: `www.example.com` and
/// `example.com` are different politeness partitions.
///
/// # Examples
///
/// ```
/// use sumi_tide::url::normalize_url;
///
/// let url = normalize_url("http://EXAMPLE.com:80//a//b?x=1&utm_source=feed#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/a/b?x=1");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    if url.path().contains("//") {
        let collapsed = collapse_slashes(url.path());
        url.set_path(&collapsed);
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    Ok(url)
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous_slash = false;
    for c in path.chars() {
        if c == '/' && previous_slash {
            continue;
        }
        previous_slash = c == '/';
        out.push(c);
    }
    out
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
