use crate::url::registered_domain;
use url::Url;

/// Chooses the URL that represents a redirect pair
///
/// The representative is the URL a reader would call canonical:
///
/// 1. Different registered domains: the target
/// 2. Permanent redirect: the source if it is a site root, else the target
/// 3. Temporary redirect from a root to a deeper page: the source
/// 4. Temporary redirect from a deeper page to a root: the target
/// 5. Temporary redirect between two deeper pages on one host: the one
///    with fewer path segments
/// 6. Otherwise the one whose host has fewer labels
///
/// Ties keep the source. Unparseable input returns the source unchanged.
///
/// # Examples
///
/// ```
/// use sumi_tide::url::choose_repr;
///
/// // A homepage that moved temporarily to a landing page stays the homepage
/// let repr = choose_repr("http://example.com/", "http://example.com/landing?x=1", true);
/// assert_eq!(repr, "http://example.com/");
/// ```
pub fn choose_repr(src: &str, dst: &str, temp: bool) -> String {
    let (src_url, dst_url) = match (Url::parse(src), Url::parse(dst)) {
        (Ok(s), Ok(d)) => (s, d),
        _ => return src.to_string(),
    };
    let (src_host, dst_host) = match (src_url.host_str(), dst_url.host_str()) {
        (Some(s), Some(d)) => (s.to_lowercase(), d.to_lowercase()),
        _ => return src.to_string(),
    };

    if registered_domain(&src_host) != registered_domain(&dst_host) {
        return dst.to_string();
    }

    let src_root = is_root(&src_url);
    let dst_root = is_root(&dst_url);

    if !temp {
        let chosen = if src_root { src } else { dst };
        return chosen.to_string();
    }

    let keep_dst = match (src_root, dst_root) {
        (true, false) => false,
        (false, true) => true,
        (false, false) if src_host == dst_host => {
            path_segments(&dst_url) < path_segments(&src_url)
        }
        _ => label_count(&dst_host) < label_count(&src_host),
    };

    let chosen = if keep_dst { dst } else { src };
    chosen.to_string()
}

fn is_root(url: &Url) -> bool {
    (url.path().is_empty() || url.path() == "/") && url.query().is_none()
}

fn path_segments(url: &Url) -> usize {
    url.path().split('/').filter(|s| !s.is_empty()).count()
}

fn label_count(host: &str) -> usize {
    host.split('.').count()
}
