use std::net::IpAddr;
use url::Url;

/// Second-level labels under which country registries hand out domains
const SECOND_LEVEL_SUFFIXES: &[&str] = &["ac", "co", "com", "edu", "gov", "net", "or", "org"];

/// Extracts the lowercase host of a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_tide::url::extract_host;
///
/// let url = Url::parse("https://Blog.Example.com:8080/post").unwrap();
/// assert_eq!(extract_host(&url), Some("blog.example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the registered domain of a host
///
/// Uses the last two labels, or the last three when the second-to-last label
/// is a common country second-level suffix (`example.co.uk`). IP addresses
/// and single-label hosts are returned unchanged.
///
/// # Examples
///
/// ```
/// use sumi_tide::url::registered_domain;
///
/// assert_eq!(registered_domain("news.example.com"), "example.com");
/// assert_eq!(registered_domain("www.example.co.uk"), "example.co.uk");
/// assert_eq!(registered_domain("10.0.0.1"), "10.0.0.1");
/// ```
pub fn registered_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_lowercase();
    if host.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>().is_ok() {
        return host;
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host;
    }

    let n = labels.len();
    let keep = if labels[n - 1].len() == 2 && SECOND_LEVEL_SUFFIXES.contains(&labels[n - 2]) {
        3
    } else {
        2
    };
    labels[n - keep..].join(".")
}

/// Returns the registered domain of a URL's host
pub fn url_domain(url: &Url) -> Option<String> {
    url.host_str().map(registered_domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_host_lowercases_and_drops_port() {
        let url = Url::parse("https://EXAMPLE.com:8080/path?q=1").unwrap();
        assert_eq!(extract_host(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_registered_domain_plain() {
        assert_eq!(registered_domain("example.com"), "example.com");
        assert_eq!(registered_domain("a.b.example.com"), "example.com");
        assert_eq!(registered_domain("Example.COM."), "example.com");
    }

    #[test]
    fn test_registered_domain_country_suffix() {
        assert_eq!(registered_domain("shop.example.com.au"), "example.com.au");
        assert_eq!(registered_domain("example.co.uk"), "example.co.uk");
        // "co" is only a suffix under a two-letter TLD
        assert_eq!(registered_domain("www.co.com"), "co.com");
    }

    #[test]
    fn test_registered_domain_ip_and_single_label() {
        assert_eq!(registered_domain("192.168.1.10"), "192.168.1.10");
        assert_eq!(registered_domain("[::1]"), "[::1]");
        assert_eq!(registered_domain("localhost"), "localhost");
    }

    #[test]
    fn test_url_domain() {
        let url = Url::parse("http://img.cdn.example.org/a.png").unwrap();
        assert_eq!(url_domain(&url), Some("example.org".to_string()));
    }
}
