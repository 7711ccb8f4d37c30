//! URL canonicalization helpers (spec §4.4 stage 3, §4.2 netloc keying).

/// Rewrite a leading `http://` to `https://`, if `upgrade` is set.
pub fn https_upgrade(url: &str, upgrade: bool) -> String {
    if upgrade && url.starts_with("http://") {
        format!("https://{}", &url["http://".len()..])
    } else {
        url.to_string()
    }
}

/// Remove a `www.` immediately following the scheme, if `strip` is set.
pub fn strip_www(url: &str, strip: bool) -> String {
    if !strip {
        return url.to_string();
    }
    if let Some(idx) = url.find("://") {
        let (scheme, rest) = url.split_at(idx + 3);
        if let Some(stripped) = rest.strip_prefix("www.") {
            return format!("{scheme}{stripped}");
        }
    }
    url.to_string()
}

/// Replace literal spaces with `%20` and trim leading/trailing whitespace.
pub fn escape_spaces(url: &str) -> String {
    url.trim().replace(' ', "%20")
}

/// Return the lowercase netloc (host[:port]) of `url`, with any `www.` prefix stripped.
pub fn netloc(url: &str) -> String {
    let parsed = match ::url::Url::parse(url) {
        Ok(u) => u,
        Err(_) => match ::url::Url::parse(&format!("https://{url}")) {
            Ok(u) => u,
            Err(_) => return String::new(),
        },
    };
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    match parsed.port() {
        Some(p) => format!("{host}:{p}"),
        None => host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrades_http_to_https() {
        assert_eq!(https_upgrade("http://example.com/a", true), "https://example.com/a");
        assert_eq!(https_upgrade("http://example.com/a", false), "http://example.com/a");
        assert_eq!(https_upgrade("https://example.com/a", true), "https://example.com/a");
    }

    #[test]
    fn strips_www_after_scheme() {
        assert_eq!(strip_www("https://www.example.com/a", true), "https://example.com/a");
        assert_eq!(strip_www("https://example.com/a", true), "https://example.com/a");
        assert_eq!(strip_www("https://www.example.com/a", false), "https://www.example.com/a");
    }

    #[test]
    fn escapes_literal_spaces() {
        assert_eq!(escape_spaces(" https://example.com/a b "), "https://example.com/a%20b");
    }

    #[test]
    fn netloc_is_lowercased_and_www_stripped() {
        assert_eq!(netloc("https://WWW.Example.com/a/b"), "example.com");
        assert_eq!(netloc("https://example.com:8443/a"), "example.com:8443");
    }
}
