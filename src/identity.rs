use axum::http::HeaderMap;

// Identity used when no proxy header names the caller
pub const UNKNOWN_CLIENT: &str = "127.0.0.1";

/// Caller identity from proxy headers, most trusted first:
/// `cf-connecting-ip`, `x-real-ip`, then the first `x-forwarded-for` hop.
///
/// Assumes the edge strips or overwrites these headers; nothing here checks
/// that they are authentic.
pub fn client_ip(headers: &HeaderMap) -> String {
    header_value(headers, "cf-connecting-ip")
        .or_else(|| header_value(headers, "x-real-ip"))
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').next())
                .map(str::trim)
                .filter(|s| !s.is_empty())
        })
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn connecting_ip_wins() {
        let map = headers(&[
            ("cf-connecting-ip", "203.0.113.7"),
            ("x-real-ip", "198.51.100.1"),
            ("x-forwarded-for", "192.0.2.1, 10.0.0.1"),
        ]);
        assert_eq!(client_ip(&map), "203.0.113.7");
    }

    #[test]
    fn real_ip_before_forwarded_for() {
        let map = headers(&[("x-real-ip", " 198.51.100.1 "), ("x-forwarded-for", "192.0.2.1")]);
        assert_eq!(client_ip(&map), "198.51.100.1");
    }

    #[test]
    fn first_forwarded_hop() {
        let map = headers(&[("x-forwarded-for", " 192.0.2.1 , 10.0.0.1, 10.0.0.2")]);
        assert_eq!(client_ip(&map), "192.0.2.1");
    }

    #[test]
    fn empty_headers_are_skipped() {
        let map = headers(&[("cf-connecting-ip", ""), ("x-forwarded-for", "192.0.2.9")]);
        assert_eq!(client_ip(&map), "192.0.2.9");
    }

    #[test]
    fn falls_back_to_unknown() {
        assert_eq!(client_ip(&HeaderMap::new()), UNKNOWN_CLIENT);
        let map = headers(&[("x-forwarded-for", " , 10.0.0.1")]);
        assert_eq!(client_ip(&map), UNKNOWN_CLIENT);
    }
}
