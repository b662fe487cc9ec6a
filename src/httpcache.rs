//! Conditional request handling (`ETag`, `Last-Modified`) and `Cache-Control`.
//!
//! Handlers fill a response [`HeaderMap`] through these helpers. When a helper
//! returns `true` the request was answered from the client cache and the
//! handler should reply `304 Not Modified` with those headers.

use axum::http::{header, HeaderMap, HeaderValue};
use chrono::{DateTime, NaiveDateTime, Utc};

use crate::config::Settings;

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

pub fn format_http_date(time: DateTime<Utc>) -> String {
    time.format(HTTP_DATE_FORMAT).to_string()
}

pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), HTTP_DATE_FORMAT)
        .ok()
        .map(|t| t.and_utc())
}

/// `private, max-age=N` in production, `no-store` otherwise
pub fn add_cache_control(resp: &mut HeaderMap, settings: &Settings, max_age_secs: u64) {
    let value = if settings.is_prod() && max_age_secs > 0 {
        format!("private, max-age={}", max_age_secs)
    } else {
        "no-store".to_string()
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        resp.insert(header::CACHE_CONTROL, value);
    }
}

fn set_etag(resp: &mut HeaderMap, etag: &str) {
    if let Ok(value) = HeaderValue::from_str(etag) {
        resp.insert(header::ETAG, value);
    }
}

/// True when any entry of `If-None-Match` equals `etag`
fn if_none_match_is_valid(req: &HeaderMap, etag: &str) -> bool {
    req.get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|item| item.trim() == etag)
}

/// Answer from the client cache when the entity tag matches
pub fn handle_generic_etag_cache(
    req: &HeaderMap,
    resp: &mut HeaderMap,
    settings: &Settings,
    etag: &str,
) -> bool {
    if !etag.is_empty() {
        set_etag(resp, etag);
        if if_none_match_is_valid(req, etag) {
            return true;
        }
    }
    add_cache_control(resp, settings, settings.cache.http_max_age_secs);
    false
}

/// Like [`handle_generic_etag_cache`], also honouring `If-Modified-Since`.
///
/// `last_modified` of `None` means unknown; no `Last-Modified` is sent then.
pub fn handle_generic_etag_time_cache(
    req: &HeaderMap,
    resp: &mut HeaderMap,
    settings: &Settings,
    etag: &str,
    last_modified: Option<DateTime<Utc>>,
) -> bool {
    if !etag.is_empty() {
        set_etag(resp, etag);
    }
    if let Some(last_modified) = last_modified {
        if let Ok(value) = HeaderValue::from_str(&format_http_date(last_modified)) {
            resp.insert(header::LAST_MODIFIED, value);
        }
    }

    if !etag.is_empty() && if_none_match_is_valid(req, etag) {
        return true;
    }

    if let Some(last_modified) = last_modified {
        let since = req
            .get(header::IF_MODIFIED_SINCE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);
        if let Some(since) = since {
            if last_modified.timestamp() <= since.timestamp() {
                return true;
            }
        }
    }

    add_cache_control(resp, settings, settings.cache.http_max_age_secs);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunMode;
    use chrono::TimeZone;

    fn prod() -> Settings {
        let mut settings = Settings::default();
        settings.server.run_mode = RunMode::Prod;
        settings
    }

    fn req(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(name, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn test_http_date_round_trip() {
        let t = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();
        assert_eq!(format_http_date(t), "Tue, 14 Nov 2023 22:13:20 GMT");
        assert_eq!(parse_http_date("Tue, 14 Nov 2023 22:13:20 GMT"), Some(t));
        assert_eq!(parse_http_date("yesterday"), None);
    }

    #[test]
    fn test_etag_match_in_list() {
        let settings = prod();
        let mut resp = HeaderMap::new();
        let request = req(header::IF_NONE_MATCH, r#""aaa", "bbb""#);
        assert!(handle_generic_etag_cache(&request, &mut resp, &settings, r#""bbb""#));
        assert_eq!(resp.get(header::ETAG).unwrap(), r#""bbb""#);

        let mut resp = HeaderMap::new();
        assert!(!handle_generic_etag_cache(&request, &mut resp, &settings, r#""ccc""#));
        assert_eq!(resp.get(header::CACHE_CONTROL).unwrap(), "private, max-age=300");
    }

    #[test]
    fn test_dev_mode_disables_caching() {
        let settings = Settings::default();
        let mut resp = HeaderMap::new();
        assert!(!handle_generic_etag_cache(&HeaderMap::new(), &mut resp, &settings, r#""x""#));
        assert_eq!(resp.get(header::CACHE_CONTROL).unwrap(), "no-store");

        let mut resp = HeaderMap::new();
        add_cache_control(&mut resp, &prod(), 0);
        assert_eq!(resp.get(header::CACHE_CONTROL).unwrap(), "no-store");
    }

    #[test]
    fn test_if_modified_since() {
        let settings = prod();
        let last = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();

        // same second
        let request = req(header::IF_MODIFIED_SINCE, "Tue, 14 Nov 2023 22:13:20 GMT");
        let mut resp = HeaderMap::new();
        assert!(handle_generic_etag_time_cache(&request, &mut resp, &settings, r#""e""#, Some(last)));
        assert_eq!(resp.get(header::LAST_MODIFIED).unwrap(), "Tue, 14 Nov 2023 22:13:20 GMT");

        // client copy is older
        let request = req(header::IF_MODIFIED_SINCE, "Tue, 14 Nov 2023 22:13:19 GMT");
        let mut resp = HeaderMap::new();
        assert!(!handle_generic_etag_time_cache(&request, &mut resp, &settings, r#""e""#, Some(last)));
        assert!(resp.contains_key(header::CACHE_CONTROL));

        // unknown modification time never matches
        let request = req(header::IF_MODIFIED_SINCE, "Tue, 14 Nov 2023 22:13:20 GMT");
        let mut resp = HeaderMap::new();
        assert!(!handle_generic_etag_time_cache(&request, &mut resp, &settings, r#""e""#, None));
        assert!(!resp.contains_key(header::LAST_MODIFIED));
    }
}
