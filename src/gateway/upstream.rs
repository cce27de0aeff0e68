//! 上游分组与轮询选择

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::breaker::Breaker;

#[derive(Debug)]
pub struct Upstream {
    /// 不带结尾斜杠的 scheme://host[:port]
    pub base: String,
    pub breaker: Breaker,
}

impl Upstream {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            breaker: Breaker::default(),
        }
    }
}

/// 校验上游地址：必须是带主机名的 http(s) URL
pub fn parse_upstream_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let uri: axum::http::Uri = raw.parse().ok()?;
    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        _ => return None,
    }
    uri.host().filter(|h| !h.is_empty())?;
    Some(raw.trim_end_matches('/').to_string())
}

#[derive(Debug)]
pub struct UpstreamGroup {
    pub name: String,
    upstreams: Vec<Arc<Upstream>>,
    counter: AtomicUsize,
}

impl UpstreamGroup {
    /// 无效地址会被跳过并记录警告
    pub fn from_urls(name: &str, urls: &[String]) -> Self {
        let upstreams = urls
            .iter()
            .filter(|u| !u.trim().is_empty())
            .filter_map(|u| match parse_upstream_url(u) {
                Some(base) => Some(Arc::new(Upstream::new(&base))),
                None => {
                    tracing::warn!(service = name, url = %u, "Skipping invalid upstream URL");
                    None
                }
            })
            .collect();

        Self {
            name: name.to_string(),
            upstreams,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }

    pub fn upstreams(&self) -> &[Arc<Upstream>] {
        &self.upstreams
    }

    /// 从轮询位置开始找第一个熔断器放行的上游；都不放行时返回轮询位置
    pub fn pick(&self) -> Option<Arc<Upstream>> {
        if self.upstreams.is_empty() {
            return None;
        }

        let len = self.upstreams.len();
        let start = self.counter.fetch_add(1, Ordering::Relaxed) % len;

        (0..len)
            .map(|offset| &self.upstreams[(start + offset) % len])
            .find(|u| u.breaker.allow())
            .or_else(|| self.upstreams.get(start))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(urls: &[&str]) -> UpstreamGroup {
        let urls: Vec<String> = urls.iter().map(|s| s.to_string()).collect();
        UpstreamGroup::from_urls("academic", &urls)
    }

    #[test]
    fn test_parse_upstream_url() {
        assert_eq!(
            parse_upstream_url("http://academic:8080/").as_deref(),
            Some("http://academic:8080")
        );
        assert!(parse_upstream_url("academic:8080").is_none());
        assert!(parse_upstream_url("ftp://x").is_none());
        assert!(parse_upstream_url("not a url").is_none());
    }

    #[test]
    fn test_invalid_urls_skipped() {
        let g = group(&["http://a:1", "::bad::", "", "http://b:2"]);
        assert_eq!(g.upstreams().len(), 2);
    }

    #[test]
    fn test_round_robin() {
        let g = group(&["http://a:1", "http://b:2", "http://c:3"]);
        let picks: Vec<String> = (0..6).map(|_| g.pick().unwrap().base.clone()).collect();
        assert_eq!(
            picks,
            vec!["http://a:1", "http://b:2", "http://c:3", "http://a:1", "http://b:2", "http://c:3"]
        );
    }

    #[test]
    fn test_pick_skips_open_breaker() {
        let g = group(&["http://a:1", "http://b:2"]);
        for _ in 0..super::super::breaker::DEFAULT_THRESHOLD {
            g.upstreams()[0].breaker.record_failure();
        }

        for _ in 0..4 {
            assert_eq!(g.pick().unwrap().base, "http://b:2");
        }
    }

    #[test]
    fn test_pick_falls_back_when_all_open() {
        let g = group(&["http://a:1", "http://b:2"]);
        for upstream in g.upstreams() {
            for _ in 0..super::super::breaker::DEFAULT_THRESHOLD {
                upstream.breaker.record_failure();
            }
        }

        assert_eq!(g.pick().unwrap().base, "http://a:1");
        assert_eq!(g.pick().unwrap().base, "http://b:2");
    }

    #[test]
    fn test_empty_group() {
        assert!(group(&[]).pick().is_none());
    }
}
