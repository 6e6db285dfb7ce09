//! Concrete search backend adapters.
//!
//! Free backends scrape or query public endpoints and are subject to rate
//! limits. Paid backends are metered and serve as reroute targets when a
//! free backend of the same role is degraded.

pub mod duckduckgo;
pub mod grounded;
pub mod newsapi;
pub mod searxng;
pub mod serper;

pub use duckduckgo::DuckDuckGoBackend;
pub use grounded::GroundedSearchBackend;
pub use newsapi::NewsApiBackend;
pub use searxng::SearxngBackend;
pub use serper::SerperBackend;

/// Role shared by general web backends.
pub const ROLE_WEB: &str = "web";
/// Role for news-index backends.
pub const ROLE_NEWS: &str = "news";
/// Role for grounded generative search.
pub const ROLE_GROUNDED: &str = "grounded";

/// Join a base URL and a path without doubling or dropping the slash.
pub(crate) fn join_endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_endpoint_handles_slashes() {
        assert_eq!(join_endpoint("http://a/", "/search"), "http://a/search");
        assert_eq!(join_endpoint("http://a", "search"), "http://a/search");
    }
}
