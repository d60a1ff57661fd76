use std::time::Duration;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PAGE_SIZE: u64 = 15;
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Engine-wide defaults shared by table views and option loaders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub default_page: u64,
    pub default_page_size: u64,
    pub search_debounce: Duration,
    pub manual_request: bool,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let default_page = std::env::var("QUERY_SYNC_PAGE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|v: &u64| *v >= 1)
            .unwrap_or(DEFAULT_PAGE);
        let default_page_size = std::env::var("QUERY_SYNC_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|v: &u64| *v >= 1)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let search_debounce = std::env::var("QUERY_SYNC_SEARCH_DEBOUNCE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SEARCH_DEBOUNCE);
        let manual_request = std::env::var("QUERY_SYNC_MANUAL_REQUEST")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
            .unwrap_or(false);
        Self {
            default_page,
            default_page_size,
            search_debounce,
            manual_request,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page: DEFAULT_PAGE,
            default_page_size: DEFAULT_PAGE_SIZE,
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
            manual_request: false,
        }
    }
}
