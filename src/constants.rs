pub mod server {
    pub const NAME: &str = "Dremio";
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
    pub const PROTOCOL_VERSION: &str = "2025-06-18";
    pub const SQL_SUBMITTER_TAG: &str = "dremioai: submitter";
}

pub mod engine {
    pub const POLL_INTERVAL_MS: u64 = 500;
    pub const PAGE_SIZE: u64 = 500;
    pub const MAX_CONCURRENCY: usize = 10;
}

pub mod network {
    pub const TIMEOUT_API_REQUEST_MS: u64 = 60_000;
    pub const TIMEOUT_CONNECTION_MS: u64 = 10_000;
    pub const DREMIO_CLOUD_URI: &str = "https://api.dremio.cloud";
    pub const DREMIO_CLOUD_EMEA_URI: &str = "https://api.eu.dremio.cloud";
}

pub mod reports {
    pub const LOOKBACK_DAYS: i64 = 7;
    pub const USAGE_PAGE_SIZE: u64 = 500;
    pub const SEARCH_PAGE_SIZE: u64 = 50;
    pub const PROMQL_STEP: &str = "1h";
    pub const PROMQL_SCHEMA_WINDOW_MINUTES: i64 = 30;
}

pub mod resources {
    pub const HINTS_URI: &str = "dremio://hints";
    pub const SYSTEM_PROMPT_NAME: &str = "System Prompt";
}
