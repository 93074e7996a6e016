pub mod dremio_client;
pub mod job_poller;
pub mod jobs;
pub mod logger;
pub mod parallel;
pub mod prometheus_client;
pub mod query_engine;
pub mod registry;
pub mod result_fetcher;
pub mod settings;
pub mod sql_gate;
pub mod tool_executor;
