pub mod db;
pub mod errors;
pub mod helpers;
pub mod page_cache;
pub mod paginator;
pub mod query_params;
pub mod static_server;
pub mod store;
