pub mod config;
pub mod db;
pub mod error;
pub mod github_api;
pub mod pool;
pub mod rewards;
pub mod schemas;
pub mod store;
pub mod streak;
pub mod time;
