pub mod github;
pub mod habit;
pub mod user;
