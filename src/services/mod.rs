pub mod discord;
pub mod init;
pub mod rate_limiter;
pub mod riot;
pub mod tracker;
