pub mod client;
pub mod error_log;
pub mod logger;
pub mod transport;
