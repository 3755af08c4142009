pub mod bot;
pub mod config;
pub mod devrant;
pub mod logging;
pub mod report;
pub mod slack_log;
