pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod meta;
pub mod metrics;
pub mod pipeline;
pub mod scanner;
pub mod store;
