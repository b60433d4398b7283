pub mod app;
pub mod cli;
pub mod domain;
pub mod infra;

use infra::config::Config;

/// Install logging at the configured level.
pub fn init(config: &Config) {
    infra::logging::init(&config.logging.level);
}
