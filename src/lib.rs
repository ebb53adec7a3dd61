pub mod action_log;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod lab_config;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod resolver;
pub mod runner;
pub mod ui;
pub mod util;
