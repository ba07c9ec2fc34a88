//! Service plumbing shared by every route: state, errors, config, database and startup.

pub mod aliases;
pub mod app_error;
pub mod app_state;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod swagger;
