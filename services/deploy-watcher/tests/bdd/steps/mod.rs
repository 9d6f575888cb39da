//! BDD step definitions for deploy-watcher

pub mod build_steps;
pub mod rollback_steps;
pub mod single_check_steps;
