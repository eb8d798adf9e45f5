pub mod command_log;
pub mod config;
pub mod error;
pub mod history_repository;
pub mod notifier;
