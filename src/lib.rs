//! Planity: a task-management REST API with a fail-soft response cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
