pub mod alerting;
pub mod config;
pub mod monitor;
pub mod persist;
pub mod registry;
pub mod targets;
pub mod web;
