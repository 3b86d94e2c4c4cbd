pub mod api;
pub mod app;
pub mod backend;
pub mod cli;
pub mod config;
pub mod db;
pub mod entitlement;
pub mod global;
pub mod jobs;
pub mod usage;
