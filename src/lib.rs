pub mod api;
pub mod clients;
pub mod config;
pub mod handler;
pub mod humanize;
pub mod jobs;
pub mod observability;
pub mod packages;
pub mod server;
pub mod sources;
pub mod telemetry;
