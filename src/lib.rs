// Library root. The binary entry point is src/main.rs.

pub mod cli;
pub mod config;
pub mod docs;
pub mod error;
pub mod exec;
pub mod logger;
pub mod metadata;
pub mod piperenv;
pub mod steps;
pub mod telemetry;
