pub mod accounts;
pub mod config;
pub mod email;
pub mod error;
pub mod http;
pub mod infra;
pub mod marketplace;
pub mod requests;
pub mod telemetry;
pub mod tokens;
pub mod validation;
