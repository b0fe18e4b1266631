pub mod configuration;
pub mod connectors;
pub mod console;
pub mod db;
pub mod errors;
pub mod helpers;
pub mod messages;
pub mod models;
pub mod services;
pub mod telemetry;
pub mod worker;
