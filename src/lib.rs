//! Scripted HTTP workload execution: scenario interpretation and load
//! generation over a shared core of field-path resolution, assertions,
//! and variable substitution.
//!
//! The engines are intentionally decoupled from storage and UI: anything
//! needing to read or write scenarios, hosts, or reports goes through
//! [`repository::RepositoryPort`]; anything needing live progress during a
//! run supplies the callbacks `scenario_engine`/`load_engine` already
//! accept.

pub mod assertions;
pub mod errors;
pub mod field_path;
pub mod http_client;
pub mod load_engine;
pub mod model;
pub mod report;
pub mod repository;
pub mod scenario_engine;
pub mod substitution;
