pub mod config;
pub mod database_ops;
pub mod models;
pub mod orchestrator;
pub mod secrets;
pub mod service_result;
pub mod tracing;

pub mod util {
    pub mod env;
}
