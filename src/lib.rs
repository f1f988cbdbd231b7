// Library for tests to access modules

pub mod alert;
pub mod cli;
pub mod config;
pub mod docker_repo;
pub mod metrics;
pub mod models;
pub mod output;
pub mod probe;
pub mod refresh;
pub mod routes;
pub mod source;
pub mod stats;
pub mod transport;
pub mod version;
