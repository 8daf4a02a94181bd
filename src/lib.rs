pub mod agent;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod pipeline;
pub mod shutdown;
pub mod worker;
