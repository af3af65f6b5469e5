pub mod cli;
pub mod cms;
pub mod config;
pub mod convert;
pub mod db;
pub mod docs;
pub mod error;
pub mod generate;
pub mod models;
pub mod pipeline;
pub mod publish;
pub mod queue;
pub mod sheets;
pub mod store;
