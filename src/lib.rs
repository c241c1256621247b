pub mod cli;
pub mod config;
pub mod encoder;
pub mod error;
pub mod input;
pub mod output;
pub mod queue;
pub mod report;
pub mod utils;
