pub mod disk_space;
pub mod humanize;
pub mod logger;

pub use humanize::{format_duration, format_file_size};
pub use logger::init_logging;
