//! Port traits for the collaborators the core consumes but never owns.

pub mod config_port;
pub mod data_port;
pub mod fundamentals_port;
pub mod report_port;
pub mod universe_port;
