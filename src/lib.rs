pub mod application;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod logging;
pub mod sync;
