//! Spreadsheet grade import with staging and atomic table replacement.

pub mod artifacts;
pub mod config;
pub mod db;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod prediction;
pub mod record;
pub mod registry;
pub mod service;
pub mod sheet;
pub mod staging;
pub mod swap;
pub mod task;
pub mod tracker;
pub mod worker;

pub use error::{ImportError, Result};
