//! Command handlers

pub mod config;
pub mod prompt;
pub mod status;
