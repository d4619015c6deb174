// Utility functions module
pub mod config;
pub mod formatters;
pub mod ids;
pub mod points;
pub mod progression;
pub mod streak;
