// Main library entry point for Probecraft.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod ports;
