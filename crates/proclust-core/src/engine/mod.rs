pub mod config;
pub mod contacts;
pub mod detector;
pub mod error;
pub mod leaflet;
pub mod progress;
pub mod stats;
