//! Sift Kernel Library
//!
//! The listing engine plus the service pieces around it. The main entry
//! point for running the server is the `sift` binary.

pub mod config;
pub mod db;
pub mod error;
pub mod listing;
pub mod metrics;
pub mod routes;
pub mod state;
