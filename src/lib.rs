// Library root module for custody-relay
// This file defines the public API and module structure for the custody-relay library
// It exports the transport registry, submission pipeline, fee estimator and swap codec
//
// Numan Thabit 2025 Nov

pub mod api;
pub mod chain;
pub mod config;
pub mod errors;
pub mod fees;
pub mod metrics;
pub mod pin;
pub mod pipeline;
pub mod registry;
pub mod signing;
pub mod surfaces;
pub mod swap;
pub mod transport;
pub mod wallet;
