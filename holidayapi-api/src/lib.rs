//! # Holiday API Server Library
//!
//! The axum HTTP surface over `holidayapi-shared`.
//!
//! ## Modules
//!
//! - `app`: application state and router builder
//! - `config`: environment configuration
//! - `error`: error and success envelopes
//! - `middleware`: router-wide response layers
//! - `routes`: route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
