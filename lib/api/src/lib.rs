//! # semdex API
//!
//! HTTP query surface over a published [`semdex_core::ModelHandle`].

pub mod rest;

pub use rest::{routes, ApiError, AppState, RestApi};
