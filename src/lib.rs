//! Sham Server
//!
//! A configuration-driven HTTP mock server. Routes are declared in a JSON or
//! YAML file; each one replays a canned response and can optionally validate
//! the request body, inject latency, or return a simulated error.
//!
//! # Features
//!
//! - **Canned Responses**: Fixed status, JSON body and headers per route
//! - **Body Validation**: Required top-level keys, subset or exact policy
//! - **Latency Simulation**: Fixed or random delays on the tokio timer
//! - **Error Simulation**: Alternate status/body behind a query trigger
//!
//! # Example Configuration
//!
//! ```json
//! {
//!   "port": 3000,
//!   "routes": [
//!     {
//!       "method": "POST",
//!       "path": "/users",
//!       "status": 201,
//!       "delay": 200,
//!       "response": { "id": 1 },
//!       "match": { "body": { "name": "string" } },
//!       "simulateError": { "status": 503, "response": { "down": true } }
//!     }
//!   ]
//! }
//! ```
//!
//! `POST /users?simulateError=true` answers 503 `{"down": true}`; a body
//! without `name` answers 422 `{"message": "Validation error", "missing": ["name"]}`.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod matcher;
pub mod scheduler;
pub mod server;

pub use config::ShamConfig;
pub use error::ConfigError;
pub use server::{compile, MockServer};
