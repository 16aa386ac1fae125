//! Request routing and orchestration.
//!
//! The router ties the gateway together: complexity analysis picks a tier,
//! the registry ranks candidate models, circuit breakers and budget limits
//! gate admission per candidate, and retry with exponential backoff walks
//! the candidate list until one provider answers or everything is exhausted.

mod cache;
mod config;
mod context;
mod router_impl;

#[cfg(test)]
mod tests;

pub use cache::ResponseCache;
pub use config::RouterConfig;
pub use context::{GatewayContext, GatewayContextBuilder};
pub use router_impl::{AiResponse, Router, StreamHandle, TaskRequest};
