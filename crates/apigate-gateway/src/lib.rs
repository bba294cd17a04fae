//! `apigate-gateway`: the API request gateway runtime.
//!
//! This crate provides the concrete implementations of the contracts defined
//! in `apigate-kernel::gateway`:
//!
//! | Kernel contract | Implementation |
//! |----------------|----------------|
//! | [`LagProbe`](gateway::LagProbe) | [`probe::StaticLagProbe`] |
//! | [`MessageLocalizer`](gateway::MessageLocalizer) | [`catalog::StaticCatalog`] |
//! | [`ApiModule`](gateway::ApiModule) | [`modules::PingModule`], [`modules::SiteInfoModule`] |
//!
//! [`pipeline::Gateway`] composes admission control, origin trust,
//! assertions, dispatch, conditional requests and result aggregation into
//! one request pipeline. [`server::ApiServer`] exposes it over HTTP.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use apigate_gateway::server::ApiServer;
//! use apigate_kernel::config::GatewaySettings;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     ApiServer::new(GatewaySettings::default()).start().await
//! }
//! ```

pub mod admission;
pub mod aggregate;
pub mod assertion;
pub mod catalog;
pub mod conditional;
pub mod dispatch;
pub mod errorformat;
pub mod modules;
pub mod origin;
pub mod pipeline;
pub mod probe;
pub mod server;
pub mod session;

pub use pipeline::{Gateway, GatewayBuilder};

// Re-export the kernel gateway types for convenience.
pub use apigate_kernel::gateway;
