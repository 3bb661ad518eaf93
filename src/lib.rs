//! Container fleet management for VPN-proxy service topologies.
//!
//! `mystfleet` manages a fleet of Docker containers implementing a VPN-proxy
//! topology (identity nodes, connectors, traffic relays) and exposes
//! read-models that reconcile container-runtime state with
//! externally-sourced provider and ACL data.
//!
//! The crate is an in-process library: request-handling callers supply
//! filters and receive reconciled models; there is no network surface of its
//! own.
//!
//! # Architecture
//!
//! - [`model`]: domain models plus the generic filter/sort/pagination
//!   engine every aggregated collection goes through.
//! - [`docker`]: the container-runtime seam ([`docker::ContainerClient`]),
//!   the label codec that gives Docker's flat label store a typed schema,
//!   and the per-service container creators behind one dispatch registry.
//! - [`repository`]: runner discovery over the runtime, the
//!   authoritative-store traits, and the reconciliation repositories that
//!   join both into request-time read-models.
//! - [`error`]: the crate-wide failure taxonomy.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mystfleet::docker::{
//!     CreateRequest, CreateStrategy, DockerClient, IdentityCreator,
//!     IdentityCreatorConfig, LabelEntry,
//! };
//! use mystfleet::model::{ServiceKind, VolumeBinding, VolumeKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(DockerClient::connect().await?);
//! let strategy = CreateStrategy::new(vec![Arc::new(IdentityCreator::new(
//!     client,
//!     IdentityCreatorConfig::default(),
//!     "com.mystfleet",
//! ))]);
//!
//! let runner = strategy
//!     .create(&CreateRequest {
//!         service: ServiceKind::Identity,
//!         name: "identity".to_string(),
//!         label: vec![
//!             LabelEntry::new("vpn-identity")
//!                 .field("id", "b9e7e1c0-4a4e-4f3e-9e2f-2e4f6a8b9c0d")
//!                 .field("identity", "0x32ac54d2cd544d6a15462a1e7c4a6ef243f0d8ab")
//!                 .field("passphrase", "keystore passphrase"),
//!         ],
//!         volumes: vec![VolumeBinding {
//!             kind: VolumeKind::Keystore,
//!             source: "/var/lib/mystfleet/keystore".to_string(),
//!             dest: None,
//!         }],
//!         socket_port: None,
//!     })
//!     .await?;
//! println!("started {} at {:?}", runner.name, runner.socket_addr);
//! # Ok(())
//! # }
//! ```

pub mod docker;
pub mod error;
pub mod model;
pub mod repository;
pub mod testing;

pub use error::{ClientError, FleetError, Result};
