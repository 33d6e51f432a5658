//! ImageVault - content-addressed image ingestion and caching.
//!
//! This library implements the core subsystem of an image-hosting service:
//! a content-addressed upload pipeline (hash, dedup, concurrent derivative
//! generation, atomic storage writes) and a generic read-through cache with
//! request coalescing in front of every entity lookup.
//!
//! # High-Level API
//!
//! For most use cases, the [`service`] module provides a simplified facade:
//!
//! ```ignore
//! use imagevault::config::Settings;
//! use imagevault::ingest::UploadRequest;
//! use imagevault::service::ImageVault;
//! use imagevault::store::MemoryStore;
//! use std::sync::Arc;
//!
//! let vault = ImageVault::new(Arc::new(MemoryStore::new()), Settings::default());
//! let outcome = vault
//!     .ingest(UploadRequest {
//!         bytes,
//!         file_name: "sunset.jpg".into(),
//!         content_type: "image/jpeg".into(),
//!         description: String::new(),
//!         is_public: true,
//!         owner_id,
//!         tags: vec![],
//!     })
//!     .await?;
//! ```
//!
//! HTTP handlers, routing, and authentication are external collaborators
//! and live outside this crate.

pub mod cache;
pub mod config;
pub mod ingest;
pub mod jobs;
pub mod logging;
pub mod model;
pub mod op;
pub mod service;
pub mod store;

/// Version of the ImageVault library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
