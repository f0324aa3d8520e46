//! Mercato: a multi-vendor marketplace API serving schema-validated
//! documents through a cached CRUD surface.
//!
//! The crate is layered the usual way: [`domain`] owns the document
//! model and per-kind schemas, [`application`] owns the resource
//! service and its query feature pipeline, [`cache`] and [`infra`]
//! provide the storage and HTTP adapters, and [`config`] resolves
//! deployment settings.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
