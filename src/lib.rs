//! Network Service Mesh adapter
//!
//! Installs the mesh, its sample applications and arbitrary manifests on one
//! or more clusters, and reports the outcome of every operation as a
//! progress event.

pub mod adapter;
pub mod config;
pub mod events;
pub mod manifest;
pub mod server;
