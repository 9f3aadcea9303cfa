//! Local control plane of the `syncfuse` peer-to-peer file synchronization
//! client.
//!
//! This crate provides the TLS-protected HTTP service that backs the
//! companion web UI: certificate bootstrap, a connection gate that serves TLS
//! and plaintext clients on one socket, the API router, a dual-source static
//! asset server, the single-writer configuration endpoint, and the service
//! lifecycle glue that runs it all under a common supervisor. The sync
//! protocol engine, peer discovery, the FUSE mount, and the metadata store
//! are external collaborators reached through the interfaces in [`model`].

pub mod api;
pub mod cli;
pub mod config;
pub mod deviceid;
pub mod gate;
pub mod humansize;
pub mod locations;
pub mod model;
pub mod supervisor;
pub mod tls;
