//! Per-network metadata injector for OpenStack Neutron.
//!
//! Every network carrying the configured tag gets an injector port, a network
//! namespace holding that port, and an HAProxy instance inside the namespace
//! forwarding HTTP to a local proxy socket. Networks that lose the tag are
//! torn down again.

pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod infrastructure;
