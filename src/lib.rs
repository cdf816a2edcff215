//! Database-as-a-Service control plane: provisions and supervises
//! containerized database instances behind a rootless container runtime,
//! exposing lifecycle, snapshot, health, and metrics operations over HTTP.
//!
//! The embedding host mounts [`api::build_router`] under its own prefix and
//! is responsible for authn; this crate only consumes a permission predicate
//! (see [`api::ApiState`]).

pub mod api;
pub mod config;
pub mod context;
pub mod credential;
pub mod engine;
pub mod error;
pub mod health_monitor;
pub mod lifecycle;
pub mod metrics_sampler;
pub mod model;
pub mod orchestrator;
pub mod persistence;
pub mod sku_catalog;
pub mod snapshot_service;
pub mod vnet;
pub mod volume;
