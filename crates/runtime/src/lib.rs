#![deny(unused)]
//! Sandbox lifecycle management over the control plane.
//!
//! This crate talks to the provider's container-sandbox control plane and
//! manages the two lifecycle state machines the service exposes:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  ToolManager                                 │
//! │    create / poll-until-ACTIVE / list / delete│
//! ├──────────────────────────────────────────────┤
//! │  InstanceManager                             │
//! │    start (by id or name) / list / stop       │
//! ├──────────────────────────────────────────────┤
//! │  AccessService                               │
//! │    short-lived tokens, access URLs           │
//! ├──────────────────────────────────────────────┤
//! │  ControlPlane (HttpControlPlane via reqwest) │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Every operation is a blocking remote call from the caller's perspective;
//! the only loop that suspends repeatedly is `ToolManager::wait_until_active`.
//! No state is cached locally — the control plane is the source of truth.

pub mod access;
pub mod api;
pub mod client;
pub mod instances;
pub mod tools;

pub use access::AccessService;
pub use api::ApiError;
pub use client::{ControlPlane, HttpControlPlane, MockControlPlane};
pub use instances::{InstanceManager, ListInstancesSpec, StartInstanceSpec};
pub use tools::{CreateToolSpec, ToolManager};
