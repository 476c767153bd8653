#![deny(unused)]
//! Core types, configuration, and error definitions for agsbox.
//!
//! This crate provides the foundational building blocks shared by the
//! lifecycle managers (`agsbox_runtime`) and the execution adapter
//! (`agsbox_exec`): the immutable session configuration, the error taxonomy,
//! the control-plane data model, and the tool-name policy.

pub mod config;
pub mod error;
pub mod naming;
pub mod types;

pub use config::{AgsConfig, AgsConfigBuilder, DOMAIN_SUFFIX};
pub use error::{Error, Result};
pub use types::*;
