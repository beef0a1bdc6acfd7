//! # Engine Module
//!
//! Internal ECS engine implementation.
//!
//! This module contains all core ECS building blocks such as:
//! - Entity handles and the compacting component storage
//! - System descriptors and their validation
//! - The dependency graph between systems
//! - Sequential and parallel execution
//! - Deferred structural mutation
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod entity;
pub mod component;
pub mod storage;
pub mod query;
pub mod borrow;
pub mod commands;
pub mod manager;
pub mod descriptor;
pub mod systems;
pub mod graph;
pub mod config;
pub mod timer;
pub mod scheduler;
pub(crate) mod executor;
