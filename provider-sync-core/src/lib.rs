#![doc = "provider-sync-core: core logic library for provider-sync."]

//! This crate contains the update pipeline for wrapped provider packages: version
//! resolution, regeneration, merge, changelog synthesis and the orchestrator that ties
//! them together.
//!
//! # Usage
//! The CLI crate builds the concrete clients and calls [`synchronise::synchronise`].
//! Tests swap any collaborator in [`contract`] for its `mockall` mock.

pub mod changelog;
pub mod config;
pub mod contract;
pub mod error;
pub mod generate;
pub mod merge;
pub mod provider;
pub mod registry;
pub mod release;
pub mod synchronise;
pub mod version;
