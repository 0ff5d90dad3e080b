//! Solera Storefront - client-state core.
//!
//! This crate is the shared-state layer the storefront UI renders from:
//!
//! - A TTL-bounded, disk-backed [`cache`] for remotely-fetched entities
//! - [`stores`] for session/profile, cart, favorites, and site configuration,
//!   with optimistic mutations and reconcile-on-failure
//! - The [`checkout`] state machine (delivery → payment → confirmation)
//! - A [`backend`] abstraction over the remote row-CRUD and identity APIs
//!
//! Everything is wired through an explicitly constructed [`state::Services`]
//! value; there is no module-level global state, so tests (and multiple
//! application roots) can hold isolated instances.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod cache;
pub mod checkout;
pub mod config;
pub mod error;
pub mod shipping;
pub mod state;
pub mod stores;
pub mod types;
