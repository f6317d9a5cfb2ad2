//! Core types and trait definitions for the fiscal document warehouse.
//!
//! This crate is deliberately free of HTTP, XML and database dependencies.
//! Every other crate in the workspace depends on it.

// Native `async fn` in traits; the `Send` bounds are spelled out on the
// returned futures in `store`.
#![allow(async_fn_in_trait)]

pub mod catalog;
pub mod document;
pub mod error;
pub mod event;
pub mod ids;
pub mod item;
pub mod job;
pub mod party;
pub mod report;
pub mod store;

pub use error::{Error, Result};
