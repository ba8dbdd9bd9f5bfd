//! Diagram store and HTTP API for the BDD-viz browser client
//!
//! Diagrams are named text blobs with an associated UI state. They are kept
//! in a [`store::DiagramStore`] and exposed via the [`router`]. BuDDy dumps are
//! converted to DDDMP using [`bddviz_dump`] before being stored.
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod router;
pub mod server;
pub mod store;
