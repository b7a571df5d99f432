//! Batch client for the software mention recognition service.
//!
//! Drives the remote annotation endpoint over large document collections
//! while tracking per-document outcomes in an embedded store, so a run can
//! be interrupted and resumed without redoing completed work.

pub mod annotate;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod harvest;
pub mod hash;
pub mod mongo;
pub mod paths;
pub mod report;
pub mod service;
pub mod sources;
pub mod state;
