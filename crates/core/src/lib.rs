//! Core business logic for Tally.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! All domain types, validation rules, and calculations live here.
//!
//! # Modules
//!
//! - `ledger` - Double-entry journal rules, numbering and void by compensation
//! - `balance` - Normal-sign balances, hierarchy rollup and drift detection
//! - `approval` - Step-ordered approval state machine and routing
//! - `posting` - Gateway rules for source-module posting requests

pub mod approval;
pub mod balance;
pub mod ledger;
pub mod posting;
