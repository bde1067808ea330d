//! # Repositories
//!
//! One repository per entity group:
//!
//! - [`customer`] - customer directory
//! - [`catalog`] - repair services and spare parts (incl. stock reservation)
//! - [`order`] - repair orders and their status workflow
//! - [`payment`] - the payment ledger and refund state machine
//!
//! The cross-entity attach/detach operations live in
//! [`crate::engine::CompositionEngine`], not here: they span catalog stock,
//! line items and the order total in one transaction.

pub mod catalog;
pub mod customer;
pub mod order;
pub mod payment;
