//! # mend-db: Database Layer & Composition Engine for Mendshop
//!
//! This crate provides database access and the transactional repair-order
//! engine. It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Mendshop Data Flow                                │
//! │                                                                         │
//! │  Request handler (attach_part, capture_payment, ...)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      mend-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌────────────────┐   ┌───────────────┐  │   │
//! │  │   │   Database    │   │  Repositories  │   │  Migrations   │  │   │
//! │  │   │   (pool.rs)   │   │ customer/      │   │  (embedded)   │  │   │
//! │  │   │               │   │ catalog/order/ │   │               │  │   │
//! │  │   │ SqlitePool    │◄──│ payment        │   │ 001_init.sql  │  │   │
//! │  │   └───────┬───────┘   └────────────────┘   └───────────────┘  │   │
//! │  │           │           ┌────────────────────────────────────┐   │   │
//! │  │           └──────────►│  CompositionEngine (engine.rs)     │   │   │
//! │  │                       │  attach/detach + total recompute   │   │   │
//! │  │                       │  in single SQLite transactions     │   │   │
//! │  │                       └────────────────────────────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL mode, foreign keys on, busy timeout)                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transaction Contract
//! Every multi-step operation (attach, detach, refund) is all-or-nothing: a
//! failure at any step leaves stock, line items and totals exactly as they
//! were before the operation began.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod engine;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use engine::CompositionEngine;
pub use error::{DbError, EngineError, EngineResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::catalog::CatalogRepository;
pub use repository::customer::CustomerRepository;
pub use repository::order::OrderRepository;
pub use repository::payment::PaymentRepository;
