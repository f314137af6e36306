//! Task source and outcome persistence.
//!
//! [`MemoryStore`] keeps everything in process and is what tests and
//! database-less runs use. [`PgStore`] is the PostgreSQL-backed store.
//! Both rank candidates with the same three-class ordering described in
//! [`ranking`].

pub mod memory;
pub mod postgres;
pub mod ranking;

pub use memory::MemoryStore;
pub use postgres::PgStore;
