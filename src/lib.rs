//! Strata: a uniform persistence accessor over swappable SQL engines.
//!
//! This facade re-exports the dialect-agnostic layer. Engine drivers live in
//! their own crates (`strata-postgres`, `strata-mysql`, `strata-mssql`) and
//! plug in through the [`Driver`]/[`Connection`] traits.

pub use strata_core::*;
