//! Concrete storage engines.

pub mod remote;
pub mod sqlite;
