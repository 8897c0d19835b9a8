//! Relational storage: credential store and audit log.

pub mod audit;
pub mod users;
