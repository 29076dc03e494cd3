//! Core data models for the object lifecycle.
//!
//! A [`record::Record`] carries the storage fields of a host row; a
//! [`policy::NamingPolicy`] decides how its remote key is built.

pub mod object;
pub mod pending;
pub mod policy;
pub mod record;
pub mod remote_key;
