//! Keeps a stored object and its local record in step.
//!
//! A host persistence layer calls the [`LifecycleBinder`] hooks right before
//! it inserts, updates or deletes a row. The binder uploads attached files
//! under a unique key, emulates renames with copy-and-delete, and deletes
//! objects, updating the record's path and status flags only after the
//! store operation succeeded.

pub mod config;
pub mod errors;
pub mod index;
pub mod models;
pub mod services;
pub mod store;

pub use config::{ConfigKeys, ConfigSource, StoreSettings};
pub use errors::{SaveableError, SaveableResult};
pub use models::{
    pending::ValidatedFile,
    policy::{Acl, ColumnMap, NamingPolicy, PolicyOverrides, UniquenessScope},
    record::{Record, RecordSnapshot},
};
pub use services::{
    lifecycle::{HookOutcome, LifecycleBinder},
    repository::RecordRepository,
};
