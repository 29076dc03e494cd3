//! Builds the remote key for a new upload.
//!
//! An explicit base filename is tried first. If it is missing or taken and
//! the policy allows random names, up to [`MAX_NAME_ATTEMPTS`] random names
//! are generated until one passes the uniqueness check.
//!
//! [`MAX_NAME_ATTEMPTS`]: crate::models::policy::MAX_NAME_ATTEMPTS

use crate::{
    errors::{NamingFailure, SaveableError, SaveableResult},
    models::{policy::NamingPolicy, remote_key::RemoteKey},
    services::uniqueness::UniquenessChecker,
};
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Source of candidate base filenames.
pub trait NameGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// MD5 of a random UUID and the current time, rendered in base 36.
/// High entropy, not meant to be unguessable.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomNameGenerator;

impl NameGenerator for RandomNameGenerator {
    fn generate(&self) -> String {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let digest = md5::compute(format!("{}{}", Uuid::new_v4(), nanos));
        to_base36(u128::from_be_bytes(digest.0))
    }
}

fn to_base36(mut value: u128) -> String {
    if value == 0 {
        return "0".into();
    }
    let mut digits = Vec::with_capacity(25);
    while value > 0 {
        digits.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

pub struct PathBuilder<'a> {
    policy: &'a NamingPolicy,
    generator: &'a dyn NameGenerator,
}

impl<'a> PathBuilder<'a> {
    pub fn new(policy: &'a NamingPolicy, generator: &'a dyn NameGenerator) -> Self {
        Self { policy, generator }
    }

    pub async fn build(
        &self,
        extension: &str,
        checker: &UniquenessChecker<'_>,
    ) -> SaveableResult<RemoteKey> {
        let dir = self.policy.dir.as_str();
        let explicit = self
            .policy
            .base_filename
            .as_deref()
            .filter(|name| !name.is_empty());

        let mut explicit_key = None;
        if let Some(name) = explicit {
            let key = RemoteKey::from_parts(dir, name, extension);
            if checker.is_unique(&key).await? {
                debug!(key = %key, "using explicit filename");
                return Ok(key);
            }
            explicit_key = Some(key);
        }

        if !self.policy.generate_random {
            return Err(match explicit_key {
                Some(key) => NamingFailure::NotUnique {
                    key: key.into_string(),
                },
                None => NamingFailure::NotProvided,
            }
            .into());
        }

        let attempts = self.policy.max_attempts();
        for attempt in 1..=attempts {
            let key = RemoteKey::from_parts(dir, &self.generator.generate(), extension);
            if checker.is_unique(&key).await? {
                debug!(key = %key, attempt, "allocated random filename");
                return Ok(key);
            }
            debug!(key = %key, attempt, "random filename collided");
        }

        Err(SaveableError::NameAllocationExhausted { attempts })
    }
}
