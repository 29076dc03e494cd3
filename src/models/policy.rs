//! Naming policy: how a new object's remote key is chosen and stored.
//!
//! A [`NamingPolicy`] is immutable once built. Per-upload tweaks come in as
//! [`PolicyOverrides`] and are folded in exactly once with
//! [`NamingPolicy::apply`].

use crate::errors::{SaveableError, SaveableResult};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// How many random names are tried before giving up.
pub const MAX_NAME_ATTEMPTS: usize = 10;

/// Store-side visibility applied to uploaded and copied objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Acl {
    Private,
    #[default]
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
}

impl Acl {
    pub fn as_str(&self) -> &'static str {
        match self {
            Acl::Private => "private",
            Acl::PublicRead => "public-read",
            Acl::PublicReadWrite => "public-read-write",
            Acl::AuthenticatedRead => "authenticated-read",
        }
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Acl {
    type Err = SaveableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "private" => Ok(Acl::Private),
            "public-read" => Ok(Acl::PublicRead),
            "public-read-write" => Ok(Acl::PublicReadWrite),
            "authenticated-read" => Ok(Acl::AuthenticatedRead),
            other => Err(SaveableError::ConfigurationInvalid {
                setting: "acl".into(),
                reason: format!("unknown access-control setting `{}`", other),
            }),
        }
    }
}

/// Where a candidate key must be free before it is accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UniquenessScope {
    None,
    #[default]
    Local,
    Remote,
    Both,
}

impl UniquenessScope {
    pub fn from_flags(local: bool, remote: bool) -> Self {
        match (local, remote) {
            (false, false) => UniquenessScope::None,
            (true, false) => UniquenessScope::Local,
            (false, true) => UniquenessScope::Remote,
            (true, true) => UniquenessScope::Both,
        }
    }

    pub fn checks_local(&self) -> bool {
        matches!(self, UniquenessScope::Local | UniquenessScope::Both)
    }

    pub fn checks_remote(&self) -> bool {
        matches!(self, UniquenessScope::Remote | UniquenessScope::Both)
    }
}

impl FromStr for UniquenessScope {
    type Err = SaveableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(UniquenessScope::None),
            "local" => Ok(UniquenessScope::Local),
            "remote" => Ok(UniquenessScope::Remote),
            "both" => Ok(UniquenessScope::Both),
            other => Err(SaveableError::ConfigurationInvalid {
                setting: "uniqueness".into(),
                reason: format!("expected none, local, remote or both, got `{}`", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionPolicy {
    /// Overrides everything else when set.
    pub force: Option<String>,
    pub ignore_original: bool,
    pub guess: bool,
}

impl Default for ExtensionPolicy {
    fn default() -> Self {
        Self {
            force: None,
            ignore_original: false,
            guess: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingPolicy {
    /// Directory prefix; slashes on either end are irrelevant.
    pub dir: String,
    pub base_filename: Option<String>,
    pub generate_random: bool,
    pub extension: ExtensionPolicy,
    pub uniqueness: UniquenessScope,
    pub acl: Acl,
    pub delete_local_on_save: bool,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self {
            dir: String::new(),
            base_filename: None,
            generate_random: true,
            extension: ExtensionPolicy::default(),
            uniqueness: UniquenessScope::default(),
            acl: Acl::default(),
            delete_local_on_save: false,
        }
    }
}

impl NamingPolicy {
    pub fn max_attempts(&self) -> usize {
        MAX_NAME_ATTEMPTS
    }

    /// Resolve `overrides` on top of this policy, returning a new policy.
    pub fn apply(&self, overrides: &PolicyOverrides) -> NamingPolicy {
        let mut merged = self.clone();
        if let Some(dir) = &overrides.dir {
            merged.dir = dir.clone();
        }
        if let Some(base) = &overrides.base_filename {
            merged.base_filename = Some(base.clone()).filter(|b| !b.is_empty());
        }
        if let Some(flag) = overrides.generate_random {
            merged.generate_random = flag;
        }
        if let Some(force) = &overrides.force_extension {
            merged.extension.force = Some(force.clone()).filter(|f| !f.is_empty());
        }
        if let Some(flag) = overrides.ignore_original_extension {
            merged.extension.ignore_original = flag;
        }
        if let Some(flag) = overrides.guess_extension {
            merged.extension.guess = flag;
        }
        if let Some(scope) = overrides.uniqueness {
            merged.uniqueness = scope;
        }
        if let Some(acl) = overrides.acl {
            merged.acl = acl;
        }
        if let Some(flag) = overrides.delete_local_on_save {
            merged.delete_local_on_save = flag;
        }
        merged
    }
}

/// Per-upload option overrides. Unset fields keep the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOverrides {
    pub dir: Option<String>,
    pub base_filename: Option<String>,
    pub generate_random: Option<bool>,
    pub force_extension: Option<String>,
    pub ignore_original_extension: Option<bool>,
    pub guess_extension: Option<bool>,
    pub uniqueness: Option<UniquenessScope>,
    pub acl: Option<Acl>,
    pub delete_local_on_save: Option<bool>,
}

impl PolicyOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dir(mut self, dir: impl Into<String>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn base_filename(mut self, name: impl Into<String>) -> Self {
        self.base_filename = Some(name.into());
        self
    }

    pub fn generate_random(mut self, flag: bool) -> Self {
        self.generate_random = Some(flag);
        self
    }

    pub fn force_extension(mut self, ext: impl Into<String>) -> Self {
        self.force_extension = Some(ext.into());
        self
    }

    pub fn ignore_original_extension(mut self, flag: bool) -> Self {
        self.ignore_original_extension = Some(flag);
        self
    }

    pub fn guess_extension(mut self, flag: bool) -> Self {
        self.guess_extension = Some(flag);
        self
    }

    pub fn uniqueness(mut self, scope: UniquenessScope) -> Self {
        self.uniqueness = Some(scope);
        self
    }

    pub fn acl(mut self, acl: Acl) -> Self {
        self.acl = Some(acl);
        self
    }

    pub fn delete_local_on_save(mut self, flag: bool) -> Self {
        self.delete_local_on_save = Some(flag);
        self
    }
}

/// Column names of the three fields this crate manages on a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    pub path: String,
    pub is_saved: String,
    pub is_deleted: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            path: "s3_path".into(),
            is_saved: "s3_is_saved".into(),
            is_deleted: "s3_is_deleted".into(),
        }
    }
}

impl ColumnMap {
    /// Every column must be a plain SQL identifier; they are spliced into
    /// queries verbatim.
    pub fn validate(&self) -> SaveableResult<()> {
        for (setting, column) in [
            ("columns.path", &self.path),
            ("columns.is_saved", &self.is_saved),
            ("columns.is_deleted", &self.is_deleted),
        ] {
            validate_identifier(setting, column)?;
        }
        Ok(())
    }
}

pub fn validate_identifier(setting: &str, ident: &str) -> SaveableResult<()> {
    if ident.is_empty() {
        return Err(SaveableError::missing_config(setting, ident));
    }
    let mut chars = ident.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !starts_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(SaveableError::ConfigurationInvalid {
            setting: setting.to_string(),
            reason: format!("`{}` is not a valid column identifier", ident),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_upload_conventions() {
        let policy = NamingPolicy::default();
        assert!(policy.generate_random);
        assert!(policy.extension.guess);
        assert_eq!(policy.uniqueness, UniquenessScope::Local);
        assert_eq!(policy.acl, Acl::PublicRead);
        assert_eq!(policy.max_attempts(), 10);
    }

    #[test]
    fn apply_only_touches_set_fields() {
        let base = NamingPolicy {
            dir: "docs".into(),
            ..NamingPolicy::default()
        };
        let merged = base.apply(
            &PolicyOverrides::new()
                .base_filename("report")
                .uniqueness(UniquenessScope::Both),
        );

        assert_eq!(merged.dir, "docs");
        assert_eq!(merged.base_filename.as_deref(), Some("report"));
        assert_eq!(merged.uniqueness, UniquenessScope::Both);
        assert_eq!(merged.acl, base.acl);
        // The receiver is never mutated.
        assert_eq!(base.base_filename, None);
    }

    #[test]
    fn empty_override_clears_explicit_name() {
        let base = NamingPolicy {
            base_filename: Some("fixed".into()),
            ..NamingPolicy::default()
        };
        let merged = base.apply(&PolicyOverrides::new().base_filename(""));
        assert_eq!(merged.base_filename, None);
    }

    #[test]
    fn overrides_deserialize_from_partial_json() {
        let overrides: PolicyOverrides =
            serde_json::from_str(r#"{"dir":"avatars","acl":"private"}"#).unwrap();
        assert_eq!(overrides.dir.as_deref(), Some("avatars"));
        assert_eq!(overrides.acl, Some(Acl::Private));
        assert_eq!(overrides.generate_random, None);
    }

    #[test]
    fn column_map_rejects_empty_and_unsafe_names() {
        assert!(ColumnMap::default().validate().is_ok());

        let empty = ColumnMap {
            path: String::new(),
            ..ColumnMap::default()
        };
        assert!(matches!(
            empty.validate(),
            Err(SaveableError::ConfigurationMissing { .. })
        ));

        let unsafe_name = ColumnMap {
            is_saved: "saved; drop table".into(),
            ..ColumnMap::default()
        };
        assert!(matches!(
            unsafe_name.validate(),
            Err(SaveableError::ConfigurationInvalid { .. })
        ));
    }

    #[test]
    fn scope_flags_round_trip() {
        for (local, remote) in [(false, false), (true, false), (false, true), (true, true)] {
            let scope = UniquenessScope::from_flags(local, remote);
            assert_eq!(scope.checks_local(), local);
            assert_eq!(scope.checks_remote(), remote);
        }
        assert_eq!("both".parse::<UniquenessScope>().unwrap(), UniquenessScope::Both);
        assert!("sometimes".parse::<UniquenessScope>().is_err());
    }
}
