//! Hierarchical `<path>@<platform>` names and the ancestor-path algorithm.
//!
//! A certificate subject is named by a dotted path (`name.tld`), a wildcard
//! (`*`, `*.tld`), a token reference (`<address>#<tokenId>`) or the empty
//! platform root, qualified by the ledger platform it lives on:
//!
//! ```text
//! name.tld@eth        ->  ["*.tld", "*", ""]
//! *.tld@eth           ->  ["*", ""]
//! 0xAbC..#1@eth       ->  ["0xAbC..", "*", ""]
//! @eth                ->  []
//! ```
//!
//! The ancestor list is the admissible-issuer order, most specific first.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wildcard label.
pub const WILDCARD: &str = "*";

/// Separator between a path and its platform.
pub const PLATFORM_SEPARATOR: char = '@';

/// Separator between a token contract address and the token id.
pub const TOKEN_SEPARATOR: char = '#';

/// Errors raised while parsing names or computing ancestor paths.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("Missing platform in name '{0}': expected <path>@<platform>")]
    MissingPlatform(String),

    #[error("Empty platform in name '{0}'")]
    EmptyPlatform(String),

    #[error("Wildcard may only appear as the leading label: '{0}'")]
    MisplacedWildcard(String),

    #[error("Token reference may contain at most one '#': '{0}'")]
    MultipleTokenSeparators(String),

    #[error("Empty label in path '{0}'")]
    EmptyLabel(String),
}

/// A parsed `<pathName>@<platformName>` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathPlatformId {
    path_name: String,
    platform_name: String,
}

impl PathPlatformId {
    /// Build an identifier from its parts, validating the path grammar.
    pub fn new(path_name: impl Into<String>, platform_name: impl Into<String>) -> Result<Self, NameError> {
        let path_name = path_name.into();
        let platform_name = platform_name.into();
        if platform_name.is_empty() {
            return Err(NameError::EmptyPlatform(format!("{path_name}@")));
        }
        validate_path(&path_name)?;
        Ok(Self {
            path_name,
            platform_name,
        })
    }

    pub fn path_name(&self) -> &str {
        &self.path_name
    }

    pub fn platform_name(&self) -> &str {
        &self.platform_name
    }

    /// True for the platform root (`@eth`).
    pub fn is_root(&self) -> bool {
        self.path_name.is_empty()
    }

    /// True for a `<address>#<tokenId>` path.
    pub fn is_token_reference(&self) -> bool {
        self.path_name.contains(TOKEN_SEPARATOR)
    }

    /// Same platform, different path.
    pub fn with_path(&self, path_name: impl Into<String>) -> Result<Self, NameError> {
        Self::new(path_name, self.platform_name.clone())
    }

    /// Ancestor identifiers on the same platform, most specific first.
    pub fn ancestors(&self) -> Result<Vec<PathPlatformId>, NameError> {
        calculate_chain_paths(&self.path_name)?
            .into_iter()
            .map(|path| self.with_path(path))
            .collect()
    }
}

impl fmt::Display for PathPlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.path_name, PLATFORM_SEPARATOR, self.platform_name)
    }
}

impl FromStr for PathPlatformId {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path_name, platform_name) = extract_path(s)?;
        Self::new(path_name, platform_name)
    }
}

impl TryFrom<String> for PathPlatformId {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PathPlatformId> for String {
    fn from(value: PathPlatformId) -> Self {
        value.to_string()
    }
}

/// Split an identifier on its last `@` into `(pathName, platformName)`.
pub fn extract_path(id: &str) -> Result<(String, String), NameError> {
    let (path, platform) = id
        .rsplit_once(PLATFORM_SEPARATOR)
        .ok_or_else(|| NameError::MissingPlatform(id.to_string()))?;
    if platform.is_empty() {
        return Err(NameError::EmptyPlatform(id.to_string()));
    }
    Ok((path.to_string(), platform.to_string()))
}

/// Compute the ordered list of admissible issuer paths for `path_name`.
///
/// The list is most specific first and always ends with the platform root
/// `""`, except for the root itself which has no parent.
pub fn calculate_chain_paths(path_name: &str) -> Result<Vec<String>, NameError> {
    validate_path(path_name)?;
    Ok(chain_paths(path_name))
}

fn chain_paths(path_name: &str) -> Vec<String> {
    if path_name.is_empty() {
        return Vec::new();
    }
    if path_name == WILDCARD {
        return vec![String::new()];
    }

    if let Some(rest) = path_name.strip_prefix("*.") {
        if path_name.split('.').count() <= 2 {
            return vec![WILDCARD.to_string(), String::new()];
        }
        return chain_paths(rest);
    }

    if let Some((address, _token_id)) = path_name.split_once(TOKEN_SEPARATOR) {
        let mut paths = vec![address.to_string()];
        paths.extend(chain_paths(address));
        return paths;
    }

    if let Some((_, parent)) = path_name.split_once('.') {
        let wildcard = format!("*.{parent}");
        let mut paths = chain_paths(&wildcard);
        paths.insert(0, wildcard);
        return paths;
    }

    vec![WILDCARD.to_string(), String::new()]
}

fn validate_path(path_name: &str) -> Result<(), NameError> {
    if path_name.is_empty() {
        return Ok(());
    }
    if path_name.matches(TOKEN_SEPARATOR).count() > 1 {
        return Err(NameError::MultipleTokenSeparators(path_name.to_string()));
    }
    for (index, label) in path_name.split('.').enumerate() {
        if label.is_empty() {
            return Err(NameError::EmptyLabel(path_name.to_string()));
        }
        if label.contains('*') && (index != 0 || label != WILDCARD) {
            return Err(NameError::MisplacedWildcard(path_name.to_string()));
        }
    }
    Ok(())
}

/// True when `issuer_path` may issue a certificate for `subject_path`.
pub fn is_admissible_issuer(subject_path: &str, issuer_path: &str) -> Result<bool, NameError> {
    Ok(calculate_chain_paths(subject_path)?
        .iter()
        .any(|candidate| candidate == issuer_path))
}
