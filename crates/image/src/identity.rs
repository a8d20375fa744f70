//! Module identities and display names.
//!
//! An [`Identity`] names a module by simple name, version, culture and public
//! key token. Identities read from an image are always complete; identities
//! built from a request may leave the version (or its build and revision)
//! unspecified.
//!
//! Display names use the familiar comma-separated form:
//!
//! ```text
//! Dependency, Version=2.5.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089
//! ```

use crate::error::{IdentityError, IdentityResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Version
// =============================================================================

/// A four-part module version.
///
/// `major` and `minor` are always present; `build` and `revision` may be left
/// out of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub build: Option<u16>,
    pub revision: Option<u16>,
}

impl Version {
    /// A complete version.
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Self {
            major,
            minor,
            build: Some(build),
            revision: Some(revision),
        }
    }

    /// A version with only major and minor specified.
    pub const fn partial(major: u16, minor: u16) -> Self {
        Self {
            major,
            minor,
            build: None,
            revision: None,
        }
    }

    /// Fill absent fields with zero.
    pub fn normalized(self) -> Self {
        Self {
            build: Some(self.build.unwrap_or(0)),
            revision: Some(self.revision.unwrap_or(0)),
            ..self
        }
    }

    pub fn is_complete(&self) -> bool {
        self.build.is_some() && self.revision.is_some()
    }

    fn fields(&self) -> [Option<u16>; 4] {
        [Some(self.major), Some(self.minor), self.build, self.revision]
    }

    fn strict_tuple(&self) -> (u16, u16, u16, u16) {
        (
            self.major,
            self.minor,
            self.build.unwrap_or(0),
            self.revision.unwrap_or(0),
        )
    }

    /// Lexicographic comparison with absent fields counted as zero.
    pub fn strict_cmp(&self, other: &Version) -> Ordering {
        self.strict_tuple().cmp(&other.strict_tuple())
    }

    /// Exact equality with absent fields counted as zero.
    ///
    /// This is the comparison used for explicit loads, where no wildcard is
    /// allowed.
    pub fn strict_eq(&self, other: &Version) -> bool {
        self.strict_cmp(other) == Ordering::Equal
    }

    /// Whether a module loaded at version `loaded` satisfies a request for
    /// `self`.
    ///
    /// The request is satisfied when it is lower than or equal to `loaded`.
    /// Fields absent from the request match any value in that position.
    pub fn is_satisfied_by(&self, loaded: &Version) -> bool {
        for (requested, have) in self.fields().into_iter().zip(loaded.fields()) {
            let Some(requested) = requested else {
                continue;
            };
            match requested.cmp(&have.unwrap_or(0)) {
                Ordering::Less => return true,
                Ordering::Greater => return false,
                Ordering::Equal => {}
            }
        }
        true
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(build) = self.build {
            write!(f, ".{}", build)?;
            if let Some(revision) = self.revision {
                write!(f, ".{}", revision)?;
            }
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = IdentityError;

    fn from_str(s: &str) -> IdentityResult<Self> {
        let invalid = || IdentityError::InvalidVersion(s.to_string());
        let parts = s
            .trim()
            .split('.')
            .map(|part| part.trim().parse::<u16>().map_err(|_| invalid()))
            .collect::<IdentityResult<Vec<u16>>>()?;

        match parts.as_slice() {
            [major, minor] => Ok(Version::partial(*major, *minor)),
            [major, minor, build] => Ok(Version {
                major: *major,
                minor: *minor,
                build: Some(*build),
                revision: None,
            }),
            [major, minor, build, revision] => Ok(Version::new(*major, *minor, *build, *revision)),
            _ => Err(invalid()),
        }
    }
}

// =============================================================================
// Public key token
// =============================================================================

/// The 8-byte public key token of a signed module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKeyToken(pub [u8; 8]);

impl fmt::Display for PublicKeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for PublicKeyToken {
    type Err = IdentityError;

    fn from_str(s: &str) -> IdentityResult<Self> {
        let s = s.trim();
        let invalid = || IdentityError::InvalidPublicKeyToken(s.to_string());
        if s.len() != 16 || !s.is_ascii() {
            return Err(invalid());
        }
        let mut token = [0u8; 8];
        for (i, byte) in token.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(PublicKeyToken(token))
    }
}

// =============================================================================
// Identity
// =============================================================================

/// The identity of a requested or loaded module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub version: Option<Version>,
    /// `None` is the neutral culture.
    pub culture: Option<String>,
    pub public_key_token: Option<PublicKeyToken>,
}

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            culture: None,
            public_key_token: None,
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        let culture = culture.into();
        self.culture = if culture.eq_ignore_ascii_case("neutral") || culture.is_empty() {
            None
        } else {
            Some(culture)
        };
        self
    }

    pub fn with_public_key_token(mut self, token: PublicKeyToken) -> Self {
        self.public_key_token = Some(token);
        self
    }

    /// Parse a display name.
    pub fn parse(display_name: &str) -> IdentityResult<Self> {
        display_name.parse()
    }

    /// Names compare ASCII case-insensitively.
    pub fn name_eq(&self, other: &Identity) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }

    /// The key under which records of this name are stored.
    pub fn name_key(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    pub fn culture_eq(&self, other: &Identity) -> bool {
        match (&self.culture, &other.culture) {
            (None, None) => true,
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }

    /// The version with absent fields filled with zero.
    pub fn strict_version(&self) -> Version {
        self.version
            .map(Version::normalized)
            .unwrap_or(Version::new(0, 0, 0, 0))
    }

    /// Whether this identity could describe a module loaded from an image:
    /// non-empty name and a version.
    pub fn is_definition(&self) -> bool {
        !self.name.trim().is_empty() && self.version.is_some()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(version) = &self.version {
            write!(f, ", Version={}", version)?;
        }
        if let Some(culture) = &self.culture {
            write!(f, ", Culture={}", culture)?;
        }
        if let Some(token) = &self.public_key_token {
            write!(f, ", PublicKeyToken={}", token)?;
        }
        Ok(())
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> IdentityResult<Self> {
        let mut components = s.split(',');
        let name = components.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(IdentityError::EmptyName);
        }

        let mut identity = Identity::new(name);
        let mut seen: Vec<String> = Vec::new();

        for component in components {
            let component = component.trim();
            let (key, value) = component
                .split_once('=')
                .ok_or_else(|| IdentityError::MalformedComponent(component.to_string()))?;
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            if seen.contains(&key) {
                return Err(IdentityError::DuplicateProperty(key));
            }

            match key.as_str() {
                "version" => identity.version = Some(value.parse()?),
                "culture" => identity = identity.with_culture(value),
                "publickeytoken" => {
                    if !value.eq_ignore_ascii_case("null") {
                        identity.public_key_token = Some(value.parse()?);
                    }
                }
                _ => return Err(IdentityError::UnknownProperty(key)),
            }
            seen.push(key);
        }

        Ok(identity)
    }
}

// =============================================================================
// Qualified type names
// =============================================================================

/// A type name qualified with the display name of its module, e.g.
/// `Dependency.Widget, Dependency, Version=2.5.0.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedTypeName {
    pub type_name: String,
    pub module: Identity,
}

impl QualifiedTypeName {
    pub fn parse(s: &str) -> IdentityResult<Self> {
        // Generic arguments may contain commas of their own.
        let mut depth = 0usize;
        let mut split_at = None;
        for (i, c) in s.char_indices() {
            match c {
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    split_at = Some(i);
                    break;
                }
                _ => {}
            }
        }

        let split_at = split_at.ok_or_else(|| IdentityError::UnqualifiedTypeName(s.to_string()))?;
        let type_name = s[..split_at].trim();
        if type_name.is_empty() {
            return Err(IdentityError::UnqualifiedTypeName(s.to_string()));
        }
        let module = s[split_at + 1..].parse()?;

        Ok(Self {
            type_name: type_name.to_string(),
            module,
        })
    }
}

impl fmt::Display for QualifiedTypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.type_name, self.module)
    }
}
