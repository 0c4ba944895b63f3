//! Artifact coordinates (`group:artifact:version[:classifier]`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Errors produced while parsing a [`Coordinate`].
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CoordinateError {
    /// Fewer than three or more than four `:`-separated segments.
    #[error("Invalid coordinate '{0}': expected group:artifact:version[:classifier]")]
    Malformed(String),

    /// One of the mandatory segments is empty.
    #[error("Invalid coordinate '{coordinate}': empty {field}")]
    EmptyField {
        /// The full coordinate string.
        coordinate: String,
        /// Name of the empty segment.
        field: &'static str,
    },
}

/// Unique identity of a dependency within one build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Coordinate {
    /// Dot separated group (e.g. `com.example.support`).
    pub group: String,
    /// Artifact name.
    pub artifact: String,
    /// Version string, kept verbatim.
    pub version: String,
    /// Optional classifier (e.g. `armeabi-v7a`).
    pub classifier: Option<String>,
}

impl Coordinate {
    /// Build a coordinate without a classifier.
    pub fn new(
        group: impl Into<String>,
        artifact: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
            version: version.into(),
            classifier: None,
        }
    }

    /// Attach a classifier.
    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    /// First letter of every dot separated part of the group.
    ///
    /// `org.apache.maven` becomes `oam`. The result is short but not
    /// necessarily unique.
    pub fn shortened_group(&self) -> String {
        self.group
            .split('.')
            .filter_map(|part| part.chars().next())
            .collect()
    }

    /// Directory name used for this artifact's staging area.
    ///
    /// Readable prefix plus the first 8 hex digits of the sha256 of the full
    /// coordinate, so two coordinates never share a key.
    ///
    /// ```
    /// use apkpipe_schema::Coordinate;
    ///
    /// let c = Coordinate::new("com.example.lib", "widgets", "1.2.0");
    /// assert_eq!(c.staging_key(), "cel_widgets_1.2.0_d1dccb06");
    /// ```
    pub fn staging_key(&self) -> String {
        let mut key = format!("{}_{}_{}", self.shortened_group(), self.artifact, self.version);
        if let Some(classifier) = &self.classifier {
            key.push('_');
            key.push_str(classifier);
        }
        let digest = Sha256::digest(self.to_string().as_bytes());
        key.push('_');
        key.push_str(&hex::encode(&digest[..4]));
        key
    }

    /// `group:artifact` without version or classifier.
    pub fn group_artifact(&self) -> String {
        format!("{}:{}", self.group, self.artifact)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{classifier}")?;
        }
        Ok(())
    }
}

impl FromStr for Coordinate {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if !(3..=4).contains(&parts.len()) {
            return Err(CoordinateError::Malformed(s.to_string()));
        }

        for (value, field) in parts.iter().zip(["group", "artifact", "version"]) {
            if value.is_empty() {
                return Err(CoordinateError::EmptyField {
                    coordinate: s.to_string(),
                    field,
                });
            }
        }

        let mut coordinate = Self::new(parts[0], parts[1], parts[2]);
        if let Some(classifier) = parts.get(3).filter(|c| !c.is_empty()) {
            coordinate.classifier = Some((*classifier).to_string());
        }
        Ok(coordinate)
    }
}

impl TryFrom<String> for Coordinate {
    type Error = CoordinateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Coordinate> for String {
    fn from(value: Coordinate) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_and_without_classifier() {
        let plain: Coordinate = "com.example:lib:1.0".parse().unwrap();
        assert_eq!(plain.classifier, None);
        assert_eq!(plain.to_string(), "com.example:lib:1.0");

        let native: Coordinate = "com.example:native:2.0:armeabi-v7a".parse().unwrap();
        assert_eq!(native.classifier.as_deref(), Some("armeabi-v7a"));
        assert_eq!(native.to_string(), "com.example:native:2.0:armeabi-v7a");
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert!(matches!(
            "com.example:lib".parse::<Coordinate>(),
            Err(CoordinateError::Malformed(_))
        ));
        assert!(matches!(
            "a:b:c:d:e".parse::<Coordinate>(),
            Err(CoordinateError::Malformed(_))
        ));
        assert!(matches!(
            "com.example::1.0".parse::<Coordinate>(),
            Err(CoordinateError::EmptyField {
                field: "artifact",
                ..
            })
        ));
    }

    #[test]
    fn test_staging_key() {
        let c = Coordinate::new("org.apache.maven", "core", "3.0");
        assert_eq!(c.shortened_group(), "oam");
        assert_eq!(c.staging_key(), "oam_core_3.0_7a8f6365");

        let classified = c.with_classifier("x86");
        assert_eq!(classified.staging_key(), "oam_core_3.0_x86_632dfa2e");
    }

    #[test]
    fn test_staging_key_distinguishes_same_abbreviation() {
        let a = Coordinate::new("com.example", "widgets", "1.0");
        let b = Coordinate::new("cx.ey", "widgets", "1.0");
        assert_eq!(a.shortened_group(), b.shortened_group());
        assert_ne!(a.staging_key(), b.staging_key());
        assert_eq!(a.staging_key(), "ce_widgets_1.0_b0a4d7f0");
        assert_eq!(b.staging_key(), "ce_widgets_1.0_bcd67701");
    }
}
