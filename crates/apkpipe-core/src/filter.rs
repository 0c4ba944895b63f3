//! Include/exclude rules deciding which dependencies a stage consumes.

use serde::{Deserialize, Serialize};

use apkpipe_schema::DependencyArtifact;

use crate::error::{PipelineError, Result};

/// Allow/deny rules over dependency types and coordinates.
///
/// A dependency is kept when its type is listed in `include_types`, or it
/// matches an `include_artifacts` rule, or when `skip_dependencies` is off and
/// it matches neither an `exclude_types` entry nor an `exclude_artifacts` rule.
/// Includes therefore always beat excludes.
///
/// Artifact rules take the form `group`, `group:artifact` or
/// `group:artifact:version`; each segment must match exactly. An empty rule
/// matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactFilter {
    /// Drop every dependency not explicitly included.
    pub skip_dependencies: bool,
    /// Types that are always kept.
    pub include_types: Vec<String>,
    /// Types that are dropped unless included.
    pub exclude_types: Vec<String>,
    /// Coordinates that are always kept.
    pub include_artifacts: Vec<String>,
    /// Coordinates that are dropped unless included.
    pub exclude_artifacts: Vec<String>,
}

impl ArtifactFilter {
    /// Keep everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Apply the rules, preserving input order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] if an artifact rule has more
    /// than three `:`-separated segments.
    pub fn apply<'a, I>(&self, artifacts: I) -> Result<Vec<&'a DependencyArtifact>>
    where
        I: IntoIterator<Item = &'a DependencyArtifact>,
    {
        let include_rules = parse_rules(&self.include_artifacts)?;
        let exclude_rules = parse_rules(&self.exclude_artifacts)?;

        Ok(artifacts
            .into_iter()
            .filter(|artifact| {
                let ty = artifact.package_type.as_str();
                let in_include_type = self.include_types.iter().any(|t| t == ty);
                let in_exclude_type = self.exclude_types.iter().any(|t| t == ty);
                let in_include_artifact = include_rules.iter().any(|r| r.matches(artifact));
                let in_exclude_artifact = exclude_rules.iter().any(|r| r.matches(artifact));

                in_include_type
                    || in_include_artifact
                    || (!self.skip_dependencies && !in_exclude_type && !in_exclude_artifact)
            })
            .collect())
    }
}

#[derive(Debug)]
struct ArtifactRule<'r> {
    segments: Vec<&'r str>,
}

impl ArtifactRule<'_> {
    fn matches(&self, artifact: &DependencyArtifact) -> bool {
        if self.segments.is_empty() {
            return false;
        }
        let c = &artifact.coordinate;
        let fields = [c.group.as_str(), c.artifact.as_str(), c.version.as_str()];
        self.segments
            .iter()
            .zip(fields)
            .all(|(rule, field)| *rule == field)
    }
}

fn parse_rules(rules: &[String]) -> Result<Vec<ArtifactRule<'_>>> {
    rules
        .iter()
        .map(|rule| {
            let segments: Vec<&str> = if rule.is_empty() {
                Vec::new()
            } else {
                rule.split(':').collect()
            };
            if segments.len() > 3 {
                return Err(PipelineError::config(format!(
                    "Invalid artifact qualifier '{rule}': expected group[:artifact[:version]]"
                )));
            }
            Ok(ArtifactRule { segments })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use apkpipe_schema::{Coordinate, PackageType};

    fn artifact(ty: &str, group: &str, name: &str, version: &str) -> DependencyArtifact {
        DependencyArtifact::new(
            Coordinate::new(group, name, version),
            PackageType::from(ty),
            format!("{name}.{ty}"),
        )
    }

    fn fixture() -> Vec<DependencyArtifact> {
        vec![
            artifact("jar", "G1", "A1", "1.0"),
            artifact("jar", "G2", "A1", "1.0"),
            artifact("aar", "G1", "A2", "1.0"),
            artifact("jar", "G1", "A3", "2.0-rc"),
            artifact("aar", "G2", "A2", "2.0-rc"),
        ]
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    /// Indices (1-based, matching the fixture names) of the kept artifacts.
    fn kept(filter: &ArtifactFilter) -> Vec<usize> {
        let all = fixture();
        let out = filter.apply(&all).unwrap();
        all.iter()
            .enumerate()
            .filter(|(_, a)| out.contains(a))
            .map(|(i, _)| i + 1)
            .collect()
    }

    #[test]
    fn test_skip_dependencies() {
        assert_eq!(kept(&ArtifactFilter::all()), vec![1, 2, 3, 4, 5]);
        let skip = ArtifactFilter {
            skip_dependencies: true,
            ..Default::default()
        };
        assert!(kept(&skip).is_empty());
    }

    #[test]
    fn test_include_types_survive_skip() {
        let f = ArtifactFilter {
            skip_dependencies: true,
            include_types: strings(&["aar"]),
            ..Default::default()
        };
        assert_eq!(kept(&f), vec![3, 5]);

        let f = ArtifactFilter {
            include_types: strings(&["jar"]),
            ..Default::default()
        };
        assert_eq!(kept(&f), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_exclude_types() {
        let f = ArtifactFilter {
            exclude_types: strings(&["aar"]),
            ..Default::default()
        };
        assert_eq!(kept(&f), vec![1, 2, 4]);

        let f = ArtifactFilter {
            exclude_types: strings(&["aar", "jar"]),
            ..Default::default()
        };
        assert!(kept(&f).is_empty());
    }

    #[test]
    fn test_include_type_beats_exclude_type() {
        let f = ArtifactFilter {
            include_types: strings(&["jar"]),
            exclude_types: strings(&["jar"]),
            ..Default::default()
        };
        assert_eq!(kept(&f), vec![1, 2, 3, 4, 5]);

        let f = ArtifactFilter {
            include_types: strings(&["jar"]),
            exclude_types: strings(&["aar", "jar"]),
            ..Default::default()
        };
        assert_eq!(kept(&f), vec![1, 2, 4]);
    }

    #[test]
    fn test_artifact_qualifiers() {
        let f = ArtifactFilter {
            exclude_artifacts: strings(&[""]),
            ..Default::default()
        };
        assert_eq!(kept(&f), vec![1, 2, 3, 4, 5]);

        let f = ArtifactFilter {
            skip_dependencies: true,
            include_artifacts: strings(&[""]),
            ..Default::default()
        };
        assert!(kept(&f).is_empty());

        let f = ArtifactFilter {
            skip_dependencies: true,
            include_artifacts: strings(&["G2"]),
            ..Default::default()
        };
        assert_eq!(kept(&f), vec![2, 5]);

        let f = ArtifactFilter {
            skip_dependencies: true,
            include_artifacts: strings(&["G2:A2"]),
            ..Default::default()
        };
        assert_eq!(kept(&f), vec![5]);

        let f = ArtifactFilter {
            exclude_artifacts: strings(&["G2:A2:-"]),
            ..Default::default()
        };
        assert_eq!(kept(&f), vec![1, 2, 3, 4, 5]);

        let f = ArtifactFilter {
            exclude_artifacts: strings(&["G2:A2:2.0-rc"]),
            ..Default::default()
        };
        assert_eq!(kept(&f), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_type_and_qualifier_intersection() {
        let f = ArtifactFilter {
            exclude_types: strings(&["jar"]),
            include_artifacts: strings(&["G2:A1", "G1:A3"]),
            exclude_artifacts: strings(&["G2:A1", "G1:A3"]),
            ..Default::default()
        };
        assert_eq!(kept(&f), vec![2, 3, 4, 5]);

        let f = ArtifactFilter {
            skip_dependencies: true,
            include_types: strings(&["aar"]),
            exclude_artifacts: strings(&["G2:A2:2.0-rc"]),
            ..Default::default()
        };
        assert_eq!(kept(&f), vec![3, 5]);
    }

    #[test]
    fn test_too_many_segments_is_an_error() {
        let f = ArtifactFilter {
            include_artifacts: strings(&["G1:A1:V:X"]),
            ..Default::default()
        };
        let all = fixture();
        assert!(matches!(
            f.apply(&all),
            Err(PipelineError::Configuration(_))
        ));
    }
}
