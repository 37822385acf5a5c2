//! Package document model.
//!
//! This module defines [`Package`] and the records nested inside it. They
//! serialize (camelCase) to exactly the document shape mapped by
//! [`crate::schema::package_mapping`], and deserialize from the same shape
//! both in source dumps and in engine hits.
//!
//! # Creating Documents
//!
//! ```rust
//! use nusearch_index::document::{Package, PackageAuthor};
//!
//! let package = Package::builder("Newtonsoft.Json")
//!     .summary("Json.NET is a popular high-performance JSON framework for .NET")
//!     .download_count(1_000_000)
//!     .author("James Newton-King")
//!     .build();
//!
//! assert_eq!(package.authors, vec![PackageAuthor::new("James Newton-King")]);
//! ```

use chrono::{DateTime, Utc};
use nusearch_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// A package and everything nested under it.
///
/// `id` doubles as the engine document id, so loading the same source twice
/// into one generation overwrites rather than duplicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    /// Package identifier (required).
    pub id: String,

    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Short description.
    #[serde(default)]
    pub summary: String,

    /// Total downloads across versions.
    #[serde(default)]
    pub download_count: u64,

    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Authors in feed order.
    #[serde(default)]
    pub authors: Vec<PackageAuthor>,

    /// Versions in feed order.
    #[serde(default)]
    pub versions: Vec<PackageVersion>,
}

/// One published version of a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageVersion {
    /// Version string, e.g. `13.0.3`.
    pub version: String,

    /// When this version was last updated in the feed.
    pub last_updated: DateTime<Utc>,

    /// Downloads of this version alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_count: Option<u64>,

    /// Declared dependencies.
    #[serde(default)]
    pub dependencies: Vec<PackageDependency>,
}

/// A dependency declared by a package version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDependency {
    /// Target package id.
    pub name: String,

    /// Version range, e.g. `[1.0.0, )`.
    #[serde(default)]
    pub version: String,

    /// Target framework the dependency applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
}

/// A package author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageAuthor {
    /// Author display name.
    pub name: String,
}

impl PackageAuthor {
    /// Create an author from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl PackageDependency {
    /// Create a dependency on `name` within `version`.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            framework: None,
        }
    }
}

impl PackageVersion {
    /// Create a version without dependencies.
    pub fn new(version: impl Into<String>, last_updated: DateTime<Utc>) -> Self {
        Self {
            version: version.into(),
            last_updated,
            download_count: None,
            dependencies: Vec::new(),
        }
    }

    /// Add a dependency.
    pub fn with_dependency(mut self, dependency: PackageDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }
}

impl Package {
    /// Create a new document builder.
    pub fn builder(id: impl Into<String>) -> PackageBuilder {
        PackageBuilder {
            package: Package {
                id: id.into(),
                ..Default::default()
            },
        }
    }

    /// Check the invariants every indexed package must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::malformed_source(
                self.title.as_deref().unwrap_or("<untitled>"),
                "package has no id",
            ));
        }
        Ok(())
    }

    /// Most recent `last_updated` across all versions.
    ///
    /// This is the value the "recently updated" sort compares.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.versions.iter().map(|v| v.last_updated).max()
    }

    /// Whether any author's name equals `name` exactly.
    pub fn has_author(&self, name: &str) -> bool {
        self.authors.iter().any(|a| a.name == name)
    }
}

/// Builder for [`Package`].
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    package: Package,
}

impl PackageBuilder {
    /// Set the title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.package.title = Some(title.into());
        self
    }

    /// Set the summary.
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.package.summary = summary.into();
        self
    }

    /// Set the download count.
    pub fn download_count(mut self, count: u64) -> Self {
        self.package.download_count = count;
        self
    }

    /// Add a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.package.tags.push(tag.into());
        self
    }

    /// Add an author.
    pub fn author(mut self, name: impl Into<String>) -> Self {
        self.package.authors.push(PackageAuthor::new(name));
        self
    }

    /// Add a version.
    pub fn version(mut self, version: PackageVersion) -> Self {
        self.package.versions.push(version);
        self
    }

    /// Build the package.
    pub fn build(self) -> Package {
        self.package
    }
}

// ============================================================================
// Tests
// ============================================================================
