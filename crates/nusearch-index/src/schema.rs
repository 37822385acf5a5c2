//! Index definition: settings, analysis and the package mapping.
//!
//! The mapping is an explicit tree of [`Property`] descriptors rather than a
//! chain of builder calls. Each text field may carry an analyzer and
//! sub-fields (multi-fields), and nested types carry their own properties.
//!
//! # Package mapping
//!
//! | Path | Type | Notes |
//! |------|------|-------|
//! | `id` | text | `nuget-id-analyzer` |
//! | `id.keyword` | text | `nuget-id-keyword`, exact-match boosting |
//! | `id.raw` | keyword | sortable |
//! | `title`, `summary` | text | standard analyzer |
//! | `downloadCount` | long | popularity signal, sort |
//! | `tags` | keyword | |
//! | `versions` | nested | `version`, `lastUpdated`, `downloadCount`, `dependencies` (nested) |
//! | `authors` | nested | `name` text + `name.raw` keyword for filter/facet |

use nusearch_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisDefinition, ID_ANALYZER, ID_KEYWORD_ANALYZER};

/// Field paths used by the query builder and the projector.
pub mod fields {
    /// Analyzed identifier.
    pub const ID: &str = "id";
    /// Lower-cased single-token identifier.
    pub const ID_KEYWORD: &str = "id.keyword";
    /// Unanalyzed identifier.
    pub const ID_RAW: &str = "id.raw";
    /// Package summary.
    pub const SUMMARY: &str = "summary";
    /// Package download count.
    pub const DOWNLOAD_COUNT: &str = "downloadCount";
    /// Nested versions.
    pub const VERSIONS: &str = "versions";
    /// Version timestamp, inside `versions`.
    pub const VERSION_LAST_UPDATED: &str = "versions.lastUpdated";
    /// Nested authors.
    pub const AUTHORS: &str = "authors";
    /// Exact author name, inside `authors`.
    pub const AUTHOR_NAME_RAW: &str = "authors.name.raw";
}

// ============================================================================
// Field descriptors
// ============================================================================

/// Type and options of one mapped field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldMapping {
    /// Analyzed full text.
    Text {
        /// Analyzer name; the engine default when `None`.
        analyzer: Option<String>,
        /// Alternate indexings of the same value.
        fields: Vec<Property>,
    },
    /// Exact, unanalyzed string.
    Keyword,
    /// 64-bit integer.
    Long,
    /// Timestamp.
    Date,
    /// Array of sub-documents indexed independently.
    Nested {
        /// Sub-document fields.
        properties: Vec<Property>,
    },
}

/// A named field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Field name (one path segment).
    pub name: String,
    /// Field type.
    pub mapping: FieldMapping,
}

impl Property {
    /// Text field with an optional analyzer.
    pub fn text(name: &str, analyzer: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            mapping: FieldMapping::Text {
                analyzer: analyzer.map(str::to_string),
                fields: Vec::new(),
            },
        }
    }

    /// Keyword field.
    pub fn keyword(name: &str) -> Self {
        Self::simple(name, FieldMapping::Keyword)
    }

    /// Long field.
    pub fn long(name: &str) -> Self {
        Self::simple(name, FieldMapping::Long)
    }

    /// Date field.
    pub fn date(name: &str) -> Self {
        Self::simple(name, FieldMapping::Date)
    }

    /// Nested field.
    pub fn nested(name: &str, properties: Vec<Property>) -> Self {
        Self::simple(name, FieldMapping::Nested { properties })
    }

    /// Add a sub-field to a text field. No-op for other types.
    pub fn with_field(mut self, field: Property) -> Self {
        if let FieldMapping::Text { fields, .. } = &mut self.mapping {
            fields.push(field);
        }
        self
    }

    fn simple(name: &str, mapping: FieldMapping) -> Self {
        Self {
            name: name.to_string(),
            mapping,
        }
    }
}

/// Root mapping of a document type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    /// Top-level fields.
    pub properties: Vec<Property>,
}

/// A dotted field path resolved against a mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedField<'a> {
    /// Mapping that applies to the path (the sub-field's for multi-fields).
    pub mapping: &'a FieldMapping,
    /// Number of leading path segments that address the source value;
    /// a trailing multi-field name is not part of the source document.
    pub source_depth: usize,
}

impl Mapping {
    /// Resolve a dotted path such as `authors.name.raw`.
    pub fn resolve(&self, path: &str) -> Option<ResolvedField<'_>> {
        let segments: Vec<&str> = path.split('.').collect();
        let mut properties = &self.properties;
        let mut i = 0;

        while i < segments.len() {
            let property = properties.iter().find(|p| p.name == segments[i])?;
            let last = i + 1 == segments.len();
            match &property.mapping {
                FieldMapping::Nested { properties: inner } if !last => {
                    properties = inner;
                }
                FieldMapping::Text { fields, .. } if !last => {
                    if i + 2 != segments.len() {
                        return None;
                    }
                    let sub = fields.iter().find(|f| f.name == segments[i + 1])?;
                    return Some(ResolvedField {
                        mapping: &sub.mapping,
                        source_depth: i + 1,
                    });
                }
                mapping if last => {
                    return Some(ResolvedField {
                        mapping,
                        source_depth: segments.len(),
                    });
                }
                _ => return None,
            }
            i += 1;
        }
        None
    }

    /// Whether `path` names a nested field.
    pub fn is_nested(&self, path: &str) -> bool {
        matches!(
            self.resolve(path),
            Some(ResolvedField {
                mapping: FieldMapping::Nested { .. },
                ..
            })
        )
    }

    fn analyzers(&self) -> Vec<&str> {
        fn collect<'a>(properties: &'a [Property], out: &mut Vec<&'a str>) {
            for property in properties {
                match &property.mapping {
                    FieldMapping::Text { analyzer, fields } => {
                        if let Some(analyzer) = analyzer {
                            out.push(analyzer);
                        }
                        collect(fields, out);
                    }
                    FieldMapping::Nested { properties } => collect(properties, out),
                    _ => {}
                }
            }
        }

        let mut out = Vec::new();
        collect(&self.properties, &mut out);
        out
    }
}

/// The package document mapping.
pub fn package_mapping() -> Mapping {
    Mapping {
        properties: vec![
            Property::text("id", Some(ID_ANALYZER))
                .with_field(Property::text("keyword", Some(ID_KEYWORD_ANALYZER)))
                .with_field(Property::keyword("raw")),
            Property::text("title", None),
            Property::text("summary", None),
            Property::long("downloadCount"),
            Property::keyword("tags"),
            Property::nested(
                "versions",
                vec![
                    Property::keyword("version"),
                    Property::date("lastUpdated"),
                    Property::long("downloadCount"),
                    Property::nested(
                        "dependencies",
                        vec![
                            Property::keyword("name"),
                            Property::keyword("version"),
                            Property::keyword("framework"),
                        ],
                    ),
                ],
            ),
            Property::nested(
                "authors",
                vec![Property::text("name", None).with_field(Property::keyword("raw"))],
            ),
        ],
    }
}

// ============================================================================
// Index definition
// ============================================================================

/// Shard layout of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Primary shards.
    pub shards: u32,
    /// Replicas; zero while building.
    pub replicas: u32,
}

/// Everything sent to the engine when creating a generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Shard layout.
    pub settings: IndexSettings,
    /// Tokenizers, filters and analyzers.
    pub analysis: AnalysisDefinition,
    /// Document mapping.
    pub mapping: Mapping,
}

impl IndexDefinition {
    /// Definition of a package generation.
    pub fn packages(settings: IndexSettings) -> Self {
        Self {
            settings,
            analysis: AnalysisDefinition::package_analysis(),
            mapping: package_mapping(),
        }
    }

    /// Validate analysis and check that the mapping only references
    /// analyzers that exist.
    pub fn validate(&self) -> Result<()> {
        if self.settings.shards == 0 {
            return Err(Error::schema("shard count must be positive"));
        }
        self.analysis.validate()?;
        for analyzer in self.mapping.analyzers() {
            if !self.analysis.has_analyzer(analyzer) {
                return Err(Error::schema(format!(
                    "mapping references unknown analyzer '{analyzer}'"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
