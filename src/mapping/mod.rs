//! Mapping configuration: the dimension-to-hardware assignment rules
//! loaded once per exploration run, and the spatial/temporal mapping
//! objects bound per candidate.

pub mod spatial;
pub mod temporal;

pub use spatial::{SpatialMapping, Unroll};
pub use temporal::TemporalMapping;

use indexmap::IndexMap;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::hardware::CoreId;

/// Sentinel key whose rule applies to any operator without its own entry.
pub const DEFAULT_RULE: &str = "default";

#[derive(thiserror::Error, Debug)]
pub enum ResolutionError {
    #[error("cannot read mapping resource {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("mapping resource {} is not valid JSON: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("mapping resource {} does not expose a `mapping` member", .path.display())]
    MissingMappingSymbol { path: PathBuf },
    #[error("mapping rule {rule:?} is invalid: {reason}")]
    InvalidRule { rule: String, reason: String },
}

/// How one operator (or the default) is assigned to hardware.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MappingRule {
    /// Id of the core the matching layers run on.
    pub core_allocation: CoreId,
    /// Suggested unrolls: array dimension to (loop dimension, factor).
    #[serde(default)]
    pub spatial_mapping: IndexMap<String, (String, f64)>,
    /// Memory operand bound to each logical operand (e.g. "W" -> "I2").
    #[serde(default)]
    pub memory_operand_links: IndexMap<String, String>,
}

impl MappingRule {
    /// The rule's unroll hints as an idealized spatial mapping, in table
    /// order.
    pub fn suggested_spatial(&self) -> SpatialMapping {
        SpatialMapping::new(
            self.spatial_mapping
                .iter()
                .map(|(array_dim, (dimension, factor))| Unroll {
                    array_dim: array_dim.clone(),
                    dimension: dimension.clone(),
                    factor: *factor,
                })
                .collect(),
        )
    }
}

/// The rule table of a mapping resource, keyed by operator type or layer
/// name. Read-only for the lifetime of an exploration run.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct MappingTable {
    rules: IndexMap<String, MappingRule>,
}

impl MappingTable {
    /// Loads and validates the `mapping` member of the JSON resource at
    /// `path`.
    ///
    /// Logs the entry count and default-rule presence; both are also
    /// queryable through [MappingTable::len] and
    /// [MappingTable::has_default].
    pub fn from_path(path: impl AsRef<Path>) -> Result<MappingTable, ResolutionError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ResolutionError::Unreadable {
            path: path.to_owned(),
            source,
        })?;
        let doc: serde_json::Value =
            serde_json::from_str(&text).map_err(|source| ResolutionError::Malformed {
                path: path.to_owned(),
                source,
            })?;
        let member = doc
            .get("mapping")
            .ok_or_else(|| ResolutionError::MissingMappingSymbol {
                path: path.to_owned(),
            })?;
        let table: MappingTable = serde_json::from_value(member.clone()).map_err(|source| {
            ResolutionError::Malformed {
                path: path.to_owned(),
                source,
            }
        })?;
        table.validate()?;
        info!(
            "Parsed mapping with {} different entries. Default is {}present.",
            table.len(),
            if table.has_default() { "" } else { "not " },
        );
        Ok(table)
    }

    /// Builds a table directly from rules, applying the same validation
    /// as [MappingTable::from_path].
    pub fn from_rules(
        rules: IndexMap<String, MappingRule>,
    ) -> Result<MappingTable, ResolutionError> {
        let table = MappingTable { rules };
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<(), ResolutionError> {
        for (name, rule) in &self.rules {
            for (array_dim, (dim, factor)) in &rule.spatial_mapping {
                if !factor.is_finite() || *factor <= 0.0 {
                    return Err(ResolutionError::InvalidRule {
                        rule: name.clone(),
                        reason: format!(
                            "unroll of {dim} over {array_dim} has non-positive factor {factor}"
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether unmapped operators fall back to a rule instead of failing.
    pub fn has_default(&self) -> bool {
        self.rules.contains_key(DEFAULT_RULE)
    }

    /// The rule for `op`, falling back to the default rule if present.
    pub fn rule_for(&self, op: &str) -> Option<&MappingRule> {
        self.rules.get(op).or_else(|| self.rules.get(DEFAULT_RULE))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MappingRule)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v))
    }
}
