//! Matrix options
//!
//! Everything that can be written down in a config file lives here. Arrays
//! supplied in memory (labels, auxiliary arrays, feature weights) are
//! attached through [`MatrixBuilder`](super::MatrixBuilder) instead.
//!
//! ```toml
//! sharding = "batch"
//! distributed = "auto"
//! num_actors = 4
//! label = "label"
//! ignore = ["id"]
//! qid = "group"
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{MatrixError, Result};
use crate::sharding::{DistributedMode, ShardingMode};

use super::payload::AuxField;

/// One label column or several (multi-output)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelColumns {
    One(String),
    Many(Vec<String>),
}

impl LabelColumns {
    pub fn names(&self) -> Vec<String> {
        match self {
            LabelColumns::One(name) => vec![name.clone()],
            LabelColumns::Many(names) => names.clone(),
        }
    }
}

/// Declarative matrix configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixOptions {
    /// Row sharding policy for centralized loading
    pub sharding: ShardingMode,

    /// Load mode override
    pub distributed: DistributedMode,

    /// Actor count to plan for at construction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_actors: Option<usize>,

    /// Defer mode inference and planning until the first data access
    pub lazy: bool,

    /// Label column(s)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<LabelColumns>,

    /// Columns to keep, in this order, right after load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,

    /// Columns dropped from the features
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_margin: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_lower_bound: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_upper_bound: Option<String>,

    /// Group/query identifier column
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qid: Option<String>,
}

impl MatrixOptions {
    /// Parse options from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let options: Self = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "Failed to read options file"
            );
            e
        })?;

        let options = Self::from_toml_str(&content)?;
        tracing::info!(path = %path.display(), "Matrix options loaded");
        Ok(options)
    }

    /// Save options as TOML (temp file, then rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)?;

        let temp_path = path.with_extension("toml.tmp");
        fs::write(&temp_path, &toml_string).map_err(|e| {
            tracing::error!(
                path = %temp_path.display(),
                error = %e,
                "Failed to write temp options file"
            );
            e
        })?;
        fs::rename(&temp_path, path)?;

        tracing::info!(path = %path.display(), "Matrix options saved");
        Ok(())
    }

    /// Label column names, empty when the label is not a column
    pub fn label_columns(&self) -> Vec<String> {
        self.label.as_ref().map(LabelColumns::names).unwrap_or_default()
    }

    /// Column holding `field`, if it is referenced by name
    pub fn aux_column(&self, field: AuxField) -> Option<&str> {
        match field {
            AuxField::Weight => self.weight.as_deref(),
            AuxField::BaseMargin => self.base_margin.as_deref(),
            AuxField::LabelLowerBound => self.label_lower_bound.as_deref(),
            AuxField::LabelUpperBound => self.label_upper_bound.as_deref(),
            AuxField::Qid => self.qid.as_deref(),
        }
    }

    pub fn aux_column_mut(&mut self, field: AuxField) -> &mut Option<String> {
        match field {
            AuxField::Weight => &mut self.weight,
            AuxField::BaseMargin => &mut self.base_margin,
            AuxField::LabelLowerBound => &mut self.label_lower_bound,
            AuxField::LabelUpperBound => &mut self.label_upper_bound,
            AuxField::Qid => &mut self.qid,
        }
    }

    /// Auxiliary columns referenced by name
    pub fn aux_columns(&self) -> Vec<(AuxField, &str)> {
        AuxField::ALL
            .into_iter()
            .filter_map(|field| self.aux_column(field).map(|c| (field, c)))
            .collect()
    }

    /// Reject impossible option combinations
    pub fn validate(&self) -> Result<()> {
        if self.num_actors == Some(0) {
            return Err(MatrixError::Config(
                "num_actors must be at least 1".to_string(),
            ));
        }

        if matches!(&self.label, Some(LabelColumns::Many(names)) if names.is_empty()) {
            return Err(MatrixError::Config("label column list is empty".to_string()));
        }

        let mut roles = BTreeSet::new();
        let label = self.label_columns();
        let aux = self.aux_columns();
        let named = label
            .iter()
            .map(|c| ("label", c.as_str()))
            .chain(aux.iter().map(|(field, c)| (field.name(), *c)));
        for (role, column) in named {
            if !roles.insert(column) {
                return Err(MatrixError::Config(format!(
                    "column '{}' is used more than once (again as {})",
                    column, role
                )));
            }
        }

        if let Some(columns) = &self.columns {
            if let Some(missing) = roles
                .iter()
                .copied()
                .find(|c| !columns.iter().any(|k| k.as_str() == *c))
            {
                return Err(MatrixError::Config(format!(
                    "column '{}' is referenced but not in the selected columns {:?}",
                    missing, columns
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let options = MatrixOptions::default();
        assert_eq!(options.sharding, ShardingMode::Batch);
        assert_eq!(options.distributed, DistributedMode::Auto);
        assert!(!options.lazy);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let options = MatrixOptions::from_toml_str(
            r#"
            sharding = "interleaved"
            distributed = false
            num_actors = 4
            label = ["y1", "y2"]
            qid = "group"
            "#,
        )
        .unwrap();
        assert_eq!(options.sharding, ShardingMode::Interleaved);
        assert_eq!(options.distributed, DistributedMode::Centralized);
        assert_eq!(options.num_actors, Some(4));
        assert_eq!(options.label_columns(), vec!["y1", "y2"]);
        assert_eq!(options.aux_columns(), vec![(AuxField::Qid, "group")]);
    }

    #[test]
    fn test_validate_rejects_zero_actors() {
        let options = MatrixOptions {
            num_actors: Some(0),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shared_column() {
        let options = MatrixOptions {
            label: Some(LabelColumns::One("y".into())),
            weight: Some("y".into()),
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let duplicate_label = MatrixOptions {
            label: Some(LabelColumns::Many(vec!["y".into(), "y".into()])),
            ..Default::default()
        };
        assert!(duplicate_label.validate().is_err());
    }

    #[test]
    fn test_validate_selected_columns_include_label() {
        let options = MatrixOptions {
            label: Some(LabelColumns::One("label".into())),
            columns: Some(vec!["a".into(), "b".into()]),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("matrix.toml");

        let options = MatrixOptions {
            distributed: DistributedMode::Distributed,
            num_actors: Some(2),
            label: Some(LabelColumns::One("label".into())),
            ignore: vec!["id".into()],
            ..Default::default()
        };
        options.save(&path).unwrap();

        assert_eq!(MatrixOptions::load(&path).unwrap(), options);
        assert!(!path.with_extension("toml.tmp").exists());
    }
}
