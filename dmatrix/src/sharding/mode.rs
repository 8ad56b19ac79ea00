//! Sharding and load-mode enums shared by options, planner and CLI

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::MatrixError;

/// How rows of a centrally loaded source are split between actors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardingMode {
    /// Contiguous row ranges; keeps group runs intact
    #[default]
    Batch,
    /// Rank `r` takes rows `r, r + N, r + 2N, ...`
    Interleaved,
}

/// Requested load mode
///
/// Serialized as `"auto"`, `true` or `false`; the strings `"true"`,
/// `"false"`, `"distributed"` and `"centralized"` are accepted as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DistributedMode {
    /// Infer from the source
    #[default]
    Auto,
    /// Force distributed loading; rejected for non-splittable sources
    Distributed,
    /// Force every actor to load the full source
    Centralized,
}

impl Serialize for DistributedMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DistributedMode::Auto => serializer.serialize_str("auto"),
            DistributedMode::Distributed => serializer.serialize_bool(true),
            DistributedMode::Centralized => serializer.serialize_bool(false),
        }
    }
}

impl<'de> Deserialize<'de> for DistributedMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Flag(true) => Ok(DistributedMode::Distributed),
            Repr::Flag(false) => Ok(DistributedMode::Centralized),
            Repr::Name(name) => name.parse().map_err(de::Error::custom),
        }
    }
}

/// Resolved load mode of a matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    Centralized,
    Distributed,
}

impl fmt::Display for ShardingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardingMode::Batch => write!(f, "batch"),
            ShardingMode::Interleaved => write!(f, "interleaved"),
        }
    }
}

impl fmt::Display for DistributedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributedMode::Auto => write!(f, "auto"),
            DistributedMode::Distributed => write!(f, "true"),
            DistributedMode::Centralized => write!(f, "false"),
        }
    }
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadMode::Centralized => write!(f, "centralized"),
            LoadMode::Distributed => write!(f, "distributed"),
        }
    }
}

impl FromStr for ShardingMode {
    type Err = MatrixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "batch" => Ok(ShardingMode::Batch),
            "interleaved" => Ok(ShardingMode::Interleaved),
            other => Err(MatrixError::Config(format!(
                "unknown sharding mode '{}' (expected batch or interleaved)",
                other
            ))),
        }
    }
}

impl FromStr for DistributedMode {
    type Err = MatrixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(DistributedMode::Auto),
            "true" | "distributed" => Ok(DistributedMode::Distributed),
            "false" | "centralized" => Ok(DistributedMode::Centralized),
            other => Err(MatrixError::Config(format!(
                "unknown distributed mode '{}' (expected auto, true or false)",
                other
            ))),
        }
    }
}
