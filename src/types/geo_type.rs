use std::{fmt, str::FromStr};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Administrative geography an indicator is reported at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoType {
    State,      // Highest-level entity
    County,     // County -> State
    Tract,      // Tract -> County
    Group,      // Group -> Tract
    Block,      // Lowest-level entity
}

impl GeoType {
    pub fn to_str(&self) -> &'static str {
        match self {
            GeoType::State => "state",
            GeoType::County => "county",
            GeoType::Tract => "tract",
            GeoType::Group => "group",
            GeoType::Block => "block",
        }
    }

    /// Expected length of a full GEOID at this level.
    pub fn id_len(&self) -> usize {
        match self {
            GeoType::State  => 2,
            GeoType::County => 5,
            GeoType::Tract  => 11,
            GeoType::Group  => 12,
            GeoType::Block  => 15,
        }
    }
}

impl fmt::Display for GeoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

impl FromStr for GeoType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "state" => GeoType::State,
            "county" => GeoType::County,
            "tract" => GeoType::Tract,
            "group" | "block group" | "blockgroup" => GeoType::Group,
            "block" => GeoType::Block,
            other => bail!("unknown geography type: {other:?}"),
        })
    }
}
