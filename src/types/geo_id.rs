use std::{fmt, sync::Arc};

use super::geo_type::GeoType;

/// Stable key for a region (e.g. a census tract).
/// Keep the original GEOID text (with leading zeros) but avoid repeated owned Strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId {
    id: Arc<str>, // e.g., "48453001100" for a tract
}

impl RegionId {
    pub fn new(id: &str) -> Self {
        Self { id: Arc::from(id.trim()) }
    }

    #[inline] pub fn id(&self) -> &str { &self.id }

    /// Whether the id has the canonical length for the given geography.
    #[inline] pub fn is_type(&self, ty: GeoType) -> bool { self.id.len() == ty.id_len() }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl From<&str> for RegionId {
    fn from(id: &str) -> Self { Self::new(id) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_trimmed_and_keep_leading_zeros() {
        let id = RegionId::new(" 01001020100 ");
        assert_eq!(id.id(), "01001020100");
        assert!(id.is_type(GeoType::Tract));
        assert!(!id.is_type(GeoType::County));
    }

    #[test]
    fn equal_text_means_equal_ids() {
        assert_eq!(RegionId::from("48453001100"), RegionId::new("48453001100"));
        assert_ne!(RegionId::from("48453001100"), RegionId::new("48453001101"));
    }
}
