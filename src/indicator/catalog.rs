use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Currency/rate indicators that are averaged rather than disaggregated.
pub const RATE_INDICATORS: [&str; 2] = ["MEDIAN_GROSS_RENT_PCT_HH_INCOME", "PCI"];

/// How an indicator is coarsened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndicatorKind {
    /// A count normalized by the named denominator column: weighted, summed, then divided.
    Count { total: String },
    /// A currency or rate value: broadcast and averaged. Population weights are
    /// computed for these too but never enter the result.
    Rate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: IndicatorKind,
}

impl IndicatorSpec {
    pub fn count(name: &str, total: &str) -> Self {
        Self { name: name.into(), kind: IndicatorKind::Count { total: total.into() } }
    }

    pub fn rate(name: &str) -> Self {
        Self { name: name.into(), kind: IndicatorKind::Rate }
    }
}

/// Denominator column for a unit label: `Some(Some(col))` for count units,
/// `Some(None)` for units without a denominator, `None` for unknown units.
pub fn denominator_for_units(units: &str) -> Option<Option<&'static str>> {
    Some(match units.trim().to_ascii_lowercase().as_str() {
        "persons commuting" => Some("TOTAL_COMMUTE_POP"),
        "persons" => Some("TOTPOP"),
        "housing units" | "housing structures" => Some("HU"),
        "households" | "housholds" => Some("HH"),
        "dollars" | "children" => None,
        _ => return None,
    })
}

/// The set of indicators a batch processes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorCatalog {
    specs: Vec<IndicatorSpec>,
}

impl IndicatorCatalog {
    pub fn new(specs: Vec<IndicatorSpec>) -> Self { Self { specs } }

    /// Build the count-type catalog from `(indicator name, unit label)` pairs,
    /// followed by the default rate-type indicators.
    ///
    /// Indicators that are their own denominator, and units without one, are left out.
    pub fn from_units<'a>(units: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let counts = units.into_iter()
            .filter_map(|(name, unit)| match denominator_for_units(unit) {
                Some(Some(total)) if total != name => Some((name.to_string(), total)),
                Some(_) => None,
                None => {
                    debug!("ignoring indicator {name} with unknown units {unit:?}");
                    None
                }
            })
            .collect::<BTreeMap<_, _>>();

        let specs = RATE_INDICATORS.iter().map(|name| IndicatorSpec::rate(name))
            .chain(counts.into_iter().map(|(name, total)| IndicatorSpec::count(&name, total)))
            .collect();
        Self { specs }
    }

    #[inline] pub fn len(&self) -> usize { self.specs.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.specs.is_empty() }

    #[inline] pub fn iter(&self) -> impl Iterator<Item = &IndicatorSpec> + '_ { self.specs.iter() }

    /// Keep only the named indicators.
    pub fn retain_names(&mut self, names: &[String]) {
        self.specs.retain(|spec| names.contains(&spec.name));
    }
}
