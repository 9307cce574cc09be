use ahash::AHashMap;
use anyhow::{bail, Context, Result};
use polars::{frame::DataFrame, prelude::DataType};
use tracing::{info, warn};

use crate::types::{GeoType, RegionId};

/// One reported indicator value for one region and period.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRecord {
    pub region_id: RegionId,
    pub indicator: String,
    pub year: u16,
    pub value: f64,
}

/// Filter applied to an indicator source.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorQuery {
    pub year: u16,
    pub region_type: GeoType,
    /// Restrict to rows measured in this unit category (e.g. `"count"`).
    pub measure: Option<String>,
    /// Restrict to these indicator names.
    pub names: Option<Vec<String>>,
}

impl IndicatorQuery {
    pub fn new(year: u16, region_type: GeoType) -> Self {
        Self { year, region_type, measure: None, names: None }
    }

    pub fn measure(mut self, measure: &str) -> Self {
        self.measure = Some(measure.into());
        self
    }

    pub fn names(mut self, names: &[&str]) -> Self {
        self.names = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }
}

/// External relational store of indicator values.
pub trait IndicatorSource {
    /// `(indicator name, unit label)` for every indicator the source knows.
    fn units(&self) -> Result<Vec<(String, String)>>;

    /// Rows matching the query.
    fn records(&self, query: &IndicatorQuery) -> Result<Vec<IndicatorRecord>>;
}

/// Indicator source over long-format tables.
///
/// `values` has columns `GEOID, DEMOGRAPHICS_NAME, YEAR, GEOTYPE, VALUE` and an
/// optional `UNITS` measure column; `units` has columns `NAME, UNITS`.
#[derive(Debug, Clone)]
pub struct IndicatorTable {
    values: DataFrame,
    units: DataFrame,
}

impl IndicatorTable {
    pub fn new(values: DataFrame, units: DataFrame) -> Result<Self> {
        for col in ["GEOID", "DEMOGRAPHICS_NAME", "YEAR", "GEOTYPE", "VALUE"] {
            values.column(col).with_context(|| format!("[indicator::relation] values table missing column {col:?}"))?;
        }
        for col in ["NAME", "UNITS"] {
            units.column(col).with_context(|| format!("[indicator::relation] units table missing column {col:?}"))?;
        }
        Ok(Self { values, units })
    }
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let col = df.column(name)?.cast(&DataType::String)?;
    Ok(col.str()?.into_iter().map(|v| v.map(str::to_string)).collect())
}

impl IndicatorSource for IndicatorTable {
    fn units(&self) -> Result<Vec<(String, String)>> {
        let names = string_column(&self.units, "NAME")?;
        let units = string_column(&self.units, "UNITS")?;
        Ok(names.into_iter().zip(units)
            .filter_map(|(n, u)| Some((n?, u?)))
            .collect())
    }

    fn records(&self, query: &IndicatorQuery) -> Result<Vec<IndicatorRecord>> {
        let df = &self.values;
        let geo_ids = string_column(df, "GEOID")?;
        let names = string_column(df, "DEMOGRAPHICS_NAME")?;
        let geo_types = string_column(df, "GEOTYPE")?;
        let years = df.column("YEAR")?.cast(&DataType::Int64)?;
        let values = df.column("VALUE")?.cast(&DataType::Float64)?;
        let measures = match df.column("UNITS") {
            Ok(_) => Some(string_column(df, "UNITS")?),
            Err(_) => None,
        };

        let region_type = query.region_type.to_str();
        let mut out = Vec::new();
        for (i, (year, value)) in years.i64()?.into_iter().zip(values.f64()?.into_iter()).enumerate() {
            let (Some(year), Some(value)) = (year, value) else { continue };
            if year != query.year as i64 { continue }
            let (Some(geo_id), Some(name), Some(geo_type)) = (&geo_ids[i], &names[i], &geo_types[i]) else { continue };
            if !geo_type.eq_ignore_ascii_case(region_type) { continue }
            if let Some(measure) = &query.measure {
                let row_measure = measures.as_ref().and_then(|m| m[i].as_deref());
                if row_measure != Some(measure.as_str()) { continue }
            }
            if let Some(wanted) = &query.names {
                if !wanted.contains(name) { continue }
            }
            out.push(IndicatorRecord {
                region_id: RegionId::new(geo_id),
                indicator: name.clone(),
                year: query.year,
                value,
            });
        }
        Ok(out)
    }
}

/// Immutable wide view of indicator values for one period: indicator → region → value.
#[derive(Debug, Clone, Default)]
pub struct IndicatorRelation {
    year: u16,
    values: AHashMap<String, AHashMap<RegionId, f64>>,
    /// Indicators dropped for a repeated region, with the first such region.
    conflicts: AHashMap<String, RegionId>,
}

impl IndicatorRelation {
    /// Pivot records into a relation. Records from other years are ignored.
    ///
    /// An indicator with two values for one region is dropped and kept as a
    /// conflict, so only that indicator fails later.
    pub fn from_records(year: u16, records: impl IntoIterator<Item = IndicatorRecord>) -> Result<Self> {
        let mut values: AHashMap<String, AHashMap<RegionId, f64>> = AHashMap::new();
        let mut conflicts = AHashMap::new();
        for record in records.into_iter().filter(|r| r.year == year) {
            if conflicts.contains_key(&record.indicator) { continue }
            let regions = values.entry(record.indicator.clone()).or_default();
            if regions.insert(record.region_id.clone(), record.value).is_some() {
                warn!("duplicate value for {} in region {}, dropping the indicator", record.indicator, record.region_id);
                values.remove(&record.indicator);
                conflicts.insert(record.indicator, record.region_id);
            }
        }
        Ok(Self { year, values, conflicts })
    }

    /// Query a source and pivot the result.
    pub fn load(source: &dyn IndicatorSource, query: &IndicatorQuery) -> Result<Self> {
        let relation = Self::from_records(query.year, source.records(query)?)?;
        info!("loaded {} indicators for {} {}s", relation.values.len(), query.year, query.region_type);
        Ok(relation)
    }

    /// Union of two relations for the same period.
    pub fn merge(mut self, other: IndicatorRelation) -> Result<Self> {
        if self.year != other.year {
            bail!("[indicator::relation] cannot merge {} and {} relations", self.year, other.year);
        }
        let names = other.values.keys().chain(other.conflicts.keys());
        for name in names {
            if self.values.contains_key(name) || self.conflicts.contains_key(name) {
                bail!("[indicator::relation] indicator {name} present in both relations");
            }
        }
        self.values.extend(other.values);
        self.conflicts.extend(other.conflicts);
        Ok(self)
    }

    #[inline] pub fn year(&self) -> u16 { self.year }

    #[inline] pub fn contains(&self, indicator: &str) -> bool { self.values.contains_key(indicator) }

    /// First region with conflicting values, if `indicator` was dropped for one.
    #[inline]
    pub fn conflict(&self, indicator: &str) -> Option<&RegionId> {
        self.conflicts.get(indicator)
    }

    /// Region values of one indicator.
    #[inline]
    pub fn get(&self, indicator: &str) -> Option<&AHashMap<RegionId, f64>> {
        self.values.get(indicator)
    }

    #[inline]
    pub fn value(&self, indicator: &str, region: &RegionId) -> Option<f64> {
        self.values.get(indicator)?.get(region).copied()
    }

    /// Indicator names, sorted.
    pub fn indicators(&self) -> Vec<&str> {
        let mut names = self.values.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}
