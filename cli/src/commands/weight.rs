use std::{fs, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use popgrid::{
    io::{coarse_grid_to_frame, population_from_frame, read_table, write_table},
    weight_indicators, IndicatorCatalog, IndicatorQuery, IndicatorRelation, IndicatorSource,
    IndicatorTable, RATE_INDICATORS,
};
use tracing::info;

/// Fill `{}` placeholders with the indicator name, then the year.
pub(crate) fn output_path(template: &str, name: &str, year: u16) -> PathBuf {
    let mut values = [name.to_string(), year.to_string()].into_iter();
    let mut out = String::with_capacity(template.len() + name.len());
    let mut rest = template;
    while let Some(idx) = rest.find("{}") {
        out.push_str(&rest[..idx]);
        out.push_str(&values.next().unwrap_or_default());
        rest = &rest[idx + 2..];
    }
    out.push_str(rest);
    PathBuf::from(out)
}

/// Completion marker written once an output is fully on disk.
pub(crate) fn done_marker(path: &Path) -> PathBuf {
    let mut marker = path.as_os_str().to_owned();
    marker.push(".done");
    PathBuf::from(marker)
}

/// Count rows measured in `count_measure`, plus the rate indicators whatever their measure.
pub(crate) fn load_relation(source: &dyn IndicatorSource, query: IndicatorQuery, count_measure: &str)
    -> Result<IndicatorRelation>
{
    let counts = source.records(&query.clone().measure(count_measure))?.into_iter()
        .filter(|r| !RATE_INDICATORS.contains(&r.indicator.as_str()));
    let counts = IndicatorRelation::from_records(query.year, counts)?;
    let rates = IndicatorRelation::load(source, &query.names(&RATE_INDICATORS))?;
    counts.merge(rates)
}

pub fn run(cli: &crate::cli::Cli, args: &crate::cli::WeightArgs) -> Result<()> {
    let mut config = super::load_config(cli)?;
    if let Some(factor) = args.factor { config.coarsen.factor = factor }
    config.validate()?;

    info!("[weight] loading indicators from {}", args.indicators.display());
    let source = IndicatorTable::new(read_table(&args.indicators)?, read_table(&args.units)?)?;

    let units = source.units()?;
    let mut catalog = IndicatorCatalog::from_units(units.iter().map(|(n, u)| (n.as_str(), u.as_str())));
    if let Some(only) = &args.only { catalog.retain_names(only) }

    let relation = load_relation(&source, IndicatorQuery::new(args.year, config.region_type), &args.count_measure)?;

    info!("[weight] loading population table from {}", args.population.display());
    let table = population_from_frame(&read_table(&args.population)?, &args.population_column, &args.region_column)?;

    let report = weight_indicators(
        &table, &relation, &catalog, &config,
        |spec| {
            let path = output_path(&args.save, &spec.name, args.year);
            path.exists() && done_marker(&path).exists()
        },
        |grid| {
            let path = output_path(&args.save, grid.name(), grid.year());
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("[weight] failed to create {}", parent.display()))?;
            }
            info!("[weight] writing {}", path.display());
            write_table(&mut coarse_grid_to_frame(&grid)?, &path)?;
            fs::write(done_marker(&path), b"")
                .with_context(|| format!("[weight] failed to mark {} complete", path.display()))
        },
    )?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_takes_name_then_year() {
        assert_eq!(output_path("out/{}_{}.csv", "E_POV", 2018), PathBuf::from("out/E_POV_2018.csv"));
        assert_eq!(output_path("out/{}.parquet", "PCI", 2018), PathBuf::from("out/PCI.parquet"));
        assert_eq!(output_path("fixed.csv", "PCI", 2018), PathBuf::from("fixed.csv"));
    }

    #[test]
    fn mixed_measure_store_loads_counts_and_rates() {
        let dir = tempfile::tempdir().unwrap();
        let values = dir.path().join("values.csv");
        let units = dir.path().join("units.csv");
        fs::write(&values, "\
GEOID,DEMOGRAPHICS_NAME,YEAR,GEOTYPE,UNITS,VALUE
48001950100,E_POV,2018,tract,count,100
48001950100,E_POV,2018,tract,percent,12.5
48001950100,TOTPOP,2018,tract,count,800
48001950100,PCI,2018,tract,dollars,31000
").unwrap();
        fs::write(&units, "NAME,UNITS\nE_POV,persons\nTOTPOP,persons\nPCI,dollars\n").unwrap();

        let source = IndicatorTable::new(read_table(&values).unwrap(), read_table(&units).unwrap()).unwrap();
        let query = IndicatorQuery::new(2018, popgrid::GeoType::Tract);
        let relation = load_relation(&source, query, "count").unwrap();

        assert_eq!(relation.indicators(), vec!["E_POV", "PCI", "TOTPOP"]);
        let region = popgrid::RegionId::new("48001950100");
        assert_eq!(relation.value("E_POV", &region), Some(100.0));
        assert_eq!(relation.value("PCI", &region), Some(31000.0));
    }

    #[test]
    fn marker_sits_next_to_output() {
        assert_eq!(done_marker(Path::new("out/E_POV_2018.csv")), PathBuf::from("out/E_POV_2018.csv.done"));
    }
}
