//! Demographic table reader.
//!
//! Columns follow the census extract: `GEOID`, `total_population`,
//! `pct_black` and `pct_poverty` in percent, `median_household_income`.
//! Percentages are converted to fractions. Negative incomes are the
//! census suppression sentinel and become `None`.

use std::collections::BTreeMap;
use std::io::Read;

use serde::Deserialize;
use trauma_desert_area_models::Demographics;

use crate::{IngestError, parse_f64};

#[derive(Debug, Deserialize)]
struct DemographicRow {
    #[serde(rename = "GEOID", alias = "geoid", alias = "area_unit_id")]
    id: String,
    #[serde(default, rename = "total_population", alias = "population")]
    population: Option<String>,
    #[serde(default)]
    pct_black: Option<String>,
    #[serde(default)]
    pct_poverty: Option<String>,
    #[serde(default, rename = "median_household_income", alias = "median_income")]
    median_income: Option<String>,
}

fn percent(
    source_name: &str,
    id: &str,
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<f64>, IngestError> {
    let Some(value) = parse_f64(source_name, id, field, raw)? else {
        return Ok(None);
    };
    if !(0.0..=100.0).contains(&value) {
        return Err(IngestError::InvalidField {
            source_name: source_name.to_string(),
            record_id: id.to_string(),
            field,
            value: value.to_string(),
        });
    }
    Ok(Some(value / 100.0))
}

fn population(source_name: &str, id: &str, raw: Option<&str>) -> Result<Option<u32>, IngestError> {
    let Some(value) = parse_f64(source_name, id, "total_population", raw)? else {
        return Ok(None);
    };
    if value < 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return Err(IngestError::InvalidField {
            source_name: source_name.to_string(),
            record_id: id.to_string(),
            field: "total_population",
            value: value.to_string(),
        });
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(Some(value as u32))
}

/// Reads the demographic table keyed by area unit id.
///
/// # Errors
///
/// * [`IngestError::Csv`] for malformed CSV or a missing id column
/// * [`IngestError::InvalidField`] for unparsable numbers or percentages
///   outside `[0, 100]`
/// * [`IngestError::DuplicateId`] for a repeated id
pub fn read_demographics(
    reader: impl Read,
    source_name: &str,
) -> Result<BTreeMap<String, Demographics>, IngestError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);

    let mut demographics = BTreeMap::new();
    let mut suppressed_income = 0;

    for result in csv_reader.deserialize::<DemographicRow>() {
        let row = result.map_err(|source| IngestError::Csv {
            source_name: source_name.to_string(),
            source,
        })?;
        let id = row.id.trim().to_string();

        let income = parse_f64(
            source_name,
            &id,
            "median_household_income",
            row.median_income.as_deref(),
        )?;
        let median_income = income.filter(|&v| v >= 0.0);
        if income.is_some() && median_income.is_none() {
            suppressed_income += 1;
        }

        let record = Demographics {
            population: population(source_name, &id, row.population.as_deref())?,
            pct_black: percent(source_name, &id, "pct_black", row.pct_black.as_deref())?,
            pct_poverty: percent(source_name, &id, "pct_poverty", row.pct_poverty.as_deref())?,
            median_income,
        };

        if demographics.insert(id.clone(), record).is_some() {
            return Err(IngestError::DuplicateId {
                source_name: source_name.to_string(),
                id,
            });
        }
    }

    if suppressed_income > 0 {
        log::warn!(
            "{source_name}: {suppressed_income} suppressed median incomes treated as missing"
        );
    }
    log::info!("Read demographics for {} area units from {source_name}", demographics.len());

    Ok(demographics)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
GEOID,total_population,pct_black,pct_poverty,median_household_income
42101000100,4012,12.5,8.0,91000
42101000200,2200,96.1,41.3,-666666666
42101000300,,,,
";

    #[test]
    fn converts_percentages_and_sentinels() {
        let table = read_demographics(TABLE.as_bytes(), "demographics.csv").unwrap();
        assert_eq!(table.len(), 3);

        let first = &table["42101000100"];
        assert_eq!(first.population, Some(4012));
        assert!((first.pct_black.unwrap() - 0.125).abs() < 1e-12);
        assert!((first.pct_poverty.unwrap() - 0.08).abs() < 1e-12);
        assert_eq!(first.median_income, Some(91_000.0));

        assert_eq!(table["42101000200"].median_income, None);
        assert_eq!(table["42101000300"], Demographics::default());
    }

    #[test]
    fn accepts_alternate_headers() {
        let table = read_demographics(
            "area_unit_id,population,pct_black,pct_poverty,median_income\nA,10,50,20,30000\n"
                .as_bytes(),
            "alt.csv",
        )
        .unwrap();
        assert_eq!(table["A"].population, Some(10));
    }

    #[test]
    fn rejects_out_of_range_percent() {
        let result = read_demographics(
            "GEOID,pct_black\nA,140\n".as_bytes(),
            "bad.csv",
        );
        assert!(matches!(
            result,
            Err(IngestError::InvalidField { field: "pct_black", .. })
        ));
    }

    #[test]
    fn rejects_duplicates_and_garbage() {
        assert!(matches!(
            read_demographics("GEOID,pct_black\nA,10\nA,20\n".as_bytes(), "dup.csv"),
            Err(IngestError::DuplicateId { .. })
        ));
        assert!(matches!(
            read_demographics("GEOID,total_population\nA,lots\n".as_bytes(), "bad.csv"),
            Err(IngestError::InvalidField { .. })
        ));
    }
}
