//! Incident table reader.
//!
//! Accepts the police shooting extract (`objectid`, `date_`, `lat`,
//! `lng`, `fatal`, `race`, `sex`, `age`) or the equivalent plain names.
//! Coordinates and dates that cannot be parsed become `None`, which marks
//! the incident invalid instead of failing the read.

use std::collections::BTreeSet;
use std::io::Read;

use chrono::NaiveDate;
use serde::Deserialize;
use trauma_desert_area_models::{IncidentRecord, Race, VictimAttributes};

use crate::IngestError;

#[derive(Debug, Deserialize)]
struct IncidentRow {
    #[serde(alias = "objectid", alias = "OBJECTID")]
    id: String,
    #[serde(default, alias = "date_", alias = "occurred_on")]
    date: Option<String>,
    #[serde(default, alias = "latitude")]
    lat: Option<String>,
    #[serde(default, alias = "lon", alias = "longitude")]
    lng: Option<String>,
    #[serde(default, alias = "is_fatal")]
    fatal: Option<String>,
    #[serde(default)]
    race: Option<String>,
    #[serde(default)]
    sex: Option<String>,
    #[serde(default)]
    age: Option<String>,
}

/// Parses `YYYY-MM-DD` (optionally followed by a time) or `MM/DD/YYYY`.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.split(['T', ' ']).next().unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%m/%d/%Y"))
        .ok()
}

fn parse_coordinate(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_fatal(raw: Option<&str>) -> bool {
    raw.map(|s| s.trim().to_ascii_lowercase())
        .is_some_and(|s| matches!(s.as_str(), "1" | "1.0" | "true" | "t" | "y" | "yes"))
}

fn parse_sex(raw: Option<&str>) -> Option<bool> {
    match raw?.trim().to_ascii_uppercase().as_str() {
        "M" | "MALE" => Some(true),
        "F" | "FEMALE" => Some(false),
        _ => None,
    }
}

fn parse_age(raw: Option<&str>) -> Option<u8> {
    let age = raw?.trim().parse::<f64>().ok()?;
    if (0.0..=120.0).contains(&age) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some(age.trunc() as u8)
    } else {
        None
    }
}

/// Reads every incident row.
///
/// # Errors
///
/// * [`IngestError::Csv`] for malformed CSV or a missing id column
/// * [`IngestError::DuplicateId`] for a repeated incident id
pub fn read_incidents(
    reader: impl Read,
    source_name: &str,
) -> Result<Vec<IncidentRecord>, IngestError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);

    let mut seen = BTreeSet::new();
    let mut incidents = Vec::new();

    for result in csv_reader.deserialize::<IncidentRow>() {
        let row = result.map_err(|source| IngestError::Csv {
            source_name: source_name.to_string(),
            source,
        })?;
        let id = row.id.trim().to_string();
        if !seen.insert(id.clone()) {
            return Err(IngestError::DuplicateId {
                source_name: source_name.to_string(),
                id,
            });
        }

        incidents.push(IncidentRecord {
            id,
            occurred_on: row.date.as_deref().and_then(parse_date),
            latitude: parse_coordinate(row.lat.as_deref()),
            longitude: parse_coordinate(row.lng.as_deref()),
            is_fatal: parse_fatal(row.fatal.as_deref()),
            victim: VictimAttributes {
                race: Race::from_code(row.race.as_deref().unwrap_or_default()),
                is_male: parse_sex(row.sex.as_deref()),
                age: parse_age(row.age.as_deref()),
            },
        });
    }

    let invalid = incidents.iter().filter(|i| !i.is_valid()).count();
    if invalid > 0 {
        log::warn!("{source_name}: {invalid} incidents lack a usable location or date");
    }
    log::info!("Read {} incidents from {source_name}", incidents.len());

    Ok(incidents)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTRACT: &str = "\
objectid,date_,lat,lng,fatal,race,sex,age
1,2020-03-01 00:00:00,39.95,-75.16,1,B,M,24
2,2021-07-04T13:00:00Z,39.99,-75.13,0,w,F,
3,,39.97,-75.20,0,,,
4,2022-01-15,,-75.20,0,H,M,300
5,01/31/2023,NaN,-75.20,0,X,U,17.9
";

    #[test]
    fn normalizes_extract_rows() {
        let incidents = read_incidents(EXTRACT.as_bytes(), "shootings.csv").unwrap();
        assert_eq!(incidents.len(), 5);

        let first = &incidents[0];
        assert_eq!(first.occurred_on, NaiveDate::from_ymd_opt(2020, 3, 1));
        assert!(first.is_fatal);
        assert_eq!(first.victim.race, Race::Black);
        assert_eq!(first.victim.is_male, Some(true));
        assert_eq!(first.victim.age, Some(24));
        assert!(first.is_valid());

        let second = &incidents[1];
        assert_eq!(second.occurred_on, NaiveDate::from_ymd_opt(2021, 7, 4));
        assert_eq!(second.victim.race, Race::White);
        assert_eq!(second.victim.is_male, Some(false));
        assert_eq!(second.victim.age, None);
    }

    #[test]
    fn flags_unusable_rows_as_invalid() {
        let incidents = read_incidents(EXTRACT.as_bytes(), "shootings.csv").unwrap();

        assert!(incidents[2].occurred_on.is_none());
        assert_eq!(incidents[2].victim.race, Race::Unknown);
        assert!(!incidents[2].is_valid());

        assert!(incidents[3].latitude.is_none());
        assert_eq!(incidents[3].victim.age, None);
        assert!(!incidents[3].is_valid());

        assert_eq!(incidents[4].occurred_on, NaiveDate::from_ymd_opt(2023, 1, 31));
        assert!(incidents[4].latitude.is_none());
        assert_eq!(incidents[4].victim.race, Race::Other);
        assert_eq!(incidents[4].victim.age, Some(17));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let result = read_incidents("id,lat,lng\n1,0,0\n1,0,0\n".as_bytes(), "dup.csv");
        assert!(matches!(result, Err(IngestError::DuplicateId { .. })));
    }
}
