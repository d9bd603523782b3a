//! Result metric extraction
//!
//! Reads the "Site and Source Energy" table of the Annual Building Utility
//! Performance Summary (ABUPS) from an EnergyPlus output directory. Sources are
//! tried in order:
//!
//! 1. `eplusout.sql` — `TabularDataWithStrings`
//! 2. `eplustbl.tab` — tab-delimited tabular report
//! 3. `eplustbl.csv` — comma-delimited tabular report
//!
//! The first source yielding at least one value wins.

use crate::error::Result;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Where the metrics were found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsSource {
    /// SQLite output
    Sql,
    /// Tab-delimited tabular report
    Tab,
    /// Comma-delimited tabular report
    Csv,
    /// Nothing found
    None,
}

/// Site energy metrics of one simulation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiteEnergy {
    /// Total site energy (GJ)
    pub total_site: Option<f64>,
    /// Site energy per total building area (MJ/m2)
    pub per_area: Option<f64>,
    /// Source the values were read from
    pub source: MetricsSource,
}

impl SiteEnergy {
    fn none() -> Self {
        Self {
            total_site: None,
            per_area: None,
            source: MetricsSource::None,
        }
    }

    /// Whether at least one value is present
    pub fn has_any(&self) -> bool {
        self.total_site.is_some() || self.per_area.is_some()
    }
}

const SQL_TOTAL: &str = "SELECT Value FROM TabularDataWithStrings \
     WHERE lower(TableName) LIKE 'site and source energy%' \
       AND lower(RowName) = 'total site energy' \
       AND lower(ColumnName) LIKE 'total energy%'";

const SQL_PER_AREA: &str = "SELECT Value FROM TabularDataWithStrings \
     WHERE lower(TableName) LIKE 'site and source energy%' \
       AND lower(RowName) = 'total site energy' \
       AND lower(ColumnName) LIKE 'energy per total building area%'";

const ABUPS_MARKER: &str = "annual building utility performance summary";
const TABLE_MARKER: &str = "site and source energy";
const TOTAL_COLUMN: &str = "total energy";
const PER_AREA_COLUMN: &str = "energy per total building area";
const TOTAL_ROW: &str = "total site energy";

/// Lines after the ABUPS marker searched for the table title
const TABLE_SEARCH_WINDOW: usize = 40;

/// Lines after the table title searched for the header row
const HEADER_SEARCH_WINDOW: usize = 15;

/// Parse a report number, tolerating thousands separators and padding
pub fn safe_float(s: &str) -> Option<f64> {
    s.replace(',', "").trim().parse().ok()
}

/// Extract metrics from an EnergyPlus output directory
pub fn extract_metrics(outdir: &Path) -> SiteEnergy {
    let sql_path = outdir.join("eplusout.sql");
    if sql_path.exists() {
        match fetch_from_sql(&sql_path) {
            Ok((total_site, per_area)) if total_site.is_some() || per_area.is_some() => {
                return SiteEnergy {
                    total_site,
                    per_area,
                    source: MetricsSource::Sql,
                };
            }
            Ok(_) => debug!("No ABUPS values in {}", sql_path.display()),
            Err(e) => warn!("Failed to read {}: {}", sql_path.display(), e),
        }
    }

    for (file, delimiter, source) in [
        ("eplustbl.tab", b'\t', MetricsSource::Tab),
        ("eplustbl.csv", b',', MetricsSource::Csv),
    ] {
        let path = outdir.join(file);
        if !path.exists() {
            continue;
        }
        match fetch_from_tabular_text(&path, delimiter) {
            Ok((total_site, per_area)) if total_site.is_some() || per_area.is_some() => {
                return SiteEnergy {
                    total_site,
                    per_area,
                    source,
                };
            }
            Ok(_) => debug!("No ABUPS values in {}", path.display()),
            Err(e) => warn!("Failed to read {}: {}", path.display(), e),
        }
    }

    SiteEnergy::none()
}

/// Read both values from `eplusout.sql`
pub fn fetch_from_sql(sql_path: &Path) -> Result<(Option<f64>, Option<f64>)> {
    let conn = Connection::open_with_flags(sql_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let query = |sql: &str| -> Result<Option<f64>> {
        let value: Option<String> = conn
            .query_row(sql, [], |row| row.get::<_, String>(0))
            .optional()?;
        Ok(value.as_deref().and_then(safe_float))
    };

    Ok((query(SQL_TOTAL)?, query(SQL_PER_AREA)?))
}

/// Read both values from a delimited tabular report
pub fn fetch_from_tabular_text(path: &Path, delimiter: u8) -> Result<(Option<f64>, Option<f64>)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    // Reports may carry non-UTF-8 unit glyphs; decode lossily.
    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| String::from_utf8_lossy(field).trim().to_string())
                .collect(),
        );
    }

    Ok(find_site_energy(&rows).unwrap_or((None, None)))
}

fn contains_ci(row: &[String], needle: &str) -> bool {
    row.iter().any(|c| c.to_lowercase().contains(needle))
}

fn find_site_energy(rows: &[Vec<String>]) -> Option<(Option<f64>, Option<f64>)> {
    for (i, row) in rows.iter().enumerate() {
        if !contains_ci(row, ABUPS_MARKER) {
            continue;
        }
        for j in (i + 1)..rows.len().min(i + TABLE_SEARCH_WINDOW) {
            if !contains_ci(&rows[j], TABLE_MARKER) {
                continue;
            }
            let header_idx = ((j + 1)..rows.len().min(j + HEADER_SEARCH_WINDOW)).find(|&k| {
                contains_ci(&rows[k], TOTAL_COLUMN) && contains_ci(&rows[k], PER_AREA_COLUMN)
            });
            let Some(header_idx) = header_idx else {
                continue;
            };

            let header: Vec<String> = rows[header_idx].iter().map(|h| h.to_lowercase()).collect();
            let col_total = header.iter().position(|c| c.contains(TOTAL_COLUMN));
            let col_per_area = header.iter().position(|c| c.contains(PER_AREA_COLUMN));
            let (Some(col_total), Some(col_per_area)) = (col_total, col_per_area) else {
                continue;
            };

            for data in &rows[header_idx + 1..] {
                if data.iter().all(|c| c.is_empty()) {
                    break;
                }
                // Reports indent row labels by one empty column.
                let label = data.iter().find(|c| !c.is_empty());
                if label.is_some_and(|l| l.to_lowercase() == TOTAL_ROW) {
                    let cell = |idx: usize| data.get(idx).and_then(|v| safe_float(v));
                    return Some((cell(col_total), cell(col_per_area)));
                }
            }
        }
    }
    None
}
