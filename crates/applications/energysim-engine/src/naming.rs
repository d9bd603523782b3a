//! Artifact naming scheme
//!
//! Input definitions and weather files encode their climate scenario and year
//! in the file name:
//!
//! ```text
//! RCP4.5_E12_2031.idf            (scenario, aging label, year)
//! Rotterdam_RCP45_2031.epw       (scenario without dot, year)
//! ```
//!
//! Matching is case-insensitive; parsed parts are returned upper-cased.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Earliest year accepted in a file name
pub const NAME_YEAR_MIN: i32 = 2020;

/// Latest year accepted in a file name
pub const NAME_YEAR_MAX: i32 = 2084;

const EPW_CITY: &str = "ROTTERDAM";

/// Representative concentration pathway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scenario {
    /// RCP 8.5
    Rcp85,
    /// RCP 4.5
    Rcp45,
    /// RCP 2.6
    Rcp26,
}

impl Scenario {
    const ALL: [Scenario; 3] = [Scenario::Rcp85, Scenario::Rcp45, Scenario::Rcp26];

    /// Name as used in IDF files (`RCP8.5`)
    pub fn dotted(&self) -> &'static str {
        match self {
            Self::Rcp85 => "RCP8.5",
            Self::Rcp45 => "RCP4.5",
            Self::Rcp26 => "RCP2.6",
        }
    }

    /// Name as used in EPW files and workbook headers (`RCP85`)
    pub fn undotted(&self) -> &'static str {
        match self {
            Self::Rcp85 => "RCP85",
            Self::Rcp45 => "RCP45",
            Self::Rcp26 => "RCP26",
        }
    }

    /// Parse the dotted form (case-insensitive)
    pub fn from_dotted(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.dotted().eq_ignore_ascii_case(s))
    }

    /// Parse the undotted form (case-insensitive)
    pub fn from_undotted(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.undotted().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.undotted())
    }
}

/// Map a dotted scenario string to its undotted form (`RCP8.5` -> `RCP85`)
pub fn map_rcp_dot_to_nodot(rcp: &str) -> String {
    rcp.to_ascii_uppercase()
        .replace(' ', "")
        .replace("8.5", "85")
        .replace("4.5", "45")
        .replace("2.6", "26")
}

/// Parsed input definition file name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdfName {
    /// Climate scenario
    pub scenario: Scenario,
    /// Building aging label (`E0`..`E29`, `F..`, `T..`)
    pub aging: String,
    /// Simulation year
    pub year: i32,
}

impl IdfName {
    /// Parse an IDF file name (not a full key)
    pub fn parse(name: &str) -> Result<Self> {
        parse_idf(name).ok_or_else(|| EngineError::InvalidName(name.to_string()))
    }
}

fn parse_idf(name: &str) -> Option<IdfName> {
    let stem = strip_suffix_ignore_case(name, ".idf")?;
    let mut parts = stem.split('_');
    let (rcp, aging, year) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let scenario = Scenario::from_dotted(rcp)?;
    if !is_aging_label(aging) {
        return None;
    }
    let year = parse_year(year)?;

    Some(IdfName {
        scenario,
        aging: aging.to_ascii_uppercase(),
        year,
    })
}

/// Parsed weather file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpwName {
    /// Climate scenario
    pub scenario: Scenario,
    /// Weather year
    pub year: i32,
}

impl EpwName {
    /// Parse an EPW file name; returns `None` for files outside the scheme
    pub fn parse(name: &str) -> Option<Self> {
        let stem = strip_suffix_ignore_case(name, ".epw")?;
        let mut parts = stem.split('_');
        let (city, rcp, year) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || !city.eq_ignore_ascii_case(EPW_CITY) {
            return None;
        }

        Some(EpwName {
            scenario: Scenario::from_undotted(rcp)?,
            year: parse_year(year)?,
        })
    }
}

/// Last `/`-separated segment of an object key
pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    if name.len() < suffix.len() || !name.is_char_boundary(name.len() - suffix.len()) {
        return None;
    }
    let (stem, tail) = name.split_at(name.len() - suffix.len());
    tail.eq_ignore_ascii_case(suffix).then_some(stem)
}

/// Letter E/F/T followed by 0-9 or a two-digit number starting with 1 or 2
fn is_aging_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    let Some((letter, digits)) = bytes.split_first() else {
        return false;
    };
    if !matches!(letter.to_ascii_uppercase(), b'E' | b'F' | b'T') {
        return false;
    }
    match digits {
        [d] => d.is_ascii_digit(),
        [first, second] => matches!(first, b'1' | b'2') && second.is_ascii_digit(),
        _ => false,
    }
}

fn parse_year(s: &str) -> Option<i32> {
    if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = s.parse().ok()?;
    (NAME_YEAR_MIN..=NAME_YEAR_MAX).contains(&year).then_some(year)
}
