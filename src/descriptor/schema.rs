//! Column layout of the job-description file.
//!
//! Column names match the SEBAL spreadsheet input template so existing job
//! files load unchanged.

use crate::error::BatchError;
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

pub const DATE_ACQUIRED: &str = "Date_Acquired";
pub const IMAGE_NAME: &str = "Name_Landsat_Image";
pub const INPUT_FOLDER: &str = "input_folder";
pub const OUTPUT_FOLDER: &str = "output_folder";
pub const IMAGE_TYPE: &str = "Image_Type";
pub const DEM_FILE: &str = "DEM_fileName";

pub const SATELLITE_NR: &str = "Landsat_nr";
pub const THERMAL_BANDS: &str = "Thermal_Bands";
pub const TCOLD_MIN: &str = "tcoldmin";
pub const TCOLD_MAX: &str = "tcoldmax";
pub const NDVI_HOT_LOW: &str = "ndvihot_low";
pub const NDVI_HOT_HIGH: &str = "ndvihot_high";
pub const NDVI_COLD_LOW: &str = "ndvicold_low";
pub const NDVI_COLD_HIGH: &str = "ndvicold_high";
pub const HOT_PIXEL_CONSTANT: &str = "Hot_Pixel_Constant";
pub const COLD_PIXEL_CONSTANT: &str = "Cold_Pixel_Constant";

pub const TEMP_INST: &str = "Temp_inst";
pub const TEMP_24: &str = "Temp_24";
pub const RH_INST: &str = "RH_inst";
pub const RH_24: &str = "RH_24";
pub const WIND_INST: &str = "Wind_inst";
pub const WIND_24: &str = "Wind_24";
pub const WIND_HEIGHT: &str = "zx";

pub const METHOD_RADIATION_24: &str = "Method_Radiation_24";
pub const RS_24: &str = "Rs_24";
pub const TRANSM_24: &str = "Transm_24";
pub const METHOD_RADIATION_INST: &str = "Method_Radiation_inst";
pub const RS_INST: &str = "Rs_in_inst";
pub const TRANSM_INST: &str = "Transm_inst";

pub const THETA_SAT_TOP: &str = "Theta_sat_top";
pub const THETA_SAT_SUB: &str = "Theta_sat_sub";
pub const THETA_RES_TOP: &str = "Theta_res_top";
pub const THETA_RES_SUB: &str = "Theta_res_sub";
pub const FIELD_CAPACITY: &str = "Field_Cap";
pub const WILTING_POINT: &str = "Wilting_Point";
pub const LUE_MAX: &str = "LUEmax";
pub const OBSTACLE_HEIGHT: &str = "h_obst";
pub const DEPLETION_FACTOR: &str = "depl_factor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Column must exist in the header. Cells may still be conditionally
    /// optional (radiation values not selected by their method).
    Required,
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Date,
    Text,
    Path,
    Integer,
    Float,
    /// Constant or map raster.
    Measured,
    /// Radiation method selector, 1 or 2.
    Selector,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub requirement: Requirement,
    pub kind: ColumnKind,
}

const fn required(name: &'static str, kind: ColumnKind) -> Column {
    Column {
        name,
        requirement: Requirement::Required,
        kind,
    }
}

const fn optional(name: &'static str, kind: ColumnKind) -> Column {
    Column {
        name,
        requirement: Requirement::Optional,
        kind,
    }
}

pub const COLUMNS: &[Column] = &[
    required(DATE_ACQUIRED, ColumnKind::Date),
    required(IMAGE_NAME, ColumnKind::Text),
    required(INPUT_FOLDER, ColumnKind::Path),
    required(OUTPUT_FOLDER, ColumnKind::Path),
    required(IMAGE_TYPE, ColumnKind::Integer),
    required(DEM_FILE, ColumnKind::Path),
    required(SATELLITE_NR, ColumnKind::Integer),
    required(THERMAL_BANDS, ColumnKind::Integer),
    required(TCOLD_MIN, ColumnKind::Float),
    required(TCOLD_MAX, ColumnKind::Float),
    required(NDVI_HOT_LOW, ColumnKind::Float),
    required(NDVI_HOT_HIGH, ColumnKind::Float),
    required(NDVI_COLD_LOW, ColumnKind::Float),
    required(NDVI_COLD_HIGH, ColumnKind::Float),
    required(HOT_PIXEL_CONSTANT, ColumnKind::Float),
    required(COLD_PIXEL_CONSTANT, ColumnKind::Float),
    required(TEMP_INST, ColumnKind::Measured),
    required(TEMP_24, ColumnKind::Measured),
    required(RH_INST, ColumnKind::Measured),
    required(RH_24, ColumnKind::Measured),
    required(WIND_INST, ColumnKind::Measured),
    required(WIND_24, ColumnKind::Measured),
    required(WIND_HEIGHT, ColumnKind::Float),
    required(METHOD_RADIATION_24, ColumnKind::Selector),
    required(RS_24, ColumnKind::Measured),
    required(TRANSM_24, ColumnKind::Measured),
    required(METHOD_RADIATION_INST, ColumnKind::Selector),
    required(RS_INST, ColumnKind::Measured),
    required(TRANSM_INST, ColumnKind::Measured),
    optional(THETA_SAT_TOP, ColumnKind::Float),
    optional(THETA_SAT_SUB, ColumnKind::Float),
    optional(THETA_RES_TOP, ColumnKind::Float),
    optional(THETA_RES_SUB, ColumnKind::Float),
    optional(FIELD_CAPACITY, ColumnKind::Float),
    optional(WILTING_POINT, ColumnKind::Float),
    optional(LUE_MAX, ColumnKind::Float),
    optional(OBSTACLE_HEIGHT, ColumnKind::Float),
    optional(DEPLETION_FACTOR, ColumnKind::Float),
];

pub fn required_columns() -> impl Iterator<Item = &'static str> {
    COLUMNS
        .iter()
        .filter(|c| c.requirement == Requirement::Required)
        .map(|c| c.name)
}

/// Strips a byte-order mark and stray whitespace that spreadsheet exports
/// tend to leave on header cells.
pub fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .nfkc()
        .collect::<String>()
        .trim()
        .to_string()
}

/// Header name to field position, for every column the schema knows about.
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    positions: HashMap<&'static str, usize>,
}

impl HeaderIndex {
    /// Checks the header once, before any row is read. Every missing
    /// required column is reported, in schema order.
    pub fn from_headers(headers: &csv::StringRecord) -> Result<Self, BatchError> {
        let names: Vec<String> = headers.iter().map(normalize_header).collect();

        let mut positions = HashMap::new();
        for col in COLUMNS {
            if let Some(pos) = names.iter().position(|n| n == col.name) {
                positions.insert(col.name, pos);
            }
        }

        let missing: Vec<String> = required_columns()
            .filter(|name| !positions.contains_key(name))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(BatchError::Schema { missing });
        }

        Ok(Self { positions })
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }
}
