pub mod loader;
pub mod schema;

pub use loader::{load_path, load_reader};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Date;

/// One validated row of the job file. `row` is the 1-based data row number
/// (the header line is not counted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub row: usize,
    pub identity: Identity,
    pub sensor: Sensor,
    pub weather: Weather,
    pub radiation: Radiation,
    pub soil: Soil,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(with = "crate::util::iso_date")]
    pub date_acquired: Date,
    pub image_name: String,
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    pub image_type: ImageType,
    pub dem_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    Landsat,
    ProbaVViirs,
    Modis,
}

impl ImageType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(ImageType::Landsat),
            2 => Some(ImageType::ProbaVViirs),
            3 => Some(ImageType::Modis),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ImageType::Landsat => 1,
            ImageType::ProbaVViirs => 2,
            ImageType::Modis => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub satellite_nr: u8,
    pub thermal_bands: u8,
    /// Cold-pixel temperature percentiles (`tcoldmin`, `tcoldmax`).
    pub tcold: PercentileBounds,
    pub ndvi_hot: PercentileBounds,
    pub ndvi_cold: PercentileBounds,
    pub hot_pixel_constant: f64,
    pub cold_pixel_constant: f64,
}

/// A `low < high` pair of percentiles in 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileBounds {
    pub low: f64,
    pub high: f64,
}

/// A weather or radiation input: either a single value for the whole scene
/// or a raster that the engine reads per pixel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measured {
    Constant(f64),
    Map(PathBuf),
}

impl Measured {
    pub fn constant(&self) -> Option<f64> {
        match self {
            Measured::Constant(v) => Some(*v),
            Measured::Map(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub temp_inst: Measured,
    pub temp_24: Measured,
    pub rh_inst: Measured,
    pub rh_24: Measured,
    pub wind_inst: Measured,
    pub wind_24: Measured,
    /// Height (m) at which wind speed is measured.
    pub wind_height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadiationMethod {
    Direct,
    Transmissivity,
}

impl RadiationMethod {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(RadiationMethod::Direct),
            2 => Some(RadiationMethod::Transmissivity),
            _ => None,
        }
    }
}

/// Both candidate inputs are kept as read; the job builder picks one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadiationInput {
    pub method: RadiationMethod,
    pub direct: Option<Measured>,
    pub transmissivity: Option<Measured>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Radiation {
    pub daily: RadiationInput,
    pub instantaneous: RadiationInput,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Soil {
    pub theta_sat_top: Option<f64>,
    pub theta_sat_sub: Option<f64>,
    pub theta_res_top: Option<f64>,
    pub theta_res_sub: Option<f64>,
    pub field_capacity: Option<f64>,
    pub wilting_point: Option<f64>,
    pub lue_max: Option<f64>,
    pub obstacle_height: Option<f64>,
    pub depletion_factor: Option<f64>,
}
