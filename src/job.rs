//! Descriptor to engine configuration mapping.

use crate::descriptor::{
    schema, ImageType, JobDescriptor, Measured, RadiationInput, RadiationMethod, Sensor, Soil,
    Weather,
};
use crate::error::{BatchError, FieldIssue};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Date;

/// Everything the engine needs for one run, with conditional inputs already
/// resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub row: usize,
    pub general: General,
    pub sensor: Sensor,
    pub meteo: Weather,
    pub radiation: ResolvedRadiation,
    /// Absent values are left to the engine's own defaults.
    pub soil: Soil,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct General {
    #[serde(with = "crate::util::iso_date")]
    pub date_acquired: Date,
    pub day_of_year: u16,
    pub image_name: String,
    pub image_type: ImageType,
    pub image_type_code: u8,
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    pub dem_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRadiation {
    pub daily: ActiveRadiation,
    pub instantaneous: ActiveRadiation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "value", rename_all = "snake_case")]
pub enum ActiveRadiation {
    /// Surface solar radiation (W/m2).
    Direct(Measured),
    /// Atmospheric transmissivity, 0..1.
    Transmissivity(Measured),
}

impl EngineConfig {
    pub fn date_acquired(&self) -> Date {
        self.general.date_acquired
    }

    pub fn image_name(&self) -> &str {
        &self.general.image_name
    }

    pub fn output_folder(&self) -> &std::path::Path {
        &self.general.output_folder
    }
}

/// Maps one descriptor to its engine configuration. Deterministic and free
/// of I/O; path checks happen when the engine is invoked.
pub fn build(d: &JobDescriptor) -> Result<EngineConfig, BatchError> {
    let mut issues = Vec::new();
    let daily = resolve(
        &d.radiation.daily,
        schema::RS_24,
        schema::TRANSM_24,
        &mut issues,
    );
    let instantaneous = resolve(
        &d.radiation.instantaneous,
        schema::RS_INST,
        schema::TRANSM_INST,
        &mut issues,
    );
    let (Some(daily), Some(instantaneous)) = (daily, instantaneous) else {
        return Err(BatchError::Validation { row: d.row, issues });
    };

    let id = &d.identity;
    Ok(EngineConfig {
        row: d.row,
        general: General {
            date_acquired: id.date_acquired,
            day_of_year: id.date_acquired.ordinal(),
            image_name: id.image_name.clone(),
            image_type: id.image_type,
            image_type_code: id.image_type.code(),
            input_folder: id.input_folder.clone(),
            output_folder: id.output_folder.clone(),
            dem_path: id.dem_path.clone(),
        },
        sensor: d.sensor.clone(),
        meteo: d.weather.clone(),
        radiation: ResolvedRadiation {
            daily,
            instantaneous,
        },
        soil: d.soil.clone(),
    })
}

fn resolve(
    input: &RadiationInput,
    direct_col: &'static str,
    transm_col: &'static str,
    issues: &mut Vec<FieldIssue>,
) -> Option<ActiveRadiation> {
    let (picked, column) = match input.method {
        RadiationMethod::Direct => (input.direct.clone().map(ActiveRadiation::Direct), direct_col),
        RadiationMethod::Transmissivity => (
            input
                .transmissivity
                .clone()
                .map(ActiveRadiation::Transmissivity),
            transm_col,
        ),
    };
    if picked.is_none() {
        issues.push(FieldIssue {
            column,
            message: "no value for the selected radiation method".into(),
        });
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Identity, PercentileBounds, Radiation};
    use time::Month;

    fn descriptor(daily: RadiationInput, inst: RadiationInput) -> JobDescriptor {
        JobDescriptor {
            row: 2,
            identity: Identity {
                date_acquired: Date::from_calendar_date(2025, Month::February, 14).unwrap(),
                image_name: "LC08_L1TP_170060_20250214".into(),
                input_folder: "/data/in".into(),
                output_folder: "/data/out/2025-02-14".into(),
                image_type: ImageType::Landsat,
                dem_path: "/data/dem.tif".into(),
            },
            sensor: Sensor {
                satellite_nr: 8,
                thermal_bands: 2,
                tcold: PercentileBounds { low: 5.0, high: 10.0 },
                ndvi_hot: PercentileBounds { low: 2.0, high: 8.0 },
                ndvi_cold: PercentileBounds { low: 75.0, high: 95.0 },
                hot_pixel_constant: 0.0,
                cold_pixel_constant: 0.0,
            },
            weather: Weather {
                temp_inst: Measured::Constant(27.0),
                temp_24: Measured::Constant(24.0),
                rh_inst: Measured::Constant(60.0),
                rh_24: Measured::Constant(55.0),
                wind_inst: Measured::Constant(2.0),
                wind_24: Measured::Constant(2.5),
                wind_height: 2.0,
            },
            radiation: Radiation {
                daily,
                instantaneous: inst,
            },
            soil: Soil::default(),
        }
    }

    fn input(method: RadiationMethod, direct: Option<f64>, transm: Option<f64>) -> RadiationInput {
        RadiationInput {
            method,
            direct: direct.map(Measured::Constant),
            transmissivity: transm.map(Measured::Constant),
        }
    }

    #[test]
    fn picks_value_matching_each_method() {
        let d = descriptor(
            input(RadiationMethod::Direct, Some(210.0), Some(0.7)),
            input(RadiationMethod::Transmissivity, Some(640.0), Some(0.8)),
        );
        let cfg = build(&d).unwrap();
        assert_eq!(
            cfg.radiation.daily,
            ActiveRadiation::Direct(Measured::Constant(210.0))
        );
        assert_eq!(
            cfg.radiation.instantaneous,
            ActiveRadiation::Transmissivity(Measured::Constant(0.8))
        );
    }

    #[test]
    fn derives_day_of_year() {
        let d = descriptor(
            input(RadiationMethod::Direct, Some(210.0), None),
            input(RadiationMethod::Direct, Some(640.0), None),
        );
        let cfg = build(&d).unwrap();
        assert_eq!(cfg.general.day_of_year, 45);
        assert_eq!(cfg.general.image_type_code, 1);
        assert_eq!(cfg.soil, Soil::default());
    }

    #[test]
    fn same_descriptor_same_config() {
        let d = descriptor(
            input(RadiationMethod::Transmissivity, None, Some(0.75)),
            input(RadiationMethod::Direct, Some(600.0), None),
        );
        assert_eq!(build(&d).unwrap(), build(&d).unwrap());
    }

    #[test]
    fn missing_selected_value_is_rejected() {
        let d = descriptor(
            input(RadiationMethod::Transmissivity, Some(200.0), None),
            input(RadiationMethod::Direct, Some(600.0), None),
        );
        let err = build(&d).unwrap_err();
        match err {
            BatchError::Validation { row, issues } => {
                assert_eq!(row, 2);
                assert_eq!(issues[0].column, "Transm_24");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wire_format_tags_radiation_method() {
        let d = descriptor(
            input(RadiationMethod::Direct, Some(210.0), None),
            input(RadiationMethod::Transmissivity, None, Some(0.8)),
        );
        let json = serde_json::to_value(build(&d).unwrap()).unwrap();
        assert_eq!(json["general"]["date_acquired"], "2025-02-14");
        assert_eq!(json["radiation"]["daily"]["method"], "direct");
        assert_eq!(json["radiation"]["instantaneous"]["value"]["constant"], 0.8);
    }
}
