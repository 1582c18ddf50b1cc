use super::schema::{self, ColumnKind, HeaderIndex, COLUMNS};
use super::{
    Identity, ImageType, JobDescriptor, Measured, PercentileBounds, Radiation, RadiationInput,
    RadiationMethod, Sensor, Soil, Weather,
};
use crate::config::Validation;
use crate::error::{BatchError, FieldIssue};
use std::collections::HashMap;
use std::io::Read;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::Date;
use tracing::{debug, info, warn};

const PERCENT: RangeInclusive<f64> = 0.0..=100.0;
const FRACTION: RangeInclusive<f64> = 0.0..=1.0;

pub fn load_path(path: &Path, rules: &Validation) -> Result<Vec<JobDescriptor>, BatchError> {
    let file = std::fs::File::open(path).map_err(|source| BatchError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let descriptors = load_reader(file, rules)?;
    info!(
        "loaded {} job descriptors from {}",
        descriptors.len(),
        path.display()
    );
    Ok(descriptors)
}

/// Parses a job file. The header is checked against the schema first; rows
/// are then converted in file order, and loading stops at the first row with
/// invalid values, reporting every bad field of that row.
pub fn load_reader<R: Read>(
    reader: R,
    rules: &Validation,
) -> Result<Vec<JobDescriptor>, BatchError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let index = HeaderIndex::from_headers(rdr.headers()?)?;

    let mut out = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let descriptor = RowCells::parse(row, &record, &index).into_descriptor()?;
        warn_implausible(&descriptor, rules);
        debug!(
            row,
            date = %descriptor.identity.date_acquired,
            image = %descriptor.identity.image_name,
            "descriptor ok"
        );
        out.push(descriptor);
    }
    Ok(out)
}

pub fn parse_date(raw: &str) -> Option<Date> {
    let dashed = format_description!("[year]-[month]-[day]");
    let slashed = format_description!("[year]/[month]/[day]");
    Date::parse(raw, dashed)
        .or_else(|_| Date::parse(raw, slashed))
        .ok()
}

#[derive(Debug, Clone)]
enum Value {
    Date(Date),
    Text(String),
    Int(i64),
    Float(f64),
    Measured(Measured),
}

/// Cells of one record coerced by their declared column kind. Accessors
/// return a placeholder when a value is missing or of the wrong type and
/// record an issue instead; a row with any issue never becomes a descriptor.
struct RowCells {
    row: usize,
    values: HashMap<&'static str, Value>,
    issues: Vec<FieldIssue>,
}

impl RowCells {
    fn parse(row: usize, record: &csv::StringRecord, index: &HeaderIndex) -> Self {
        let mut cells = RowCells {
            row,
            values: HashMap::new(),
            issues: Vec::new(),
        };

        for col in COLUMNS {
            let Some(raw) = index.position(col.name).and_then(|pos| record.get(pos)) else {
                continue;
            };
            if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
                continue;
            }
            match coerce(col.kind, raw) {
                Ok(value) => {
                    cells.values.insert(col.name, value);
                }
                Err(message) => cells.issue(col.name, message),
            }
        }
        cells
    }

    fn issue(&mut self, column: &'static str, message: impl Into<String>) {
        // first complaint per column wins
        if self.issues.iter().any(|i| i.column == column) {
            return;
        }
        self.issues.push(FieldIssue {
            column,
            message: message.into(),
        });
    }

    fn has_issue(&self, column: &str) -> bool {
        self.issues.iter().any(|i| i.column == column)
    }

    fn value(&mut self, column: &'static str) -> Option<Value> {
        let v = self.values.get(column).cloned();
        if v.is_none() && !self.has_issue(column) {
            self.issue(column, "missing value");
        }
        v
    }

    fn date(&mut self, column: &'static str) -> Date {
        match self.value(column) {
            Some(Value::Date(d)) => d,
            _ => Date::MIN,
        }
    }

    fn text(&mut self, column: &'static str) -> String {
        match self.value(column) {
            Some(Value::Text(s)) => s,
            _ => String::new(),
        }
    }

    fn path(&mut self, column: &'static str) -> PathBuf {
        PathBuf::from(self.text(column))
    }

    fn int(&mut self, column: &'static str) -> i64 {
        match self.value(column) {
            Some(Value::Int(v)) => v,
            _ => 0,
        }
    }

    fn float(&mut self, column: &'static str) -> f64 {
        match self.value(column) {
            Some(Value::Float(v)) => v,
            _ => 0.0,
        }
    }

    fn float_in(&mut self, column: &'static str, range: RangeInclusive<f64>) -> f64 {
        let v = self.float(column);
        if !self.has_issue(column) && !range.contains(&v) {
            self.issue(column, out_of_range(v, &range));
        }
        v
    }

    fn optional_float_in(
        &mut self,
        column: &'static str,
        range: Option<RangeInclusive<f64>>,
    ) -> Option<f64> {
        let Some(Value::Float(v)) = self.values.get(column).cloned() else {
            return None;
        };
        if let Some(range) = range {
            if !range.contains(&v) {
                self.issue(column, out_of_range(v, &range));
            }
        }
        Some(v)
    }

    fn measured(&mut self, column: &'static str, check: fn(f64) -> Result<(), String>) -> Measured {
        match self.value(column) {
            Some(Value::Measured(m)) => {
                self.check_constant(column, &m, check);
                m
            }
            _ => Measured::Constant(0.0),
        }
    }

    fn optional_measured(
        &mut self,
        column: &'static str,
        check: fn(f64) -> Result<(), String>,
    ) -> Option<Measured> {
        let Some(Value::Measured(m)) = self.values.get(column).cloned() else {
            return None;
        };
        self.check_constant(column, &m, check);
        Some(m)
    }

    fn check_constant(
        &mut self,
        column: &'static str,
        m: &Measured,
        check: fn(f64) -> Result<(), String>,
    ) {
        if let Some(v) = m.constant() {
            if let Err(message) = check(v) {
                self.issue(column, message);
            }
        }
    }

    fn bounds(&mut self, low_col: &'static str, high_col: &'static str) -> PercentileBounds {
        let low = self.float_in(low_col, PERCENT);
        let high = self.float_in(high_col, PERCENT);
        if !self.has_issue(low_col) && !self.has_issue(high_col) && low >= high {
            self.issue(
                high_col,
                format!("{high_col} ({high}) must be greater than {low_col} ({low})"),
            );
        }
        PercentileBounds { low, high }
    }

    fn radiation(
        &mut self,
        method_col: &'static str,
        direct_col: &'static str,
        transm_col: &'static str,
    ) -> RadiationInput {
        let code = self.int(method_col);
        let method = match RadiationMethod::from_code(code) {
            Some(m) => m,
            None => {
                if !self.has_issue(method_col) {
                    self.issue(method_col, format!("expected 1 or 2, got {code}"));
                }
                RadiationMethod::Direct
            }
        };
        let direct = self.optional_measured(direct_col, non_negative);
        let transmissivity = self.optional_measured(transm_col, unit_interval);

        if !self.has_issue(method_col) {
            match method {
                RadiationMethod::Direct if direct.is_none() && !self.has_issue(direct_col) => {
                    self.issue(direct_col, format!("required when {method_col} is 1"));
                }
                RadiationMethod::Transmissivity
                    if transmissivity.is_none() && !self.has_issue(transm_col) =>
                {
                    self.issue(transm_col, format!("required when {method_col} is 2"));
                }
                _ => {}
            }
        }

        RadiationInput {
            method,
            direct,
            transmissivity,
        }
    }

    fn into_descriptor(mut self) -> Result<JobDescriptor, BatchError> {
        use schema::*;

        let image_code = self.int(IMAGE_TYPE);
        let image_type = ImageType::from_code(image_code);
        if image_type.is_none() && !self.has_issue(IMAGE_TYPE) {
            self.issue(IMAGE_TYPE, format!("expected 1, 2 or 3, got {image_code}"));
        }

        let identity = Identity {
            date_acquired: self.date(DATE_ACQUIRED),
            image_name: self.text(IMAGE_NAME),
            input_folder: self.path(INPUT_FOLDER),
            output_folder: self.path(OUTPUT_FOLDER),
            image_type: image_type.unwrap_or(ImageType::Landsat),
            dem_path: self.path(DEM_FILE),
        };

        let satellite_nr = self.int(SATELLITE_NR);
        if !self.has_issue(SATELLITE_NR) && !(1..=u8::MAX as i64).contains(&satellite_nr) {
            self.issue(
                SATELLITE_NR,
                format!("expected a positive satellite number, got {satellite_nr}"),
            );
        }
        let thermal_bands = self.int(THERMAL_BANDS);
        if !self.has_issue(THERMAL_BANDS) && !(1..=2).contains(&thermal_bands) {
            self.issue(THERMAL_BANDS, format!("expected 1 or 2, got {thermal_bands}"));
        }

        let sensor = Sensor {
            satellite_nr: satellite_nr.clamp(0, u8::MAX as i64) as u8,
            thermal_bands: thermal_bands.clamp(0, 2) as u8,
            tcold: self.bounds(TCOLD_MIN, TCOLD_MAX),
            ndvi_hot: self.bounds(NDVI_HOT_LOW, NDVI_HOT_HIGH),
            ndvi_cold: self.bounds(NDVI_COLD_LOW, NDVI_COLD_HIGH),
            hot_pixel_constant: self.float(HOT_PIXEL_CONSTANT),
            cold_pixel_constant: self.float(COLD_PIXEL_CONSTANT),
        };

        let weather = Weather {
            temp_inst: self.measured(TEMP_INST, any_value),
            temp_24: self.measured(TEMP_24, any_value),
            rh_inst: self.measured(RH_INST, percentage),
            rh_24: self.measured(RH_24, percentage),
            wind_inst: self.measured(WIND_INST, non_negative),
            wind_24: self.measured(WIND_24, non_negative),
            wind_height: self.float(WIND_HEIGHT),
        };
        if !self.has_issue(WIND_HEIGHT) && weather.wind_height <= 0.0 {
            self.issue(WIND_HEIGHT, format!("must be positive, got {}", weather.wind_height));
        }

        let radiation = Radiation {
            daily: self.radiation(METHOD_RADIATION_24, RS_24, TRANSM_24),
            instantaneous: self.radiation(METHOD_RADIATION_INST, RS_INST, TRANSM_INST),
        };

        let soil = Soil {
            theta_sat_top: self.optional_float_in(THETA_SAT_TOP, Some(FRACTION)),
            theta_sat_sub: self.optional_float_in(THETA_SAT_SUB, Some(FRACTION)),
            theta_res_top: self.optional_float_in(THETA_RES_TOP, Some(FRACTION)),
            theta_res_sub: self.optional_float_in(THETA_RES_SUB, Some(FRACTION)),
            field_capacity: self.optional_float_in(FIELD_CAPACITY, Some(FRACTION)),
            wilting_point: self.optional_float_in(WILTING_POINT, Some(FRACTION)),
            lue_max: self.optional_float_in(LUE_MAX, None),
            obstacle_height: self.optional_float_in(OBSTACLE_HEIGHT, None),
            depletion_factor: self.optional_float_in(DEPLETION_FACTOR, Some(FRACTION)),
        };

        if !self.issues.is_empty() {
            return Err(BatchError::Validation {
                row: self.row,
                issues: self.issues,
            });
        }

        Ok(JobDescriptor {
            row: self.row,
            identity,
            sensor,
            weather,
            radiation,
            soil,
        })
    }
}

fn coerce(kind: ColumnKind, raw: &str) -> Result<Value, String> {
    match kind {
        ColumnKind::Date => parse_date(raw)
            .map(Value::Date)
            .ok_or_else(|| format!("expected a date (YYYY-MM-DD), got `{raw}`")),
        ColumnKind::Text | ColumnKind::Path => Ok(Value::Text(raw.to_string())),
        ColumnKind::Integer | ColumnKind::Selector => parse_int(raw)
            .map(Value::Int)
            .ok_or_else(|| format!("expected an integer, got `{raw}`")),
        ColumnKind::Float => parse_float(raw)
            .map(Value::Float)
            .ok_or_else(|| format!("expected a number, got `{raw}`")),
        ColumnKind::Measured => parse_measured(raw).map(Value::Measured),
    }
}

/// Spreadsheet exports often write integer columns as `8.0`.
fn parse_int(raw: &str) -> Option<i64> {
    if let Ok(v) = raw.parse::<i64>() {
        return Some(v);
    }
    let f = parse_float(raw)?;
    (f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

fn parse_float(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_measured(raw: &str) -> Result<Measured, String> {
    if let Some(v) = parse_float(raw) {
        return Ok(Measured::Constant(v));
    }
    if looks_like_map(raw) {
        return Ok(Measured::Map(PathBuf::from(raw)));
    }
    Err(format!("expected a number or a map raster path, got `{raw}`"))
}

fn looks_like_map(raw: &str) -> bool {
    let lower = raw.to_ascii_lowercase();
    lower.ends_with(".tif") || lower.ends_with(".tiff") || raw.contains('/') || raw.contains('\\')
}

fn out_of_range(v: f64, range: &RangeInclusive<f64>) -> String {
    format!("{v} is outside {}..={}", range.start(), range.end())
}

fn any_value(_: f64) -> Result<(), String> {
    Ok(())
}

fn percentage(v: f64) -> Result<(), String> {
    if PERCENT.contains(&v) {
        Ok(())
    } else {
        Err(out_of_range(v, &PERCENT))
    }
}

fn non_negative(v: f64) -> Result<(), String> {
    if v >= 0.0 {
        Ok(())
    } else {
        Err(format!("must not be negative, got {v}"))
    }
}

fn unit_interval(v: f64) -> Result<(), String> {
    if v > 0.0 && v <= 1.0 {
        Ok(())
    } else {
        Err(format!("{v} is outside (0, 1]"))
    }
}

fn warn_implausible(d: &JobDescriptor, rules: &Validation) {
    let range = rules.min_temperature_c..=rules.max_temperature_c;
    for (column, m) in [
        (schema::TEMP_INST, &d.weather.temp_inst),
        (schema::TEMP_24, &d.weather.temp_24),
    ] {
        if let Some(t) = m.constant() {
            if !range.contains(&t) {
                warn!(row = d.row, column, "temperature {t} C looks implausible");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    #[test]
    fn parses_both_date_layouts() {
        let d = Date::from_calendar_date(2025, Month::March, 7).unwrap();
        assert_eq!(parse_date("2025-03-07"), Some(d));
        assert_eq!(parse_date("2025/03/07"), Some(d));
        assert_eq!(parse_date("07-03-2025"), None);
    }

    #[test]
    fn integers_accept_whole_floats() {
        assert_eq!(parse_int("8"), Some(8));
        assert_eq!(parse_int("8.0"), Some(8));
        assert_eq!(parse_int("8.5"), None);
        assert_eq!(parse_int("eight"), None);
    }

    #[test]
    fn measured_values_are_constants_or_maps() {
        assert_eq!(parse_measured("21.5"), Ok(Measured::Constant(21.5)));
        assert_eq!(
            parse_measured("meteo/temp_24.tif"),
            Ok(Measured::Map(PathBuf::from("meteo/temp_24.tif")))
        );
        assert!(parse_measured("2O.5").is_err());
        assert!(parse_measured("inf").is_err());
    }
}
