//! Open-Meteo wire format and conversion into domain objects.
//!
//! Forecast responses are parallel arrays indexed by time; they are zipped
//! here and rejected as corrupt when the lengths disagree. Daily values may be
//! `null` near the end of the forecast horizon; only the entries actually
//! returned must be present.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Deserialize;

use crate::{
    error::UpstreamFailure,
    model::{City, DailyForecast, HourlyForecast, WeatherCondition},
};

pub const DAILY_FIELDS: &str =
    "weather_code,temperature_2m_max,temperature_2m_min,precipitation_sum,wind_speed_10m_max";
pub const HOURLY_FIELDS: &str = "weather_code,temperature_2m,precipitation,wind_speed_10m";

#[derive(Debug, Deserialize)]
pub struct GeocodingResponse {
    /// Absent when nothing matched.
    #[serde(default)]
    pub results: Vec<GeoResult>,
}

#[derive(Debug, Deserialize)]
pub struct GeoResult {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub country: Option<String>,
    pub admin1: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DailyResponse {
    #[serde(default)]
    pub utc_offset_seconds: i32,
    pub daily: DailyBlock,
}

#[derive(Debug, Deserialize)]
pub struct DailyBlock {
    pub time: Vec<String>,
    pub weather_code: Vec<Option<i32>>,
    pub temperature_2m_max: Vec<Option<f64>>,
    pub temperature_2m_min: Vec<Option<f64>>,
    pub precipitation_sum: Vec<Option<f64>>,
    pub wind_speed_10m_max: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
pub struct HourlyResponse {
    #[serde(default)]
    pub utc_offset_seconds: i32,
    pub hourly: HourlyBlock,
}

/// Requested with `timeformat=unixtime`, so `time` holds exact UTC instants.
#[derive(Debug, Deserialize)]
pub struct HourlyBlock {
    pub time: Vec<i64>,
    pub weather_code: Vec<i32>,
    pub temperature_2m: Vec<f64>,
    pub precipitation: Vec<f64>,
    pub wind_speed_10m: Vec<f64>,
}

impl From<GeoResult> for City {
    fn from(r: GeoResult) -> Self {
        City {
            name: r.name,
            latitude: r.latitude,
            longitude: r.longitude,
            country: r.country,
            region: r.admin1,
        }
    }
}

impl GeocodingResponse {
    pub fn into_cities(self, limit: usize) -> Vec<City> {
        self.results.into_iter().take(limit).map(City::from).collect()
    }
}

impl DailyResponse {
    pub fn into_forecasts(self, limit: usize) -> Result<Vec<DailyForecast>, UpstreamFailure> {
        let d = self.daily;
        let len = d.time.len();
        ensure_len("daily.weather_code", d.weather_code.len(), len)?;
        ensure_len("daily.temperature_2m_max", d.temperature_2m_max.len(), len)?;
        ensure_len("daily.temperature_2m_min", d.temperature_2m_min.len(), len)?;
        ensure_len("daily.precipitation_sum", d.precipitation_sum.len(), len)?;
        ensure_len("daily.wind_speed_10m_max", d.wind_speed_10m_max.len(), len)?;

        (0..len.min(limit))
            .map(|i| {
                let date = NaiveDate::parse_from_str(&d.time[i], "%Y-%m-%d").map_err(|e| {
                    corrupt(format!("daily.time[{i}] '{}' is not a date: {e}", d.time[i]))
                })?;
                let code = present("daily.weather_code", &d.weather_code, i)?;

                Ok(DailyForecast {
                    date,
                    max_temp_c: present("daily.temperature_2m_max", &d.temperature_2m_max, i)?,
                    min_temp_c: present("daily.temperature_2m_min", &d.temperature_2m_min, i)?,
                    condition_code: code,
                    condition: WeatherCondition::from_wmo_code(code),
                    precipitation_mm: present("daily.precipitation_sum", &d.precipitation_sum, i)?,
                    max_wind_kmh: present("daily.wind_speed_10m_max", &d.wind_speed_10m_max, i)?,
                })
            })
            .collect()
    }
}

impl HourlyResponse {
    /// Every entry in the response, in provider order. Timestamps are shown in
    /// the location's current UTC offset; the instant itself is exact.
    pub fn into_forecasts(self) -> Result<Vec<HourlyForecast>, UpstreamFailure> {
        let offset = FixedOffset::east_opt(self.utc_offset_seconds)
            .ok_or_else(|| corrupt(format!("utc_offset_seconds {} out of range", self.utc_offset_seconds)))?;

        let h = self.hourly;
        let len = h.time.len();
        ensure_len("hourly.weather_code", h.weather_code.len(), len)?;
        ensure_len("hourly.temperature_2m", h.temperature_2m.len(), len)?;
        ensure_len("hourly.precipitation", h.precipitation.len(), len)?;
        ensure_len("hourly.wind_speed_10m", h.wind_speed_10m.len(), len)?;

        (0..len)
            .map(|i| {
                let timestamp = DateTime::from_timestamp(h.time[i], 0)
                    .map(|utc| utc.with_timezone(&offset))
                    .ok_or_else(|| corrupt(format!("hourly.time[{i}] {} is out of range", h.time[i])))?;
                let code = h.weather_code[i];

                Ok(HourlyForecast {
                    timestamp,
                    temperature_c: h.temperature_2m[i],
                    condition_code: code,
                    condition: WeatherCondition::from_wmo_code(code),
                    precipitation_mm: h.precipitation[i],
                    wind_kmh: h.wind_speed_10m[i],
                })
            })
            .collect()
    }
}

fn present<T: Copy>(field: &str, values: &[Option<T>], i: usize) -> Result<T, UpstreamFailure> {
    values[i].ok_or_else(|| corrupt(format!("{field}[{i}] is null")))
}

fn ensure_len(field: &str, actual: usize, expected: usize) -> Result<(), UpstreamFailure> {
    if actual == expected {
        Ok(())
    } else {
        Err(corrupt(format!("{field} has {actual} entries, expected {expected}")))
    }
}

fn corrupt(reason: String) -> UpstreamFailure {
    UpstreamFailure::Corrupt { reason }
}
