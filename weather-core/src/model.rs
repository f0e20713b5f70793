use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

/// A place returned by city search.
///
/// Two cities may share a name; use [`City::same_place`] to compare them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub country: Option<String>,
    pub region: Option<String>,
}

impl City {
    /// Compares coordinates at the provider's 2-decimal precision.
    pub fn same_place(&self, other: &City) -> bool {
        round2(self.latitude) == round2(other.latitude)
            && round2(self.longitude) == round2(other.longitude)
    }

    /// "Name, Region, Country", skipping whatever is missing.
    pub fn display_name(&self) -> String {
        let mut parts = vec![self.name.as_str()];
        parts.extend(self.region.as_deref().filter(|r| !r.is_empty() && *r != self.name));
        parts.extend(self.country.as_deref().filter(|c| !c.is_empty()));
        parts.join(", ")
    }
}

impl std::fmt::Display for City {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:.2}, {:.2})",
            self.display_name(),
            self.latitude,
            self.longitude
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub max_temp_c: f64,
    pub min_temp_c: f64,
    pub condition_code: i32,
    pub condition: WeatherCondition,
    pub precipitation_mm: f64,
    pub max_wind_kmh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyForecast {
    /// Local time at the forecast location, carrying its UTC offset.
    pub timestamp: DateTime<FixedOffset>,
    pub temperature_c: f64,
    pub condition_code: i32,
    pub condition: WeatherCondition,
    pub precipitation_mm: f64,
    pub wind_kmh: f64,
}

/// Weather categories derived from WMO weather interpretation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Clear,
    PartlyCloudy,
    Fog,
    Drizzle,
    Rain,
    Snow,
    SnowGrains,
    RainShowers,
    SnowShowers,
    Thunderstorm,
    ThunderstormWithHail,
    Unknown,
}

impl WeatherCondition {
    /// Total mapping: every code yields a category, unrecognised ones [`Self::Unknown`].
    /// See: https://open-meteo.com/en/docs#weathervariables
    pub fn from_wmo_code(code: i32) -> Self {
        match code {
            0 => Self::Clear,
            1..=3 => Self::PartlyCloudy,
            45 | 48 => Self::Fog,
            51 | 53 | 55 | 56 | 57 => Self::Drizzle,
            61 | 63 | 65 | 66 | 67 => Self::Rain,
            71 | 73 | 75 => Self::Snow,
            77 => Self::SnowGrains,
            80..=82 => Self::RainShowers,
            85 | 86 => Self::SnowShowers,
            95 => Self::Thunderstorm,
            96 | 99 => Self::ThunderstormWithHail,
            _ => Self::Unknown,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear sky",
            Self::PartlyCloudy => "Partly cloudy",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::Snow => "Snow",
            Self::SnowGrains => "Snow grains",
            Self::RainShowers => "Rain showers",
            Self::SnowShowers => "Snow showers",
            Self::Thunderstorm => "Thunderstorm",
            Self::ThunderstormWithHail => "Thunderstorm with hail",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for WeatherCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.description())
    }
}

/// Round to 2 decimal places, folding `-0.0` into `0.0`.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0 + 0.0
}
