//! The public entry point: cached, resilient access to city search and
//! forecasts.
//!
//! Every operation follows the same steps: validate input (blank or
//! out-of-range input returns an empty result without touching cache or
//! network), derive a cache key, return a live cache entry if there is one,
//! otherwise call the provider through the [`RemoteExecutor`], convert the
//! response, cache it and return it.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::{
    cache::TtlCache,
    config::Config,
    error::GatewayError,
    model::{City, DailyForecast, HourlyForecast, round2},
    provider::{
        Endpoint, HttpTransport, RemoteExecutor, RemoteRequest, Transport,
        open_meteo::{DAILY_FIELDS, DailyResponse, GeocodingResponse, HOURLY_FIELDS, HourlyResponse},
    },
    resilience::CircuitBreaker,
};

pub const MAX_CITIES: usize = 5;
pub const MAX_DAYS: usize = 5;
pub const MAX_HOURS: usize = 12;
/// Two days of hourly data leave enough future hours after filtering.
const HOURLY_FORECAST_DAYS: &str = "2";

/// Caches owned by a gateway. Share one instance between gateways to share entries.
#[derive(Debug, Default)]
pub struct GatewayCaches {
    pub cities: TtlCache<Vec<City>>,
    pub daily: TtlCache<Vec<DailyForecast>>,
    /// Unfiltered provider hours; the upcoming-hours filter runs on every read.
    pub hourly: TtlCache<Vec<HourlyForecast>>,
}

#[derive(Debug, Clone)]
pub struct WeatherGateway {
    config: Config,
    geocoding: RemoteExecutor,
    forecast: RemoteExecutor,
    caches: Arc<GatewayCaches>,
}

impl WeatherGateway {
    /// Gateway talking HTTP to the configured provider.
    pub fn from_config(config: Config) -> Result<Self, GatewayError> {
        let transport = HttpTransport::new(config.attempt_timeout())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Gateway over any transport, with a fresh breaker per endpoint and empty caches.
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        let executor = |endpoint: Endpoint| {
            let breaker = Arc::new(CircuitBreaker::new(endpoint.as_str(), config.breaker_settings()));
            RemoteExecutor::new(endpoint, Arc::clone(&transport), config.retry_policy(), breaker)
                .with_attempt_timeout(config.attempt_timeout())
        };
        let geocoding = executor(Endpoint::Geocoding);
        let forecast = executor(Endpoint::Forecast);

        Self::with_parts(config, geocoding, forecast, Arc::new(GatewayCaches::default()))
    }

    /// Fully injected constructor.
    pub fn with_parts(
        config: Config,
        geocoding: RemoteExecutor,
        forecast: RemoteExecutor,
        caches: Arc<GatewayCaches>,
    ) -> Self {
        Self { config, geocoding, forecast, caches }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn caches(&self) -> &Arc<GatewayCaches> {
        &self.caches
    }

    pub fn breaker(&self, endpoint: Endpoint) -> &Arc<CircuitBreaker> {
        match endpoint {
            Endpoint::Geocoding => self.geocoding.breaker(),
            Endpoint::Forecast => self.forecast.breaker(),
        }
    }

    /// Up to 5 places matching `name`. Matching is case-insensitive.
    pub async fn search_cities(&self, name: &str) -> Result<Vec<City>, GatewayError> {
        let Some(key) = city_key(name) else {
            tracing::debug!("Blank city query, returning no results");
            return Ok(Vec::new());
        };

        if let Some(hit) = self.caches.cities.get(&key) {
            tracing::debug!(%key, "Cache hit");
            return Ok(hit);
        }
        tracing::debug!(%key, "Cache miss");

        let request = RemoteRequest::new(&self.config.upstream.geocoding_url)
            .param("name", name.trim())
            .param("count", MAX_CITIES.to_string())
            .param("language", &self.config.upstream.language)
            .param("format", "json");

        let response: GeocodingResponse = self.geocoding.execute(&request).await?;
        let cities = response.into_cities(MAX_CITIES);

        self.caches.cities.set(key, cities.clone(), self.config.search_ttl());
        Ok(cities)
    }

    /// The first 5 days of forecast, starting today (location's local date).
    pub async fn daily_forecast(&self, latitude: f64, longitude: f64) -> Result<Vec<DailyForecast>, GatewayError> {
        let Some(key) = coord_key("daily", latitude, longitude) else {
            tracing::debug!(latitude, longitude, "Invalid coordinates, returning no forecast");
            return Ok(Vec::new());
        };

        if let Some(hit) = self.caches.daily.get(&key) {
            tracing::debug!(%key, "Cache hit");
            return Ok(hit);
        }
        tracing::debug!(%key, "Cache miss");

        let request = self
            .forecast_request(latitude, longitude)
            .param("daily", DAILY_FIELDS)
            .param("timezone", "auto")
            .param("forecast_days", MAX_DAYS.to_string());

        let response: DailyResponse = self.forecast.execute(&request).await?;
        let days = response
            .into_forecasts(MAX_DAYS)
            .map_err(|e| GatewayError::from_fatal(Endpoint::Forecast, request.summary(), e))?;

        self.caches.daily.set(key, days.clone(), self.config.forecast_ttl());
        Ok(days)
    }

    /// The next 12 hourly entries whose timestamp is not in the past.
    pub async fn hourly_forecast(&self, latitude: f64, longitude: f64) -> Result<Vec<HourlyForecast>, GatewayError> {
        let Some(key) = coord_key("hourly", latitude, longitude) else {
            tracing::debug!(latitude, longitude, "Invalid coordinates, returning no forecast");
            return Ok(Vec::new());
        };

        let hours = match self.caches.hourly.get(&key) {
            Some(hit) => {
                tracing::debug!(%key, "Cache hit");
                hit
            }
            None => {
                tracing::debug!(%key, "Cache miss");
                let request = self
                    .forecast_request(latitude, longitude)
                    .param("hourly", HOURLY_FIELDS)
                    .param("timezone", "auto")
                    .param("timeformat", "unixtime")
                    .param("forecast_days", HOURLY_FORECAST_DAYS);

                let response: HourlyResponse = self.forecast.execute(&request).await?;
                let hours = response
                    .into_forecasts()
                    .map_err(|e| GatewayError::from_fatal(Endpoint::Forecast, request.summary(), e))?;

                self.caches.hourly.set(key, hours.clone(), self.config.forecast_ttl());
                hours
            }
        };

        Ok(upcoming_hours(hours, Utc::now(), MAX_HOURS))
    }

    fn forecast_request(&self, latitude: f64, longitude: f64) -> RemoteRequest {
        RemoteRequest::new(&self.config.upstream.forecast_url)
            .param("latitude", format!("{latitude:.4}"))
            .param("longitude", format!("{longitude:.4}"))
    }
}

/// Entries at or after `now`, in order, capped at `limit`.
pub fn upcoming_hours(hours: Vec<HourlyForecast>, now: DateTime<Utc>, limit: usize) -> Vec<HourlyForecast> {
    hours
        .into_iter()
        .filter(|h| h.timestamp.with_timezone(&Utc) >= now)
        .take(limit)
        .collect()
}

/// `search:<trimmed, lower-cased name>`, or `None` for a blank query.
pub fn city_key(name: &str) -> Option<String> {
    let normalized = name.trim().to_lowercase();
    (!normalized.is_empty()).then(|| format!("search:{normalized}"))
}

/// `<kind>:<lat>,<lon>` at 2 decimals, or `None` for impossible coordinates.
///
/// Distinct places inside the same 0.01° cell share a key.
pub fn coord_key(kind: &str, latitude: f64, longitude: f64) -> Option<String> {
    valid_coordinates(latitude, longitude)
        .then(|| format!("{kind}:{:.2},{:.2}", round2(latitude), round2(longitude)))
}

fn valid_coordinates(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}
