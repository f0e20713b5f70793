use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use inquire::{CustomType, Select, Text};
use weather_core::{City, Config, DailyForecast, HourlyForecast, WeatherGateway};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Weather CLI")]
pub struct Cli {
    /// Log debug output to stderr (overrides RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactively edit language, timeout and retry settings.
    Configure,

    /// Print the path of the configuration file.
    ConfigPath,

    /// Search for cities by name.
    Search {
        /// City name, case-insensitive.
        name: String,
    },

    /// Daily forecast (5 days) for coordinates.
    Daily {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },

    /// Hourly forecast (next 12 hours) for coordinates.
    Hourly {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },

    /// Search a city, pick one of the matches, and show both forecasts.
    Show {
        /// City name, case-insensitive.
        name: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::ConfigPath => {
                println!("{}", Config::config_file_path()?.display());
                Ok(())
            }
            Command::Search { name } => {
                let cities = gateway()?.search_cities(&name).await.map_err(user_error)?;
                if self.json {
                    return print_json(&cities);
                }
                if cities.is_empty() {
                    println!("No cities found for '{name}'.");
                }
                for city in &cities {
                    println!("{city}");
                }
                Ok(())
            }
            Command::Daily { lat, lon } => {
                let days = gateway()?.daily_forecast(lat, lon).await.map_err(user_error)?;
                if self.json {
                    return print_json(&days);
                }
                print_daily(&days);
                Ok(())
            }
            Command::Hourly { lat, lon } => {
                let hours = gateway()?.hourly_forecast(lat, lon).await.map_err(user_error)?;
                if self.json {
                    return print_json(&hours);
                }
                print_hourly(&hours);
                Ok(())
            }
            Command::Show { name } => show(&name, self.json).await,
        }
    }
}

fn gateway() -> Result<WeatherGateway> {
    let config = Config::load()?;
    WeatherGateway::from_config(config).context("Failed to initialise weather gateway")
}

/// Keep the full error in the log, show the user a generic message.
fn user_error(err: weather_core::GatewayError) -> anyhow::Error {
    tracing::error!(error = %err, "Weather request failed");
    anyhow::anyhow!("{}", err.user_message())
}

async fn show(name: &str, json: bool) -> Result<()> {
    let gateway = gateway()?;
    let cities = gateway.search_cities(name).await.map_err(user_error)?;

    let city = match cities.len() {
        0 => bail!("No cities found for '{name}'."),
        1 => cities.into_iter().next().context("city list unexpectedly empty")?,
        _ => Select::new("Which one?", cities)
            .prompt()
            .context("City selection cancelled")?,
    };

    let (daily, hourly) = tokio::join!(
        gateway.daily_forecast(city.latitude, city.longitude),
        gateway.hourly_forecast(city.latitude, city.longitude),
    );

    if json {
        return print_json(&serde_json::json!({
            "city": city,
            "daily": daily.map_err(user_error)?,
            "hourly": hourly.map_err(user_error)?,
        }));
    }

    println!("{}", city.display_name());
    println!();

    // Show whatever succeeded; a failed half does not hide the other.
    match hourly {
        Ok(hours) => print_hourly(&hours),
        Err(e) => eprintln!("Hourly forecast: {}", user_error(e)),
    }
    println!();
    match daily {
        Ok(days) => print_daily(&days),
        Err(e) => eprintln!("Daily forecast: {}", user_error(e)),
    }

    Ok(())
}

fn configure() -> Result<()> {
    let mut config = Config::load()?;

    let language = Text::new("Result language (e.g. en, de, fr):")
        .with_default(&config.upstream.language)
        .prompt()
        .context("Configuration cancelled")?;

    let timeout = CustomType::<u64>::new("Per-attempt timeout in seconds:")
        .with_default(config.upstream.attempt_timeout_secs)
        .prompt()
        .context("Configuration cancelled")?;

    let retries = CustomType::<u32>::new("Retries after a transient failure:")
        .with_default(config.retry.max_retries)
        .prompt()
        .context("Configuration cancelled")?;

    config.upstream.language = language;
    config.upstream.attempt_timeout_secs = timeout;
    config.retry.max_retries = retries;

    config.save()?;
    println!("Saved {}", Config::config_file_path()?.display());
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_daily(days: &[DailyForecast]) {
    if days.is_empty() {
        println!("No daily forecast available.");
    }
    for d in days {
        println!(
            "{}  {:>5.1}° / {:>5.1}°  {:<22} {:>5.1} mm  {:>5.1} km/h",
            d.date.format("%a %d %b"),
            d.max_temp_c,
            d.min_temp_c,
            d.condition,
            d.precipitation_mm,
            d.max_wind_kmh,
        );
    }
}

fn print_hourly(hours: &[HourlyForecast]) {
    if hours.is_empty() {
        println!("No hourly forecast available.");
    }
    for h in hours {
        println!(
            "{}  {:>5.1}°  {:<22} {:>5.1} mm  {:>5.1} km/h",
            h.timestamp.format("%H:%M"),
            h.temperature_c,
            h.condition,
            h.precipitation_mm,
            h.wind_kmh,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_coordinates_parse() {
        let cli = Cli::try_parse_from(["weather", "daily", "--lat", "-33.87", "--lon", "151.21"]).unwrap();

        match cli.command {
            Command::Daily { lat, lon } => {
                assert_eq!(lat, -33.87);
                assert_eq!(lon, 151.21);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["weather", "search", "Paris", "--json", "-v"]).unwrap();

        assert!(cli.json);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Search { ref name } if name == "Paris"));
    }

    #[test]
    fn city_display_is_used_for_selection() {
        let city = City {
            name: "Paris".into(),
            latitude: 48.8534,
            longitude: 2.3488,
            country: Some("France".into()),
            region: Some("Île-de-France".into()),
        };

        assert_eq!(city.to_string(), "Paris, Île-de-France, France (48.85, 2.35)");
    }
}
