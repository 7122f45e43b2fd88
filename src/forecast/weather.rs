//! Weather sources.
//!
//! Live conditions come from a WeatherAPI-style `current.json` endpoint and
//! feed the live control loop. Hourly archives come from an Open-Meteo-style
//! archive endpoint and feed historical runs. In-memory sources stand in for
//! both in simulation and tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{GeoLocation, WeatherSample, WeatherSnapshot};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeatherError {
    #[error("weather unavailable: {0}")]
    Unavailable(String),
    #[error("malformed weather response: {0}")]
    Malformed(String),
    #[error("weather data incomplete: {0}")]
    Incomplete(String),
}

#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current(&self, location: &GeoLocation) -> Result<WeatherSnapshot, WeatherError>;
}

#[async_trait]
pub trait HistoricalWeatherSource: Send + Sync {
    /// Samples within `[start, end]`, ordered by timestamp.
    async fn fetch_range(
        &self,
        location: &GeoLocation,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WeatherSample>, WeatherError>;
}

fn http_client(timeout: Duration) -> Result<Client, WeatherError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| WeatherError::Unavailable(format!("failed to build http client: {e}")))
}

/// WeatherAPI-compatible live conditions client
pub struct WeatherApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl WeatherApiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self, WeatherError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    current: CurrentConditions,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    temp_c: f64,
    #[serde(default)]
    is_day: Option<u8>,
    #[serde(default)]
    last_updated_epoch: Option<i64>,
}

#[async_trait]
impl WeatherSource for WeatherApiClient {
    async fn current(&self, location: &GeoLocation) -> Result<WeatherSnapshot, WeatherError> {
        let url = format!("{}/current.json", self.base_url);
        let query = location.query();
        debug!(%url, location = %query, "fetching current weather");

        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("q", query.as_str())])
            .send()
            .await
            .map_err(|e| WeatherError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "weather API returned error status");
            return Err(WeatherError::Unavailable(format!("status {}", response.status())));
        }

        let body: CurrentResponse = response
            .json()
            .await
            .map_err(|e| WeatherError::Malformed(e.to_string()))?;

        let observed_at = body
            .current
            .last_updated_epoch
            .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
            .unwrap_or_else(Utc::now);

        Ok(WeatherSnapshot {
            outdoor_temp_c: body.current.temp_c,
            is_day: body.current.is_day.map(|d| d != 0),
            observed_at,
        })
    }
}

/// Open-Meteo-compatible hourly archive client
pub struct OpenMeteoArchiveClient {
    client: Client,
    base_url: String,
}

impl OpenMeteoArchiveClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, WeatherError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    hourly: ArchiveHourly,
}

#[derive(Debug, Deserialize)]
struct ArchiveHourly {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
}

const ARCHIVE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

fn parse_archive(
    hourly: ArchiveHourly,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<WeatherSample>, WeatherError> {
    if hourly.time.len() != hourly.temperature_2m.len() {
        return Err(WeatherError::Malformed(format!(
            "{} timestamps but {} temperatures",
            hourly.time.len(),
            hourly.temperature_2m.len()
        )));
    }

    let mut samples = Vec::with_capacity(hourly.time.len());
    for (time, temp) in hourly.time.iter().zip(hourly.temperature_2m) {
        let naive = NaiveDateTime::parse_from_str(time, ARCHIVE_TIME_FORMAT)
            .map_err(|e| WeatherError::Malformed(format!("bad timestamp {time:?}: {e}")))?;
        let timestamp = naive.and_utc();
        // Null samples are dropped and surface later as gaps
        if let Some(outdoor_temp_c) = temp {
            if timestamp >= start && timestamp <= end {
                samples.push(WeatherSample {
                    timestamp,
                    outdoor_temp_c,
                });
            }
        }
    }
    samples.sort_by_key(|s| s.timestamp);
    Ok(samples)
}

#[async_trait]
impl HistoricalWeatherSource for OpenMeteoArchiveClient {
    async fn fetch_range(
        &self,
        location: &GeoLocation,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WeatherSample>, WeatherError> {
        let url = format!("{}/v1/archive", self.base_url);
        let start_date = start.format("%Y-%m-%d").to_string();
        let end_date = end.format("%Y-%m-%d").to_string();
        debug!(%url, %start_date, %end_date, "fetching weather archive");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("latitude", location.latitude.to_string()),
                ("longitude", location.longitude.to_string()),
                ("start_date", start_date),
                ("end_date", end_date),
                ("hourly", "temperature_2m".to_string()),
                ("timezone", "UTC".to_string()),
            ])
            .send()
            .await
            .map_err(|e| WeatherError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "weather archive returned error status");
            return Err(WeatherError::Unavailable(format!("status {}", response.status())));
        }

        let body: ArchiveResponse = response
            .json()
            .await
            .map_err(|e| WeatherError::Malformed(e.to_string()))?;

        let samples = parse_archive(body.hourly, start, end)?;
        if samples.is_empty() {
            return Err(WeatherError::Incomplete(format!(
                "no samples between {start} and {end}"
            )));
        }
        Ok(samples)
    }
}

/// Live source returning whatever temperature was last set.
#[derive(Debug, Default)]
pub struct StaticWeatherSource {
    outdoor_temp_c: RwLock<Option<f64>>,
}

impl StaticWeatherSource {
    pub fn new(outdoor_temp_c: Option<f64>) -> Self {
        Self {
            outdoor_temp_c: RwLock::new(outdoor_temp_c),
        }
    }

    pub fn set(&self, outdoor_temp_c: Option<f64>) {
        *self.outdoor_temp_c.write() = outdoor_temp_c;
    }
}

#[async_trait]
impl WeatherSource for StaticWeatherSource {
    async fn current(&self, _location: &GeoLocation) -> Result<WeatherSnapshot, WeatherError> {
        let outdoor_temp_c = (*self.outdoor_temp_c.read())
            .ok_or_else(|| WeatherError::Unavailable("no outdoor temperature set".into()))?;
        Ok(WeatherSnapshot {
            outdoor_temp_c,
            is_day: None,
            observed_at: Utc::now(),
        })
    }
}

/// Archive backed by a fixed list of samples.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistoricalWeather {
    samples: Vec<WeatherSample>,
}

impl InMemoryHistoricalWeather {
    pub fn new(mut samples: Vec<WeatherSample>) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        Self { samples }
    }
}

#[async_trait]
impl HistoricalWeatherSource for InMemoryHistoricalWeather {
    async fn fetch_range(
        &self,
        _location: &GeoLocation,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WeatherSample>, WeatherError> {
        Ok(self
            .samples
            .iter()
            .filter(|s| s.timestamp >= start && s.timestamp <= end)
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn location() -> GeoLocation {
        GeoLocation {
            latitude: 52.52,
            longitude: 13.41,
            name: Some("Berlin".to_string()),
        }
    }

    fn utc(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_current_weather() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/current.json"))
            .and(query_param("key", "secret"))
            .and(query_param("q", "Berlin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "location": {"name": "Berlin"},
                "current": {"temp_c": -2.5, "is_day": 1, "last_updated_epoch": 1704888000}
            })))
            .mount(&server)
            .await;

        let client = WeatherApiClient::new(server.uri(), "secret", Duration::from_secs(2)).unwrap();
        let snapshot = client.current(&location()).await.unwrap();
        assert_eq!(snapshot.outdoor_temp_c, -2.5);
        assert_eq!(snapshot.is_day, Some(true));
        assert_eq!(snapshot.observed_at, Utc.timestamp_opt(1704888000, 0).unwrap());
    }

    #[tokio::test]
    async fn test_current_weather_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/current.json"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = WeatherApiClient::new(server.uri(), "bad", Duration::from_secs(2)).unwrap();
        let err = client.current(&location()).await.unwrap_err();
        assert!(matches!(err, WeatherError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_current_weather_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/current.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"current": {}})))
            .mount(&server)
            .await;

        let client = WeatherApiClient::new(server.uri(), "k", Duration::from_secs(2)).unwrap();
        let err = client.current(&location()).await.unwrap_err();
        assert!(matches!(err, WeatherError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_archive_series() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/archive"))
            .and(query_param("start_date", "2024-01-01"))
            .and(query_param("end_date", "2024-01-01"))
            .and(query_param("hourly", "temperature_2m"))
            .and(query_param("timezone", "UTC"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hourly": {
                    "time": ["2024-01-01T00:00", "2024-01-01T01:00", "2024-01-01T02:00", "2024-01-01T03:00"],
                    "temperature_2m": [1.5, null, 0.5, -0.5]
                }
            })))
            .mount(&server)
            .await;

        let client = OpenMeteoArchiveClient::new(server.uri(), Duration::from_secs(2)).unwrap();
        let samples = client
            .fetch_range(&location(), utc(1, 0), utc(1, 2))
            .await
            .unwrap();
        assert_eq!(
            samples,
            vec![
                WeatherSample { timestamp: utc(1, 0), outdoor_temp_c: 1.5 },
                WeatherSample { timestamp: utc(1, 2), outdoor_temp_c: 0.5 },
            ]
        );
    }

    #[test]
    fn test_archive_length_mismatch() {
        let hourly = ArchiveHourly {
            time: vec!["2024-01-01T00:00".into()],
            temperature_2m: vec![],
        };
        assert!(matches!(
            parse_archive(hourly, utc(1, 0), utc(1, 1)),
            Err(WeatherError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_in_memory_sources() {
        let live = StaticWeatherSource::new(None);
        assert!(live.current(&location()).await.is_err());
        live.set(Some(4.0));
        assert_eq!(live.current(&location()).await.unwrap().outdoor_temp_c, 4.0);

        let archive = InMemoryHistoricalWeather::new(
            (0..6).map(|h| WeatherSample { timestamp: utc(2, h), outdoor_temp_c: h as f64 }).collect(),
        );
        let samples = archive.fetch_range(&location(), utc(2, 1), utc(2, 3)).await.unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].timestamp, utc(2, 1));
    }
}
