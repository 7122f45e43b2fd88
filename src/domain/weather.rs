use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current conditions used by the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub outdoor_temp_c: f64,
    #[serde(default)]
    pub is_day: Option<bool>,
    pub observed_at: DateTime<Utc>,
}

/// One archived outdoor temperature sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    pub timestamp: DateTime<Utc>,
    pub outdoor_temp_c: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    /// Free-form query for providers that resolve names ("London", "48.85,2.35")
    #[serde(default)]
    pub name: Option<String>,
}

impl GeoLocation {
    /// Query string understood by name-resolving providers.
    pub fn query(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{:.4},{:.4}", self.latitude, self.longitude))
    }
}
