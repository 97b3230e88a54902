//! Normalized marine-conditions payload.
//!
//! Every provider, including the synthetic generator, produces this exact
//! shape. Numeric readings are optional so a provider that answers with a
//! valid but sparse document still counts as a success.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheKey, Fingerprint};
use crate::providers::SourceStatus;
use crate::{GatewayError, Result};

/// A point to fetch conditions for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConditionsRequest {
    pub lat: f64,
    pub lon: f64,
}

impl ConditionsRequest {
    /// Validated constructor: latitude in [-90, 90], longitude in [-180, 180].
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(GatewayError::Configuration(format!(
                "coordinates out of range: {lat},{lon}"
            )));
        }
        Ok(Self { lat, lon })
    }
}

impl fmt::Display for ConditionsRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4},{:.4}", self.lat, self.lon)
    }
}

impl FromStr for ConditionsRequest {
    type Err = GatewayError;

    /// Parse `"LAT,LON"`.
    fn from_str(s: &str) -> Result<Self> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| GatewayError::Configuration(format!("expected LAT,LON, got '{s}'")))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| GatewayError::Configuration(format!("invalid coordinate '{v}': {e}")))
        };
        Self::new(parse(lat)?, parse(lon)?)
    }
}

impl CacheKey for ConditionsRequest {
    /// Coordinates are rounded to four decimals (about 11 m), so requests
    /// for the same spot share an entry.
    fn fingerprint(&self) -> Fingerprint {
        let lat = format!("{:.4}", self.lat + 0.0);
        let lon = format!("{:.4}", self.lon + 0.0);
        Fingerprint::from_parts(&["conditions", &lat, &lon])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureTrend {
    Rising,
    Falling,
    Steady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TideKind {
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TideEvent {
    /// RFC 3339 time of the extreme.
    pub time: String,
    pub kind: TideKind,
    pub height_ft: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoonInfo {
    pub phase: String,
    /// Illuminated fraction, 0.0 to 1.0.
    pub illumination: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SunTimes {
    pub sunrise: String,
    pub sunset: String,
}

/// Conditions at one point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarineConditions {
    pub sst_c: Option<f64>,
    pub wind_kt: Option<f64>,
    /// Degrees true the wind blows from.
    pub wind_dir: Option<f64>,
    pub swell_ft: Option<f64>,
    pub swell_period_s: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub pressure_trend: Option<PressureTrend>,
    pub tides: Vec<TideEvent>,
    pub moon: Option<MoonInfo>,
    pub sun: Option<SunTimes>,
    pub last_iso: String,
    /// Filled by the gateway from the resolution's provenance.
    #[serde(skip_deserializing)]
    pub sources: Vec<SourceStatus>,
}

impl MarineConditions {
    /// Whether no reading at all is present.
    pub fn is_empty(&self) -> bool {
        self.sst_c.is_none()
            && self.wind_kt.is_none()
            && self.swell_ft.is_none()
            && self.pressure_hpa.is_none()
            && self.tides.is_empty()
    }
}
