//! Deterministic synthetic conditions.
//!
//! Pure computation from (lat, lon, time): no I/O, no randomness, no
//! failure path. Values are plausible rather than accurate and exist so the
//! chain always has a structurally complete answer.

use std::f64::consts::PI;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveTime, TimeZone, Timelike, Utc};

use super::payload::{
    ConditionsRequest, MarineConditions, MoonInfo, PressureTrend, SunTimes, TideEvent, TideKind,
};
use crate::providers::SyntheticProvider;
use crate::providers::result::iso;

/// Mean synodic month in days.
const SYNODIC_MONTH_DAYS: f64 = 29.530_588_853;
/// Principal lunar semidiurnal tide period in hours.
const TIDE_PERIOD_HOURS: f64 = 12.42;
/// Maximum solar declination in degrees.
const AXIAL_TILT_DEG: f64 = 23.44;

const MOON_PHASES: [&str; 8] = [
    "New Moon",
    "Waxing Crescent",
    "First Quarter",
    "Waxing Gibbous",
    "Full Moon",
    "Waning Gibbous",
    "Last Quarter",
    "Waning Crescent",
];

/// Terminal provider for the conditions chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticConditions;

impl SyntheticProvider<ConditionsRequest, MarineConditions> for SyntheticConditions {
    fn generate(&self, request: &ConditionsRequest, now: DateTime<Utc>) -> MarineConditions {
        let (lat, lon) = (request.lat, request.lon);
        let day = f64::from(now.ordinal0());
        let hour = f64::from(now.hour()) + f64::from(now.minute()) / 60.0;
        let seed = coordinate_seed(lat, lon);
        let seed2 = coordinate_seed(lon, lat);

        let wind_kt = 10.0 + 6.0 * seed + 4.0 * (2.0 * PI * hour / 24.0 + seed * 2.0 * PI).sin();
        let wind_dir = (seed * 360.0 + 20.0 * (2.0 * PI * day / 7.0).sin()).rem_euclid(360.0);
        let swell_ft = 1.5 + 3.0 * seed2 + 0.8 * (2.0 * PI * day / 5.0 + seed2).sin();
        let swell_period_s = 6.0 + 6.0 * seed2;

        let pressure_phase = 2.0 * PI * day / 7.0 + seed * 2.0 * PI;
        let pressure_hpa = 1013.0 + 6.0 * pressure_phase.sin();
        let slope = pressure_phase.cos();
        let pressure_trend = if slope > 0.2 {
            PressureTrend::Rising
        } else if slope < -0.2 {
            PressureTrend::Falling
        } else {
            PressureTrend::Steady
        };

        let moon_age = moon_age_days(now);

        MarineConditions {
            sst_c: Some(round(sea_surface_temp(lat, day), 1)),
            wind_kt: Some(round(wind_kt.max(0.0), 1)),
            wind_dir: Some(wind_dir.round()),
            swell_ft: Some(round(swell_ft.max(0.0), 1)),
            swell_period_s: Some(round(swell_period_s, 1)),
            pressure_hpa: Some(round(pressure_hpa, 1)),
            pressure_trend: Some(pressure_trend),
            tides: tides(lon, seed, moon_age, now),
            moon: Some(moon(moon_age)),
            sun: Some(sun(lat, lon, now)),
            last_iso: iso(now),
            sources: Vec::new(),
        }
    }
}

/// Stable pseudo-random value in [0, 1) for a coordinate pair.
fn coordinate_seed(a: f64, b: f64) -> f64 {
    let x = (a * 12.9898 + b * 78.233).sin() * 43_758.545_3;
    x - x.floor()
}

fn round(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// Warm at the equator, cooling poleward, peaking in late summer.
fn sea_surface_temp(lat: f64, day: f64) -> f64 {
    let base = 28.0 - 0.35 * (lat.abs() - 10.0).max(0.0);
    let peak_day = if lat >= 0.0 { 227.0 } else { 45.0 };
    let seasonal = (2.0 + 0.05 * lat.abs().min(60.0)) * (2.0 * PI * (day - peak_day) / 365.25).cos();
    (base + seasonal).clamp(-1.8, 31.0)
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn reference_new_moon() -> DateTime<Utc> {
    // 2000-01-06 18:14 UTC.
    Utc.timestamp_opt(947_182_440, 0).single().unwrap_or_default()
}

fn moon_age_days(now: DateTime<Utc>) -> f64 {
    let elapsed = (now - reference_new_moon()).num_seconds() as f64 / 86_400.0;
    elapsed.rem_euclid(SYNODIC_MONTH_DAYS)
}

fn moon(age: f64) -> MoonInfo {
    let fraction = age / SYNODIC_MONTH_DAYS;
    let illumination = (1.0 - (2.0 * PI * fraction).cos()) / 2.0;
    let index = ((fraction * 8.0) + 0.5).floor() as usize % MOON_PHASES.len();
    MoonInfo {
        phase: MOON_PHASES[index].to_string(),
        illumination: round(illumination, 2),
    }
}

/// Alternating highs and lows over the current UTC day, with spring tides
/// around new and full moon.
fn tides(lon: f64, seed: f64, moon_age: f64, now: DateTime<Utc>) -> Vec<TideEvent> {
    let midnight = start_of_day(now);
    let days = (midnight - reference_new_moon()).num_seconds() as f64 / 86_400.0;
    // High water drifts about 50 minutes later each day.
    let first_high = (lon / 15.0 + days * 0.8417 + seed * TIDE_PERIOD_HOURS)
        .rem_euclid(TIDE_PERIOD_HOURS);

    let spring = 1.0 + 0.3 * (4.0 * PI * moon_age / SYNODIC_MONTH_DAYS).cos();
    let range = 3.0 * spring * (0.6 + 0.4 * seed);
    let half_period = TIDE_PERIOD_HOURS / 2.0;

    // Start one half period early so a low before the first high is included.
    let mut at = first_high - half_period;
    let mut kind = TideKind::Low;
    let mut events = Vec::new();
    while at < 24.0 {
        if at >= 0.0 {
            let height = match kind {
                TideKind::High => 0.5 + range / 2.0,
                TideKind::Low => 0.5 - range / 2.0,
            };
            let time = midnight + ChronoDuration::seconds((at * 3600.0).round() as i64);
            events.push(TideEvent {
                time: iso(time),
                kind,
                height_ft: round(height, 2),
            });
        }
        at += half_period;
        kind = match kind {
            TideKind::High => TideKind::Low,
            TideKind::Low => TideKind::High,
        };
    }
    events
}

/// Sunrise and sunset from solar declination; equation of time ignored.
fn sun(lat: f64, lon: f64, now: DateTime<Utc>) -> SunTimes {
    let midnight = start_of_day(now);
    let day = f64::from(now.ordinal0()) + 1.0;
    let declination = -AXIAL_TILT_DEG.to_radians() * (2.0 * PI / 365.0 * (day + 10.0)).cos();
    let cos_hour_angle = (-lat.to_radians().tan() * declination.tan()).clamp(-1.0, 1.0);
    let half_day_hours = cos_hour_angle.acos().to_degrees() / 15.0;
    let solar_noon = 12.0 - lon / 15.0;

    let at = |hours: f64| iso(midnight + ChronoDuration::seconds((hours * 3600.0).round() as i64));
    SunTimes {
        sunrise: at(solar_noon - half_day_hours),
        sunset: at(solar_noon + half_day_hours),
    }
}
