//! Elevation projection and deviation classification.
//!
//! Projection scales a route's elevation to a reference race's distance
//! assuming constant gain/loss density, then classifies how far the
//! projected value deviates from the race's actual elevation.

use crate::{Race, Route};

/// Deviation band derived from percent deviation of projected vs. race
/// elevation. The thresholds are fixed, not user-configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviationBand {
    /// Within ±10% of the race target
    OnTarget,
    /// More than 10% and up to 20% off
    Caution,
    /// More than 20% off
    OffTarget,
}

impl DeviationBand {
    /// Classify a percent deviation by magnitude.
    ///
    /// # Example
    /// ```
    /// use route_compare::projection::DeviationBand;
    ///
    /// assert_eq!(DeviationBand::classify(-8.0), DeviationBand::OnTarget);
    /// assert_eq!(DeviationBand::classify(17.6), DeviationBand::Caution);
    /// assert_eq!(DeviationBand::classify(25.0), DeviationBand::OffTarget);
    /// ```
    pub fn classify(percent_off: f64) -> Self {
        let magnitude = percent_off.abs();
        if magnitude <= 10.0 {
            DeviationBand::OnTarget
        } else if magnitude <= 20.0 {
            DeviationBand::Caution
        } else {
            DeviationBand::OffTarget
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviationBand::OnTarget => "on target",
            DeviationBand::Caution => "caution",
            DeviationBand::OffTarget => "off target",
        }
    }
}

/// One projected elevation metric (gain or loss) with its deviation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedMetric {
    /// Elevation in meters the route would have at the race's distance
    pub projected_m: f64,
    /// Signed percent deviation from the race's metric
    pub percent_off: f64,
    /// Band classification of the deviation magnitude
    pub band: DeviationBand,
}

impl ProjectedMetric {
    fn compute(actual_m: Option<f64>, route_km: f64, race_km: f64, race_metric_m: f64) -> Self {
        let actual = actual_m.unwrap_or(0.0);
        let projected_m = actual / route_km * race_km;
        let percent_off = if race_metric_m > 0.0 {
            (projected_m - race_metric_m) / race_metric_m * 100.0
        } else {
            0.0
        };

        Self {
            projected_m,
            percent_off,
            band: DeviationBand::classify(percent_off),
        }
    }

    /// Badge text for this metric: `@ race: 2000 m (+18%)`.
    pub fn badge(&self) -> String {
        format!(
            "@ race: {} m ({})",
            self.projected_m.round() as i64,
            format_percent(self.percent_off)
        )
    }
}

/// Projected gain and loss for a route at a race's distance.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub gain: ProjectedMetric,
    pub loss: ProjectedMetric,
}

/// Project a route's elevation to a race's distance.
///
/// Returns `None` when the route is incomplete or the race distance is
/// zero; absent elevation values are treated as 0.
///
/// # Example
/// ```
/// use route_compare::{Race, RaceOrigin, Route};
/// use route_compare::projection::{project, DeviationBand};
///
/// let route = Route {
///     distance_km: Some(50.0),
///     elevation_gain_m: Some(1000.0),
///     ..Route::default()
/// };
/// let race = Race {
///     id: "1".to_string(),
///     name: "Mozart 100".to_string(),
///     distance_km: 100.0,
///     elevation_gain_m: 1700.0,
///     elevation_loss_m: 1700.0,
///     created_at: 0,
///     origin: RaceOrigin::ManualEntry,
/// };
///
/// let projection = project(&route, &race).unwrap();
/// assert_eq!(projection.gain.projected_m, 2000.0);
/// assert_eq!(projection.gain.band, DeviationBand::Caution);
/// ```
pub fn project(route: &Route, race: &Race) -> Option<Projection> {
    if !route.is_complete() || race.distance_km == 0.0 {
        return None;
    }
    let route_km = route.distance_km?;

    Some(Projection {
        gain: ProjectedMetric::compute(
            route.elevation_gain_m,
            route_km,
            race.distance_km,
            race.elevation_gain_m,
        ),
        loss: ProjectedMetric::compute(
            route.elevation_loss_m,
            route_km,
            race.distance_km,
            race.elevation_loss_m,
        ),
    })
}

/// Format a percentage rounded to the nearest integer, with an explicit
/// leading sign for non-negative values: `+18%`, `-5%`.
pub fn format_percent(percent: f64) -> String {
    let rounded = percent.round() as i64;
    if percent >= 0.0 {
        format!("+{}%", rounded)
    } else {
        format!("{}%", rounded)
    }
}

/// The two comparison metrics tracked per route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Gain,
    Loss,
}

/// Cache of the last rendered comparison string per metric.
///
/// Re-extraction runs frequently (debounce plus poll backstop), and most
/// passes produce output textually identical to what is already on
/// screen. Consumers submit each freshly rendered string and only
/// re-render when it differs from the cached one, which keeps the display
/// from flickering.
#[derive(Debug, Clone, Default)]
pub struct RenderCache {
    gain: String,
    loss: String,
}

impl RenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a freshly rendered string for a metric. Returns `true` when
    /// the string differs from the last submission (the consumer must
    /// re-render), `false` when it is identical.
    pub fn submit(&mut self, metric: Metric, rendered: &str) -> bool {
        let slot = match metric {
            Metric::Gain => &mut self.gain,
            Metric::Loss => &mut self.loss,
        };
        if slot == rendered {
            return false;
        }
        *slot = rendered.to_string();
        true
    }

    /// Forget all cached strings, forcing the next submissions to render.
    pub fn clear(&mut self) {
        self.gain.clear();
        self.loss.clear();
    }
}
