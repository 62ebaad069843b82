use std::env;
use std::time::Duration;

use geometry::{GeoPoint, LocalProjection};
use positions::SequencerConfig;

const PUSH_FEED_URL: &str = "wss://mobile.at.govt.nz/streaming/realtime/locations";
const PULL_FEED_URL: &str = "https://api.at.govt.nz/realtime/legacy/vehiclelocations";

#[derive(Debug, Clone)]
pub struct Config {
    pub push_url: String,
    pub pull_url: String,
    pub subscription_key: Option<String>,
    pub greeting: Option<String>,
    pub pull_enabled: bool,
    pub pull_interval: Duration,
    pub transport: transport::Options,
    pub upgrade_retry_delay: Duration,
    pub sequencer: SequencerConfig,
    pub projection_center: GeoPoint,
    pub projection_radius: f64,
    pub sweep_interval: Duration,
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source, falling back to defaults for
    /// absent or unparsable values.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let vars = Vars(lookup);
        let state_ttl = Duration::from_secs(vars.u64("STATE_TTL_SECS", 120));

        Self {
            push_url: vars.string("PUSH_FEED_URL", PUSH_FEED_URL),
            pull_url: vars.string("PULL_FEED_URL", PULL_FEED_URL),
            subscription_key: vars.get("FEED_SUBSCRIPTION_KEY"),
            greeting: vars.get("PUSH_FEED_GREETING"),
            pull_enabled: vars.bool("PULL_ENABLED", true),
            pull_interval: Duration::from_secs(vars.u64("PULL_INTERVAL_SECS", 15).max(1)),
            transport: transport::Options {
                stall_threshold: Duration::from_millis(
                    vars.u64("STALL_THRESHOLD_MS", 2_000).max(2),
                ),
                restart_delay: Duration::from_millis(vars.u64("RESTART_DELAY_MS", 500)),
                ..transport::Options::default()
            },
            upgrade_retry_delay: Duration::from_millis(vars.u64("UPGRADE_RETRY_DELAY_MS", 5_000)),
            sequencer: SequencerConfig { state_ttl, stale_after: state_ttl },
            projection_center: GeoPoint::new(
                vars.f64("PROJECTION_CENTER_LAT", -36.8485),
                vars.f64("PROJECTION_CENTER_LNG", 174.7633),
            ),
            projection_radius: vars.f64("PROJECTION_RADIUS_M", 50_000.0),
            sweep_interval: Duration::from_secs(vars.u64("SWEEP_INTERVAL_SECS", 10).max(1)),
        }
    }

    /// Push feed URL including the subscription key.
    #[must_use]
    pub fn push_feed_url(&self) -> String {
        self.keyed(&self.push_url)
    }

    /// Pull feed URL including the subscription key.
    #[must_use]
    pub fn pull_feed_url(&self) -> String {
        self.keyed(&self.pull_url)
    }

    /// Local projection for building route shapes.
    ///
    /// # Errors
    ///
    /// Returns an error when the configured radius is not positive.
    pub fn projection(&self) -> geometry::Result<LocalProjection> {
        LocalProjection::new(self.projection_center, self.projection_radius)
    }

    fn keyed(&self, url: &str) -> String {
        let Some(key) = &self.subscription_key else {
            return url.to_string();
        };
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{url}{separator}subscription_key={}", urlencoding::encode(key))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn u64(&self, key: &str, default: u64) -> u64 {
        self.get(key).and_then(|value| value.trim().parse().ok()).unwrap_or(default)
    }

    fn f64(&self, key: &str, default: f64) -> f64 {
        self.get(key)
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .unwrap_or(default)
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(default)
    }
}
