//! Multi-tier gas price cache with background refresh and oracle failover.
//!
//! The tracker round-robins through its oracle endpoints on a fixed timer,
//! advancing the endpoint index on every tick whether or not the previous
//! tick succeeded. Callers only ever read the cached snapshot; a tick that
//! fails leaves the previous snapshot untouched, and a tick that succeeds
//! replaces the whole tier set in one write, so readers never observe a
//! half-updated snapshot.

use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Refresh cadence for the background task.
pub const GAS_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// Gas price tiers in gwei.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasPriceSnapshot {
    pub fast: f64,
    pub standard: f64,
    pub low: f64,
}

impl GasPriceSnapshot {
    /// Conservative defaults used until the first successful tick.
    pub const SAFE_DEFAULT: Self = Self {
        fast: 20.0,
        standard: 10.0,
        low: 5.0,
    };
}

/// How an oracle's response body maps onto the snapshot tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierFields {
    /// `fast` / `average` / `safeLow` fields, values in gwei x 10.
    Station,
    /// `percentile_90` / `percentile_50` / `percentile_25` fields, in gwei.
    Percentile,
}

/// One gas-price oracle endpoint.
#[derive(Debug, Clone)]
pub struct GasOracleEndpoint {
    pub url: String,
    pub fields: TierFields,
    /// Divisor applied to all parsed values.
    pub scale: f64,
}

impl GasOracleEndpoint {
    pub fn station(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fields: TierFields::Station,
            scale: 10.0,
        }
    }

    pub fn percentile(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fields: TierFields::Percentile,
            scale: 1.0,
        }
    }
}

/// Why a refresh tick was discarded.
#[derive(Debug, Clone, Error)]
pub enum TickError {
    #[error("oracle returned status {0}")]
    Status(u16),
    #[error("unparsable oracle response: {0}")]
    Unparsable(String),
    #[error("missing field {0}")]
    MissingField(&'static str),
    /// A zero `fast` value is a sentinel for "oracle data invalid",
    /// not a real tier-zero price.
    #[error("oracle reported zero fast price")]
    ZeroFast,
}

/// Background-refreshed gas price cache.
pub struct GasPriceTracker {
    client: reqwest::Client,
    endpoints: Vec<GasOracleEndpoint>,
    snapshot: RwLock<GasPriceSnapshot>,
    refresh_interval: Duration,
}

impl GasPriceTracker {
    /// Create a tracker with the default public oracle endpoints.
    pub fn new() -> Self {
        Self::with_endpoints(vec![
            GasOracleEndpoint::station("https://ethgasstation.info/json/ethgasAPI.json"),
            GasOracleEndpoint::percentile("https://gas-oracle.zoltu.io/"),
        ])
    }

    pub fn with_endpoints(endpoints: Vec<GasOracleEndpoint>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
            snapshot: RwLock::new(GasPriceSnapshot::SAFE_DEFAULT),
            refresh_interval: GAS_REFRESH_INTERVAL,
        }
    }

    pub fn with_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    /// Read the current snapshot. Never blocks on a refresh, never errors.
    pub fn snapshot(&self) -> GasPriceSnapshot {
        *self.snapshot.read()
    }

    /// Replace the whole snapshot in one write.
    fn store(&self, snapshot: GasPriceSnapshot) {
        *self.snapshot.write() = snapshot;
    }

    /// Apply one tick outcome: success replaces the snapshot, failure keeps
    /// the previous one.
    fn apply_tick(&self, url: &str, result: Result<GasPriceSnapshot, TickError>) {
        match result {
            Ok(snapshot) => {
                self.store(snapshot);
                debug!(
                    oracle = url,
                    fast = snapshot.fast,
                    standard = snapshot.standard,
                    low = snapshot.low,
                    "Gas price snapshot updated"
                );
            }
            Err(e) => {
                warn!(oracle = url, error = %e, "Gas tick failed, keeping previous snapshot");
            }
        }
    }

    async fn fetch_tiers(&self, endpoint: &GasOracleEndpoint) -> Result<GasPriceSnapshot, TickError> {
        let response = self
            .client
            .get(&endpoint.url)
            .send()
            .await
            .map_err(|e| TickError::Unparsable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TickError::Status(response.status().as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| TickError::Unparsable(e.to_string()))?;

        parse_tiers(endpoint, &body)
    }

    /// Spawn the background refresher. Fire-and-forget: nothing ever awaits
    /// a refresh, and the task runs for the life of the process.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if self.endpoints.is_empty() {
                warn!("No gas oracle endpoints configured, keeping defaults");
                return;
            }
            let mut interval = tokio::time::interval(self.refresh_interval);
            let mut index = 0usize;
            loop {
                interval.tick().await;
                // The index advances unconditionally, failed tick or not.
                index = (index + 1) % self.endpoints.len();
                let endpoint = self.endpoints[index].clone();
                let result = self.fetch_tiers(&endpoint).await;
                self.apply_tick(&endpoint.url, result);
            }
        })
    }
}

impl Default for GasPriceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GasPriceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GasPriceTracker")
            .field("endpoints", &self.endpoints.len())
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// Extract a numeric field, accepting number or numeric string.
fn num_field(body: &Value, name: &'static str) -> Result<f64, TickError> {
    let value = body.get(name).ok_or(TickError::MissingField(name))?;
    match value {
        Value::Number(n) => n.as_f64().ok_or(TickError::MissingField(name)),
        Value::String(s) => s
            .parse()
            .map_err(|_| TickError::Unparsable(format!("field {name} = {s:?}"))),
        _ => Err(TickError::MissingField(name)),
    }
}

/// Parse an oracle response body into a snapshot.
fn parse_tiers(endpoint: &GasOracleEndpoint, body: &Value) -> Result<GasPriceSnapshot, TickError> {
    let (fast_field, standard_field, low_field) = match endpoint.fields {
        TierFields::Station => ("fast", "average", "safeLow"),
        TierFields::Percentile => ("percentile_90", "percentile_50", "percentile_25"),
    };

    let fast = num_field(body, fast_field)?;
    if fast == 0.0 {
        return Err(TickError::ZeroFast);
    }

    let standard = num_field(body, standard_field)?;
    let low = num_field(body, low_field)?;

    Ok(GasPriceSnapshot {
        fast: fast / endpoint.scale,
        standard: standard / endpoint.scale,
        low: low / endpoint.scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn station() -> GasOracleEndpoint {
        GasOracleEndpoint::station("http://example.invalid/gas")
    }

    #[test]
    fn test_parse_station_body() {
        // Station values are gwei x 10
        let body = json!({ "fast": 200.0, "average": 120.0, "safeLow": 80.0 });
        let snapshot = parse_tiers(&station(), &body).unwrap();
        assert_eq!(snapshot.fast, 20.0);
        assert_eq!(snapshot.standard, 12.0);
        assert_eq!(snapshot.low, 8.0);
    }

    #[test]
    fn test_parse_percentile_body() {
        let endpoint = GasOracleEndpoint::percentile("http://example.invalid/oracle");
        let body = json!({
            "percentile_97": "60",
            "percentile_90": "45",
            "percentile_50": "30",
            "percentile_25": "20"
        });
        let snapshot = parse_tiers(&endpoint, &body).unwrap();
        assert_eq!(snapshot.fast, 45.0);
        assert_eq!(snapshot.standard, 30.0);
        assert_eq!(snapshot.low, 20.0);
    }

    #[test]
    fn test_zero_fast_is_invalid() {
        let body = json!({ "fast": 0.0, "average": 120.0, "safeLow": 80.0 });
        let err = parse_tiers(&station(), &body).unwrap_err();
        assert!(matches!(err, TickError::ZeroFast));
    }

    #[test]
    fn test_missing_field_is_invalid() {
        let body = json!({ "fast": 200.0 });
        let err = parse_tiers(&station(), &body).unwrap_err();
        assert!(matches!(err, TickError::MissingField("average")));
    }

    #[test]
    fn test_failed_tick_keeps_previous_snapshot() {
        let tracker = GasPriceTracker::with_endpoints(vec![station()]);

        let updated = GasPriceSnapshot {
            fast: 33.0,
            standard: 22.0,
            low: 11.0,
        };
        tracker.apply_tick("test", Ok(updated));
        assert_eq!(tracker.snapshot(), updated);

        tracker.apply_tick("test", Err(TickError::ZeroFast));
        assert_eq!(tracker.snapshot(), updated);

        tracker.apply_tick("test", Err(TickError::Status(503)));
        assert_eq!(tracker.snapshot(), updated);
    }

    #[test]
    fn test_snapshot_updates_are_atomic() {
        // Writers only ever publish snapshots where all tiers carry the same
        // value; readers must never observe a mix of two generations.
        let tracker = Arc::new(GasPriceTracker::with_endpoints(vec![station()]));
        tracker.apply_tick(
            "test",
            Ok(GasPriceSnapshot {
                fast: 1.0,
                standard: 1.0,
                low: 1.0,
            }),
        );

        let reader = {
            let tracker = Arc::clone(&tracker);
            std::thread::spawn(move || {
                for _ in 0..10_000 {
                    let snap = tracker.snapshot();
                    assert_eq!(snap.fast, snap.standard);
                    assert_eq!(snap.standard, snap.low);
                }
            })
        };

        for i in 1..1_000u32 {
            let v = f64::from(i);
            tracker.apply_tick(
                "test",
                Ok(GasPriceSnapshot {
                    fast: v,
                    standard: v,
                    low: v,
                }),
            );
        }

        reader.join().unwrap();
    }

    #[test]
    fn test_default_snapshot_before_first_tick() {
        let tracker = GasPriceTracker::with_endpoints(vec![station()]);
        assert_eq!(tracker.snapshot(), GasPriceSnapshot::SAFE_DEFAULT);
    }
}
