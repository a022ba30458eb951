//! Configuration loading from TOML files
//!
//! One config file serves all three binaries; each reads the sections it
//! needs. Zone definitions are validated here and are immutable after
//! load - a malformed zone (polygon with fewer than 3 points, missing or
//! ambiguous region) is fatal at startup, never tolerated at run time.

use crate::domain::geometry::{Point, Region, ZoneDefinition};
use anyhow::{bail, Context};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_relay_port")]
    pub port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_relay_port() -> u16 {
    12345
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), port: default_relay_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_relay_addr")]
    pub relay_addr: String,
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,
    #[serde(default = "default_reconnect_min_ms")]
    pub reconnect_min_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

fn default_relay_addr() -> String {
    "127.0.0.1:12345".to_string()
}

fn default_dial_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_min_ms() -> u64 {
    500
}

fn default_reconnect_max_ms() -> u64 {
    10_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_addr: default_relay_addr(),
            dial_timeout_ms: default_dial_timeout_ms(),
            reconnect_min_ms: default_reconnect_min_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_enabled")]
    pub enabled: bool,
    #[serde(default = "default_feed_port")]
    pub port: u16,
}

fn default_feed_enabled() -> bool {
    true
}

fn default_feed_port() -> u16 {
    25900
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { enabled: default_feed_enabled(), port: default_feed_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OccupancyConfig {
    #[serde(default = "default_dwell_ms")]
    pub dwell_ms: u64,
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
    /// How often the current vector is resent even without a change
    #[serde(default = "default_republish_interval_ms")]
    pub republish_interval_ms: u64,
}

fn default_dwell_ms() -> u64 {
    2000
}

fn default_grace_ms() -> u64 {
    5000
}

fn default_republish_interval_ms() -> u64 {
    1000
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self {
            dwell_ms: default_dwell_ms(),
            grace_ms: default_grace_ms(),
            republish_interval_ms: default_republish_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Log,
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// Zone of interest for this actuator
    #[serde(default = "default_render_zone")]
    pub zone: String,
    /// Render tick period; the output toggles once per tick while occupied
    #[serde(default = "default_toggle_interval_ms")]
    pub toggle_interval_ms: u64,
    /// Force output off when no message has arrived for this long
    /// (0 disables the check)
    #[serde(default = "default_staleness_timeout_ms")]
    pub staleness_timeout_ms: u64,
    #[serde(default = "default_output_mode")]
    pub output: OutputMode,
    #[serde(default)]
    pub output_file: Option<String>,
}

fn default_render_zone() -> String {
    "a".to_string()
}

fn default_toggle_interval_ms() -> u64 {
    167 // ~3 Hz
}

fn default_staleness_timeout_ms() -> u64 {
    30_000
}

fn default_output_mode() -> OutputMode {
    OutputMode::Log
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            zone: default_render_zone(),
            toggle_interval_ms: default_toggle_interval_ms(),
            staleness_timeout_ms: default_staleness_timeout_ms(),
            output: default_output_mode(),
            output_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

fn default_metrics_interval_secs() -> u64 {
    10
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

/// One zone as written in TOML: a name plus exactly one region shape
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneToml {
    pub name: String,
    #[serde(default)]
    pub polygon: Option<Vec<[f64; 2]>>,
    #[serde(default)]
    pub rect: Option<[[f64; 2]; 2]>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub occupancy: OccupancyConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub zones: Vec<ZoneToml>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    relay_bind_address: String,
    relay_port: u16,
    relay_addr: String,
    dial_timeout_ms: u64,
    reconnect_min_ms: u64,
    reconnect_max_ms: u64,
    feed_enabled: bool,
    feed_port: u16,
    dwell_ms: u64,
    grace_ms: u64,
    republish_interval_ms: u64,
    render_zone: String,
    toggle_interval_ms: u64,
    staleness_timeout_ms: u64,
    output_mode: OutputMode,
    output_file: Option<String>,
    metrics_interval_secs: u64,
    zones: Vec<ZoneDefinition>,
    config_file: String,
}

impl Config {
    /// Load configuration from a TOML file, validating zone definitions
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let zones = build_zones(&toml_config.zones)?;

        if toml_config.render.output == OutputMode::File
            && toml_config.render.output_file.is_none()
        {
            bail!("render.output = \"file\" requires render.output_file");
        }

        Ok(Self {
            relay_bind_address: toml_config.relay.bind_address,
            relay_port: toml_config.relay.port,
            relay_addr: toml_config.client.relay_addr,
            dial_timeout_ms: toml_config.client.dial_timeout_ms,
            reconnect_min_ms: toml_config.client.reconnect_min_ms,
            reconnect_max_ms: toml_config.client.reconnect_max_ms,
            feed_enabled: toml_config.feed.enabled,
            feed_port: toml_config.feed.port,
            dwell_ms: toml_config.occupancy.dwell_ms,
            grace_ms: toml_config.occupancy.grace_ms,
            republish_interval_ms: toml_config.occupancy.republish_interval_ms,
            render_zone: toml_config.render.zone,
            toggle_interval_ms: toml_config.render.toggle_interval_ms,
            staleness_timeout_ms: toml_config.render.staleness_timeout_ms,
            output_mode: toml_config.render.output,
            output_file: toml_config.render.output_file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            zones,
            config_file: path.display().to_string(),
        })
    }

    pub fn relay_bind_addr(&self) -> String {
        format!("{}:{}", self.relay_bind_address, self.relay_port)
    }

    pub fn relay_addr(&self) -> &str {
        &self.relay_addr
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn reconnect_min(&self) -> Duration {
        Duration::from_millis(self.reconnect_min_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    pub fn feed_enabled(&self) -> bool {
        self.feed_enabled
    }

    pub fn feed_port(&self) -> u16 {
        self.feed_port
    }

    pub fn dwell_threshold(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    pub fn grace_threshold(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn republish_interval(&self) -> Duration {
        Duration::from_millis(self.republish_interval_ms)
    }

    pub fn render_zone(&self) -> &str {
        &self.render_zone
    }

    pub fn toggle_interval(&self) -> Duration {
        Duration::from_millis(self.toggle_interval_ms)
    }

    /// None when the staleness check is disabled
    pub fn staleness_timeout(&self) -> Option<Duration> {
        (self.staleness_timeout_ms > 0).then(|| Duration::from_millis(self.staleness_timeout_ms))
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    pub fn output_file(&self) -> Option<&str> {
        self.output_file.as_deref()
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn zones(&self) -> &[ZoneDefinition] {
        &self.zones
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}

fn build_zones(zones: &[ZoneToml]) -> anyhow::Result<Vec<ZoneDefinition>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(zones.len());

    for zone in zones {
        if zone.name.is_empty() {
            bail!("zone with empty name");
        }
        if !seen.insert(zone.name.clone()) {
            bail!("duplicate zone name {:?}", zone.name);
        }

        let region = match (&zone.polygon, &zone.rect) {
            (Some(points), None) => {
                if points.len() < 3 {
                    bail!(
                        "zone {:?}: polygon needs at least 3 points, got {}",
                        zone.name,
                        points.len()
                    );
                }
                Region::Polygon(points.iter().map(|&p| Point::from(p)).collect())
            }
            (None, Some([a, b])) => Region::rect(Point::from(*a), Point::from(*b)),
            (Some(_), Some(_)) => {
                bail!("zone {:?}: specify polygon or rect, not both", zone.name)
            }
            (None, None) => bail!("zone {:?}: missing polygon or rect", zone.name),
        };

        out.push(ZoneDefinition::new(zone.name.clone(), region));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(name: &str, polygon: Option<Vec<[f64; 2]>>, rect: Option<[[f64; 2]; 2]>) -> ZoneToml {
        ZoneToml { name: name.to_string(), polygon, rect }
    }

    #[test]
    fn test_build_zones_polygon_and_rect() {
        let zones = build_zones(&[
            zone("a", Some(vec![[0.0, 0.0], [10.0, 0.0], [5.0, 10.0]]), None),
            zone("b", None, Some([[10.0, 10.0], [0.0, 0.0]])),
        ])
        .unwrap();

        assert_eq!(zones.len(), 2);
        assert!(matches!(zones[0].region, Region::Polygon(_)));
        assert!(zones[1].region.contains(Point::new(5.0, 5.0)));
    }

    #[test]
    fn test_build_zones_rejects_short_polygon() {
        let err = build_zones(&[zone("a", Some(vec![[0.0, 0.0], [1.0, 1.0]]), None)])
            .unwrap_err();
        assert!(err.to_string().contains("at least 3 points"));
    }

    #[test]
    fn test_build_zones_rejects_duplicates_and_missing_region() {
        assert!(build_zones(&[
            zone("a", None, Some([[0.0, 0.0], [1.0, 1.0]])),
            zone("a", None, Some([[0.0, 0.0], [1.0, 1.0]])),
        ])
        .is_err());
        assert!(build_zones(&[zone("a", None, None)]).is_err());
    }
}
