//! Tunable parameters.
//!
//! Everything is optional. Hosts hand over JSON that may be partial, stale or
//! hand-written, so [`VizConfig::from_json_lenient`] takes each known key on its
//! own and falls back to the default for anything it cannot use. The demo
//! binary layers `NETWEAVE_*` variables and `--flag value` arguments on top
//! through [`VizConfig::set`].

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::choreography::{ChoreographyParams, MAX_SOURCES};
use crate::palette::ColorOverrides;

pub const DEFAULT_LAYER_SIZES: [usize; 5] = [5, 10, 15, 10, 5];
pub const MAX_LAYER_SIZE: usize = 64;
pub const DEFAULT_GLOW: f32 = 0.8;
pub const MAX_GLOW: f32 = 2.0;
pub const MIN_SPEED: f32 = 0.1;
pub const MAX_SPEED: f32 = 10.0;
pub const DEFAULT_RESIZE_DEBOUNCE_MS: u64 = 150;
pub const MAX_RESIZE_DEBOUNCE_MS: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct VizConfig {
    pub layer_sizes: Vec<usize>,
    pub glow_intensity: f32,
    pub animation_speed: f32,
    pub colors: ColorOverrides,
    /// Skip the GPU probe entirely.
    pub force_raster: bool,
    pub training: bool,
    pub sources_min: usize,
    pub sources_max: usize,
    pub resize_debounce_ms: u64,
    /// Fixed seed for reproducible layouts; the clock is used otherwise.
    pub seed: Option<u64>,
}

impl Default for VizConfig {
    fn default() -> Self {
        Self {
            layer_sizes: DEFAULT_LAYER_SIZES.to_vec(),
            glow_intensity: DEFAULT_GLOW,
            animation_speed: 1.0,
            colors: ColorOverrides::default(),
            force_raster: false,
            training: true,
            sources_min: 2,
            sources_max: 4,
            resize_debounce_ms: DEFAULT_RESIZE_DEBOUNCE_MS,
            seed: None,
        }
    }
}

fn finite_or(v: f32, default: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        default
    }
}

fn parse_layers(s: &str) -> Option<Vec<usize>> {
    s.split(',')
        .map(|part| part.trim().parse::<usize>().ok())
        .collect()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl VizConfig {
    /// Clamp every field into its documented range.
    pub fn sanitized(mut self) -> Self {
        self.layer_sizes = self
            .layer_sizes
            .into_iter()
            .filter(|&n| n > 0)
            .map(|n| n.min(MAX_LAYER_SIZE))
            .collect();
        self.glow_intensity = finite_or(self.glow_intensity, DEFAULT_GLOW).clamp(0.0, MAX_GLOW);
        self.animation_speed = finite_or(self.animation_speed, 1.0).clamp(MIN_SPEED, MAX_SPEED);
        self.sources_min = self.sources_min.clamp(1, MAX_SOURCES);
        self.sources_max = self.sources_max.clamp(self.sources_min, MAX_SOURCES);
        self.resize_debounce_ms = self.resize_debounce_ms.min(MAX_RESIZE_DEBOUNCE_MS);
        self
    }

    pub fn choreography_params(&self) -> ChoreographyParams {
        ChoreographyParams {
            speed: self.animation_speed,
            training: self.training,
            sources_min: self.sources_min,
            sources_max: self.sources_max,
        }
    }

    /// Parse JSON, keeping defaults for unknown keys and badly typed values.
    ///
    /// Only malformed JSON is an error.
    pub fn from_json_lenient(json: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(json)?;
        Ok(Self::from_value_lenient(&value))
    }

    pub fn from_value_lenient(value: &Value) -> Self {
        let mut cfg = Self::default();
        let Some(map) = value.as_object() else {
            tracing::debug!("config is not an object; using defaults");
            return cfg;
        };

        for (key, v) in map {
            let ok = match key.as_str() {
                "layer_sizes" => match v.as_array() {
                    Some(items) => {
                        let sizes: Option<Vec<usize>> =
                            items.iter().map(|x| x.as_u64().map(|n| n as usize)).collect();
                        sizes.map(|s| cfg.layer_sizes = s).is_some()
                    }
                    None => false,
                },
                "glow_intensity" => v.as_f64().map(|x| cfg.glow_intensity = x as f32).is_some(),
                "animation_speed" => v.as_f64().map(|x| cfg.animation_speed = x as f32).is_some(),
                "force_raster" => v.as_bool().map(|b| cfg.force_raster = b).is_some(),
                "training" => v.as_bool().map(|b| cfg.training = b).is_some(),
                "sources_min" => v.as_u64().map(|n| cfg.sources_min = n as usize).is_some(),
                "sources_max" => v.as_u64().map(|n| cfg.sources_max = n as usize).is_some(),
                "resize_debounce_ms" => v.as_u64().map(|n| cfg.resize_debounce_ms = n).is_some(),
                "seed" => {
                    if v.is_null() {
                        cfg.seed = None;
                        true
                    } else {
                        v.as_u64().map(|n| cfg.seed = Some(n)).is_some()
                    }
                }
                "colors" => match v.as_object() {
                    Some(colors) => {
                        let pick = |name: &str| {
                            colors.get(name).and_then(Value::as_str).map(str::to_owned)
                        };
                        cfg.colors = ColorOverrides {
                            node: pick("node"),
                            signal: pick("signal"),
                            particle: pick("particle"),
                            connection: pick("connection"),
                        };
                        true
                    }
                    None => false,
                },
                _ => {
                    tracing::debug!(key = %key, "ignoring unknown config key");
                    continue;
                }
            };
            if !ok {
                tracing::debug!(key = %key, value = %v, "ignoring config value of the wrong type");
            }
        }
        cfg
    }

    /// Read a JSON file leniently.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_lenient(&text)
    }

    /// Set one field from its flag name (`glow`, `layers`, ...).
    ///
    /// Returns `false` for names this type does not own. Unparsable values
    /// leave the field unchanged.
    pub fn set(&mut self, name: &str, value: &str) -> bool {
        let parsed = match name {
            "layers" => parse_layers(value).map(|s| self.layer_sizes = s).is_some(),
            "glow" => value.parse::<f32>().ok().map(|x| self.glow_intensity = x).is_some(),
            "speed" => value.parse::<f32>().ok().map(|x| self.animation_speed = x).is_some(),
            "force-raster" => parse_bool(value).map(|b| self.force_raster = b).is_some(),
            "training" => parse_bool(value).map(|b| self.training = b).is_some(),
            "sources-min" => value.parse().ok().map(|n| self.sources_min = n).is_some(),
            "sources-max" => value.parse().ok().map(|n| self.sources_max = n).is_some(),
            "debounce-ms" => value.parse().ok().map(|n| self.resize_debounce_ms = n).is_some(),
            "seed" => value.parse().ok().map(|n| self.seed = Some(n)).is_some(),
            "node-color" => {
                self.colors.node = Some(value.to_owned());
                true
            }
            "signal-color" => {
                self.colors.signal = Some(value.to_owned());
                true
            }
            "particle-color" => {
                self.colors.particle = Some(value.to_owned());
                true
            }
            "connection-color" => {
                self.colors.connection = Some(value.to_owned());
                true
            }
            _ => return false,
        };
        if !parsed {
            tracing::debug!(name, value, "ignoring unparsable setting");
        }
        true
    }

    /// Names accepted by [`VizConfig::set`], as flags and env suffixes.
    pub const SETTINGS: [&'static str; 13] = [
        "layers",
        "glow",
        "speed",
        "force-raster",
        "training",
        "sources-min",
        "sources-max",
        "debounce-ms",
        "seed",
        "node-color",
        "signal-color",
        "particle-color",
        "connection-color",
    ];

    /// Apply `NETWEAVE_<NAME>` variables (e.g. `NETWEAVE_FORCE_RASTER=1`).
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for name in Self::SETTINGS {
            let var = format!("NETWEAVE_{}", name.replace('-', "_").to_ascii_uppercase());
            if let Some(v) = lookup(&var) {
                self.set(name, &v);
            }
        }
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|k| std::env::var(k).ok());
    }
}
