use crate::color::{parse_rgb_function_to_hex, relative_luminance};
use crate::dimension::{standard_pixel_pitch_mm, DimensionError, MonitorSize, Resolution};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::io::{self, Read};

pub const DEFAULT_MONITOR_INCHES: f64 = 17.0;
pub const DEFAULT_RESOLUTION: &str = "1366x768";
pub const DEFAULT_OUTLINE_COLOR: &str = "#FF0000";
pub const DEFAULT_OUTLINE_WIDTH_PX: f64 = 2.0;
pub const DEFAULT_PAUSE_KEY: &str = "Escape";

pub const SETTINGS_HELP: &str = r##"Settings JSON (all keys optional):
{
  "monitorInches": 17,
  "referenceResolution": "1366x768",
  "contrastDisplay": "0",
  "boxModelDisplay": "1",
  "interactionMode": "0",
  "backgroundTint": false,
  "outlineStyle": "dashed",
  "outlineColorHex": "#FF0000",
  "outlineWidthPx": 2,
  "pauseKey": "Escape"
}

Notes:
- interactionMode: "0" normal, "1" link-only, "2" or "tracking" tracking.
- monitorInches/referenceResolution are validated strictly; bad values abort.
- everything else falls back to its default with a warning.
"##;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionMode {
    Normal,
    LinkOnly,
    Tracking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlineStyle {
    Solid,
    Dashed,
    Dotted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outline {
    pub width_px: f64,
    pub color_hex: String,
    pub style: OutlineStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectorOptions {
    pub contrast_display: bool,
    pub box_model_display: bool,
    pub monitor: MonitorSize,
    pub resolution: Resolution,
    /// Millimetres per CSS pixel, derived from monitor and resolution.
    pub pixel_pitch_mm: f64,
    pub interaction_mode: InteractionMode,
    pub outline: Outline,
    pub background_tint: bool,
    pub pause_key: String,
}

impl InspectorOptions {
    pub fn from_settings(settings: &Map<String, Value>) -> Result<Self, DimensionError> {
        let monitor = match settings.get("monitorInches") {
            None | Some(Value::Null) => MonitorSize::new(DEFAULT_MONITOR_INCHES)?,
            Some(value) => MonitorSize::new(value_to_f64(Some(value)).unwrap_or(f64::NAN))?,
        };
        let resolution = match value_to_string(settings.get("referenceResolution")) {
            None => Resolution::parse(DEFAULT_RESOLUTION)?,
            Some(raw) => Resolution::parse(&raw)?,
        };
        let pixel_pitch_mm = standard_pixel_pitch_mm(resolution, monitor)?;

        Ok(Self {
            contrast_display: flag(settings, "contrastDisplay", false),
            box_model_display: flag(settings, "boxModelDisplay", true),
            monitor,
            resolution,
            pixel_pitch_mm,
            interaction_mode: interaction_mode(settings.get("interactionMode")),
            outline: Outline {
                width_px: outline_width(settings.get("outlineWidthPx")),
                color_hex: outline_color(settings.get("outlineColorHex")),
                style: outline_style(settings.get("outlineStyle")),
            },
            background_tint: flag(settings, "backgroundTint", false),
            pause_key: value_to_string(settings.get("pauseKey"))
                .unwrap_or_else(|| DEFAULT_PAUSE_KEY.to_string()),
        })
    }
}

fn flag(settings: &Map<String, Value>, key: &str, default_value: bool) -> bool {
    settings
        .get(key)
        .map(|v| value_to_bool(v, default_value))
        .unwrap_or(default_value)
}

fn interaction_mode(value: Option<&Value>) -> InteractionMode {
    let Some(value) = value else {
        return InteractionMode::Normal;
    };
    if let Value::Bool(tracking) = value {
        return if *tracking {
            InteractionMode::Tracking
        } else {
            InteractionMode::Normal
        };
    }
    match value_to_string(Some(value))
        .unwrap_or_default()
        .to_ascii_lowercase()
        .as_str()
    {
        "0" | "normal" | "" => InteractionMode::Normal,
        "1" | "link" | "link-only" | "linkonly" => InteractionMode::LinkOnly,
        "2" | "tracking" | "track" => InteractionMode::Tracking,
        other => {
            tracing::warn!(value = other, "unknown interactionMode; using normal");
            InteractionMode::Normal
        }
    }
}

fn outline_style(value: Option<&Value>) -> OutlineStyle {
    match value_to_string(value)
        .map(|s| s.to_ascii_lowercase())
        .as_deref()
    {
        None | Some("dashed") => OutlineStyle::Dashed,
        Some("solid") => OutlineStyle::Solid,
        Some("dotted") => OutlineStyle::Dotted,
        Some(other) => {
            tracing::warn!(value = other, "unknown outlineStyle; using dashed");
            OutlineStyle::Dashed
        }
    }
}

fn outline_color(value: Option<&Value>) -> String {
    let Some(raw) = value_to_string(value) else {
        return DEFAULT_OUTLINE_COLOR.to_string();
    };
    let bare = raw.trim_start_matches('#');
    if relative_luminance(bare).is_some() {
        return parse_rgb_function_to_hex(&format!("#{bare}"));
    }
    tracing::warn!(value = %raw, "invalid outlineColorHex; using default");
    DEFAULT_OUTLINE_COLOR.to_string()
}

fn outline_width(value: Option<&Value>) -> f64 {
    match value_to_f64(value) {
        Some(v) if v.is_finite() && v > 0.0 => v,
        None => DEFAULT_OUTLINE_WIDTH_PX,
        Some(v) => {
            tracing::warn!(value = v, "invalid outlineWidthPx; using default");
            DEFAULT_OUTLINE_WIDTH_PX
        }
    }
}

pub fn value_to_bool(value: &Value, default_value: bool) -> bool {
    match value {
        Value::Bool(v) => *v,
        Value::Number(n) => n.as_i64().map(|v| v != 0).unwrap_or(default_value),
        Value::String(s) => {
            let key = s.trim().to_ascii_lowercase();
            if matches!(key.as_str(), "1" | "true" | "yes" | "on") {
                true
            } else if matches!(key.as_str(), "0" | "false" | "no" | "off") {
                false
            } else {
                default_value
            }
        }
        _ => default_value,
    }
}

pub fn value_to_f64(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn value_to_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => {
            let v = s.trim();
            if v.is_empty() {
                None
            } else {
                Some(v.to_string())
            }
        }
        Some(v) if !v.is_null() => Some(v.to_string()),
        _ => None,
    }
}

/// Reads a JSON document from a file path, or stdin when `path` is `-`.
pub fn load_json(path: &str) -> Result<Value> {
    let raw = if path == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read JSON from stdin")?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read JSON file: {path}"))?
    };
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON: {path}"))
}

pub fn load_settings(path: Option<&str>) -> Result<Map<String, Value>> {
    let Some(path) = path else {
        return Ok(Map::new());
    };
    match load_json(path)? {
        Value::Object(map) => Ok(map),
        other => bail!("settings must be a JSON object, got {}", json_kind(&other)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
