use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

pub const WHITE_HEX: &str = "#FFFFFF";

pub const AA_NORMAL: f64 = 4.5;
pub const AAA_NORMAL: f64 = 7.0;
pub const AA_LARGE: f64 = 3.0;
pub const AAA_LARGE: f64 = 4.5;

const LARGE_TEXT_PX: f64 = 24.0;
const LARGE_BOLD_TEXT_PX: f64 = 18.66;
const BOLD_WEIGHT: u32 = 700;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContrastResult {
    pub ratio: f64,
    pub passes_aa: bool,
    pub passes_aaa: bool,
    pub passes_aa_large: bool,
    pub passes_aaa_large: bool,
    pub foreground: String,
    pub background: String,
}

impl ContrastResult {
    pub fn from_ratio(ratio: f64, foreground: String, background: String) -> Self {
        Self {
            ratio,
            passes_aa: ratio >= AA_NORMAL,
            passes_aaa: ratio >= AAA_NORMAL,
            passes_aa_large: ratio >= AA_LARGE,
            passes_aaa_large: ratio >= AAA_LARGE,
            foreground,
            background,
        }
    }

    /// AA/AAA verdicts for the text size actually rendered.
    pub fn verdict(&self, large_text: bool) -> (bool, bool) {
        if large_text {
            (self.passes_aa_large, self.passes_aaa_large)
        } else {
            (self.passes_aa, self.passes_aaa)
        }
    }
}

fn numeric_component_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d*\.?\d+").expect("numeric component pattern"))
}

pub fn decimal_to_hex_byte(n: u8) -> String {
    format!("{n:02X}")
}

fn channel_from_component(raw: f64) -> u8 {
    raw.round().clamp(0.0, 255.0) as u8
}

/// Converts a computed `rgb()`/`rgba()` value into `#RRGGBB`.
///
/// Anything that does not yield three numeric components becomes white, as
/// does a fully transparent color: a transparent swatch cannot be shown.
pub fn parse_rgb_function_to_hex(css: &str) -> String {
    let trimmed = css.trim();
    if let Some(hex) = trimmed.strip_prefix('#') {
        if let Some(normalized) = normalize_hex(hex) {
            return normalized;
        }
    }

    let components: Vec<f64> = numeric_component_re()
        .find_iter(trimmed)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect();
    if components.len() < 3 {
        tracing::debug!(value = css, "color has fewer than 3 components; using white");
        return WHITE_HEX.to_string();
    }

    if let Some(alpha) = components.get(3) {
        if *alpha <= 0.0 {
            tracing::debug!(value = css, "fully transparent color; using white");
            return WHITE_HEX.to_string();
        }
    }

    let r = channel_from_component(components[0]);
    let g = channel_from_component(components[1]);
    let b = channel_from_component(components[2]);
    format!(
        "#{}{}{}",
        decimal_to_hex_byte(r),
        decimal_to_hex_byte(g),
        decimal_to_hex_byte(b)
    )
}

fn normalize_hex(hex: &str) -> Option<String> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        3 => {
            let mut out = String::from("#");
            for ch in hex.chars() {
                out.push(ch.to_ascii_uppercase());
                out.push(ch.to_ascii_uppercase());
            }
            Some(out)
        }
        6 => Some(format!("#{}", hex.to_ascii_uppercase())),
        8 => {
            if &hex[6..8] == "00" {
                Some(WHITE_HEX.to_string())
            } else {
                Some(format!("#{}", hex[0..6].to_ascii_uppercase()))
            }
        }
        _ => None,
    }
}

fn linearize(channel: f64) -> f64 {
    if channel <= 0.03928 {
        channel / 12.92
    } else {
        ((channel + 0.055) / 1.055).powf(2.4)
    }
}

/// WCAG relative luminance of a 3- or 6-digit hex color. `None` marks an
/// invalid color.
pub fn relative_luminance(hex: &str) -> Option<f64> {
    let hex = hex.trim();
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    let (r, g, b) = match hex.len() {
        3 => {
            let mut parts = hex.chars().map(|c| format!("{c}{c}"));
            (parts.next()?, parts.next()?, parts.next()?)
        }
        6 => (
            hex.get(0..2)?.to_string(),
            hex.get(2..4)?.to_string(),
            hex.get(4..6)?.to_string(),
        ),
        _ => return None,
    };

    let mut linear = [0.0f64; 3];
    for (slot, raw) in linear.iter_mut().zip([r, g, b]) {
        let value = u8::from_str_radix(&raw, 16).ok()?;
        *slot = linearize(f64::from(value) / 255.0);
    }
    Some(0.2126 * linear[0] + 0.7152 * linear[1] + 0.0722 * linear[2])
}

pub fn contrast_ratio(l1: f64, l2: f64) -> f64 {
    let lighter = l1.max(l2);
    let darker = l1.min(l2);
    (lighter + 0.05) / (darker + 0.05)
}

/// Ratio cut to two decimals so the shown value never rounds up past a
/// threshold it fails.
pub fn truncate_ratio(ratio: f64) -> f64 {
    (ratio * 100.0).floor() / 100.0
}

pub fn format_ratio(ratio: f64) -> String {
    format!("{:.2}:1", truncate_ratio(ratio))
}

pub fn evaluate_contrast(foreground_css: &str, background_css: &str) -> Option<ContrastResult> {
    let fg = parse_rgb_function_to_hex(foreground_css);
    let bg = parse_rgb_function_to_hex(background_css);
    let Some(fg_lum) = relative_luminance(&fg) else {
        tracing::warn!(color = %fg, "invalid foreground luminance");
        return None;
    };
    let Some(bg_lum) = relative_luminance(&bg) else {
        tracing::warn!(color = %bg, "invalid background luminance");
        return None;
    };
    Some(ContrastResult::from_ratio(
        contrast_ratio(fg_lum, bg_lum),
        fg,
        bg,
    ))
}

pub fn is_large_text(font_size_px: f64, font_weight: u32) -> bool {
    font_size_px >= LARGE_TEXT_PX
        || (font_size_px >= LARGE_BOLD_TEXT_PX && font_weight >= BOLD_WEIGHT)
}

/// Computed `font-weight` is numeric in practice, keywords are accepted too.
pub fn parse_font_weight(raw: &str) -> u32 {
    match raw.trim().to_ascii_lowercase().as_str() {
        "bold" | "bolder" => 700,
        "normal" | "lighter" | "" => 400,
        other => other.parse::<f64>().map(|v| v.round() as u32).unwrap_or(400),
    }
}
