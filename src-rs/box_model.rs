use crate::color::parse_rgb_function_to_hex;
use crate::dom::StyleSource;
use crate::report::ReportEntry;
use serde::Serialize;

const SIDES: [&str; 4] = ["top", "right", "bottom", "left"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BorderSide {
    pub side: &'static str,
    pub descriptor: String,
    pub style: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BorderReport {
    /// All four sides share width, style and color.
    Collapsed { descriptor: String },
    /// Per-side descriptors; sides styled `none` are hidden.
    Sides { sides: Vec<BorderSide> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxModelReport {
    pub height: Option<String>,
    pub width: Option<String>,
    pub border: BorderReport,
    pub margin: Option<String>,
    pub padding: Option<String>,
    pub min_height: Option<String>,
    pub max_height: Option<String>,
    pub min_width: Option<String>,
    pub max_width: Option<String>,
}

impl BoxModelReport {
    pub fn inspect(style: &dyn StyleSource) -> Self {
        Self {
            height: dimension_value(style.value("height")),
            width: dimension_value(style.value("width")),
            border: consolidate_border(style),
            margin: four_side_shorthand(style, "margin"),
            padding: four_side_shorthand(style, "padding"),
            min_height: non_default(style.value("min-height"), &["0px", "0", "auto"]),
            max_height: non_default(style.value("max-height"), &["none"]),
            min_width: non_default(style.value("min-width"), &["0px", "0", "auto"]),
            max_width: non_default(style.value("max-width"), &["none"]),
        }
    }

    pub fn entries(&self) -> Vec<ReportEntry> {
        let mut entries = vec![
            ReportEntry::optional("height", self.height.as_deref()),
            ReportEntry::optional("width", self.width.as_deref()),
        ];

        match &self.border {
            BorderReport::Collapsed { descriptor } => {
                entries.push(ReportEntry::shown("border", descriptor));
                for side in SIDES {
                    entries.push(ReportEntry::hidden(&format!("border-{side}")));
                }
            }
            BorderReport::Sides { sides } => {
                entries.push(ReportEntry::hidden("border"));
                for name in SIDES {
                    let shown = sides
                        .iter()
                        .find(|s| s.side == name && s.style != "none")
                        .map(|s| s.descriptor.as_str());
                    entries.push(ReportEntry::optional(&format!("border-{name}"), shown));
                }
            }
        }

        entries.push(ReportEntry::optional("margin", self.margin.as_deref()));
        entries.push(ReportEntry::optional("padding", self.padding.as_deref()));
        entries.push(ReportEntry::optional("min-height", self.min_height.as_deref()));
        entries.push(ReportEntry::optional("max-height", self.max_height.as_deref()));
        entries.push(ReportEntry::optional("min-width", self.min_width.as_deref()));
        entries.push(ReportEntry::optional("max-width", self.max_width.as_deref()));
        entries
    }
}

/// Leading number of a CSS length, e.g. `12.5px` -> 12.5.
pub fn px_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let end = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(raw.len());
    raw[..end].parse::<f64>().ok()
}

pub fn format_px(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}px")
    } else {
        format!("{}px", (value * 100.0).round() / 100.0)
    }
}

fn dimension_value(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.eq_ignore_ascii_case("auto") {
        return None;
    }
    px_number(raw).map(|v| format_px(v.round()))
}

fn border_side(style: &dyn StyleSource, side: &'static str) -> BorderSide {
    let width = style
        .value(&format!("border-{side}-width"))
        .and_then(px_number)
        .unwrap_or(0.0);
    let line = style
        .value(&format!("border-{side}-style"))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("none")
        .to_ascii_lowercase();
    let color =
        parse_rgb_function_to_hex(style.value(&format!("border-{side}-color")).unwrap_or(""));
    BorderSide {
        side,
        descriptor: format!("{} {line} {color}", format_px(width)),
        style: line,
    }
}

/// Not cached: every inspected element is consolidated from scratch.
pub fn consolidate_border(style: &dyn StyleSource) -> BorderReport {
    let sides: Vec<BorderSide> = SIDES.into_iter().map(|side| border_side(style, side)).collect();
    let all_same = sides.windows(2).all(|w| w[0].descriptor == w[1].descriptor);
    if all_same && sides[0].style != "none" {
        return BorderReport::Collapsed {
            descriptor: sides[0].descriptor.clone(),
        };
    }
    BorderReport::Sides {
        sides: sides.into_iter().filter(|s| s.style != "none").collect(),
    }
}

fn four_side_shorthand(style: &dyn StyleSource, property: &str) -> Option<String> {
    let mut all_zero = true;
    let mut values = Vec::with_capacity(4);
    for side in SIDES {
        let raw = style
            .value(&format!("{property}-{side}"))
            .map(str::trim)
            .unwrap_or("0px");
        if px_number(raw) == Some(0.0) || raw.is_empty() {
            values.push("0".to_string());
        } else {
            all_zero = false;
            values.push(raw.to_string());
        }
    }
    if all_zero {
        None
    } else {
        Some(values.join(" "))
    }
}

fn non_default(raw: Option<&str>, defaults: &[&str]) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() || defaults.iter().any(|d| raw.eq_ignore_ascii_case(d)) {
        None
    } else {
        Some(raw.to_string())
    }
}
