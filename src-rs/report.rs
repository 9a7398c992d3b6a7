use crate::box_model::{px_number, BoxModelReport};
use crate::color::{evaluate_contrast, format_ratio, is_large_text, parse_font_weight};
use crate::dimension::{format_mm, round_to, PhysicalSize};
use crate::dom::{ComputedStyle, Element, Rect, StyleSource};
use crate::options::InspectorOptions;
use crate::target_size::{evaluate_target_size, MIN_TARGET_AAA_PX, MIN_TARGET_AA_PX};
use serde::Serialize;

/// One `property: value` line. Values are plain text taken from the page and
/// must be rendered literally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub property: String,
    pub value: String,
    pub visible: bool,
}

impl ReportEntry {
    pub fn shown(property: &str, value: &str) -> Self {
        Self {
            property: property.to_string(),
            value: value.to_string(),
            visible: true,
        }
    }

    pub fn hidden(property: &str) -> Self {
        Self {
            property: property.to_string(),
            value: String::new(),
            visible: false,
        }
    }

    pub fn optional(property: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => Self::shown(property, v),
            None => Self::hidden(property),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Size,
    TargetSize,
    BoxModel,
    Contrast,
}

impl Category {
    pub fn title(self) -> &'static str {
        match self {
            Self::Size => "Size",
            Self::TargetSize => "Target size",
            Self::BoxModel => "Box model",
            Self::Contrast => "Contrast",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportCategory {
    pub category: Category,
    pub visible: bool,
    pub entries: Vec<ReportEntry>,
}

impl ReportCategory {
    pub fn visible_entries(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.visible)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectionReport {
    pub title: String,
    pub categories: Vec<ReportCategory>,
}

impl InspectionReport {
    #[cfg(test)]
    pub fn category(&self, category: Category) -> Option<&ReportCategory> {
        self.categories.iter().find(|c| c.category == category)
    }

    /// Text lines as the popup block shows them.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![self.title.clone()];
        for category in self.categories.iter().filter(|c| c.visible) {
            lines.push(format!("[{}]", category.category.title()));
            for entry in category.visible_entries() {
                lines.push(format!("{}: {}", entry.property, entry.value));
            }
        }
        lines
    }
}

/// Read-only copy of what the inspector needs from one element. Built per
/// hover and dropped once the overlay is updated.
#[derive(Debug, Clone)]
pub struct ElementSnapshot {
    pub label: String,
    pub rect: Rect,
    pub style: ComputedStyle,
}

impl ElementSnapshot {
    pub fn capture(element: &Element) -> Self {
        Self {
            label: element.label(),
            rect: element.rect,
            style: element.style.clone(),
        }
    }
}

pub fn build_report(snapshot: &ElementSnapshot, options: &InspectorOptions) -> InspectionReport {
    InspectionReport {
        title: snapshot.label.clone(),
        categories: vec![
            size_category(snapshot, options),
            target_size_category(snapshot),
            ReportCategory {
                category: Category::BoxModel,
                visible: options.box_model_display,
                entries: BoxModelReport::inspect(&snapshot.style).entries(),
            },
            contrast_category(&snapshot.style, options),
        ],
    }
}

fn size_category(snapshot: &ElementSnapshot, options: &InspectorOptions) -> ReportCategory {
    let rect = snapshot.rect;
    match PhysicalSize::measure(rect.width, rect.height, options.pixel_pitch_mm) {
        Ok(size) => ReportCategory {
            category: Category::Size,
            visible: true,
            entries: vec![
                ReportEntry::shown("width", &format_mm(size.width_mm)),
                ReportEntry::shown("height", &format_mm(size.height_mm)),
                ReportEntry::shown(
                    "diagonal",
                    &format!(
                        "{} ({}px)",
                        format_mm(size.diagonal_mm),
                        round_to(size.diagonal_px, 1)
                    ),
                ),
                ReportEntry::shown("pixel pitch", &format!("{}mm", options.pixel_pitch_mm)),
            ],
        },
        Err(err) => {
            tracing::error!(error = %err, "physical size unavailable");
            ReportCategory {
                category: Category::Size,
                visible: false,
                entries: Vec::new(),
            }
        }
    }
}

fn pass_fail(ok: bool) -> &'static str {
    if ok {
        "pass"
    } else {
        "fail"
    }
}

fn target_size_category(snapshot: &ElementSnapshot) -> ReportCategory {
    let result = evaluate_target_size(snapshot.rect.width, snapshot.rect.height);
    ReportCategory {
        category: Category::TargetSize,
        visible: true,
        entries: vec![
            ReportEntry::shown(
                "box",
                &format!(
                    "{} x {}px",
                    round_to(result.width_px, 1),
                    round_to(result.height_px, 1)
                ),
            ),
            ReportEntry::shown(
                &format!("AA ({MIN_TARGET_AA_PX}px)"),
                pass_fail(result.meets_aa),
            ),
            ReportEntry::shown(
                &format!("AAA ({MIN_TARGET_AAA_PX}px)"),
                pass_fail(result.meets_aaa),
            ),
        ],
    }
}

fn contrast_category(style: &ComputedStyle, options: &InspectorOptions) -> ReportCategory {
    let foreground = style.value("color").unwrap_or("rgb(0, 0, 0)");
    let background = style.value("background-color").unwrap_or("");
    let Some(result) = evaluate_contrast(foreground, background) else {
        return ReportCategory {
            category: Category::Contrast,
            visible: false,
            entries: Vec::new(),
        };
    };

    let font_size = style.value("font-size").and_then(px_number).unwrap_or(16.0);
    let font_weight = parse_font_weight(style.value("font-weight").unwrap_or("400"));
    let large = is_large_text(font_size, font_weight);
    let (aa, aaa) = result.verdict(large);

    ReportCategory {
        category: Category::Contrast,
        visible: options.contrast_display,
        entries: vec![
            ReportEntry::shown("foreground", &result.foreground),
            ReportEntry::shown("background", &result.background),
            ReportEntry::shown("ratio", &format_ratio(result.ratio)),
            ReportEntry::shown("text", if large { "large" } else { "normal" }),
            ReportEntry::shown("AA", pass_fail(aa)),
            ReportEntry::shown("AAA", pass_fail(aaa)),
        ],
    }
}
