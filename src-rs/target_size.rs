use serde::Serialize;

/// WCAG 2.2 SC 2.5.8 (AA) minimum target size, CSS px.
pub const MIN_TARGET_AA_PX: f64 = 24.0;
/// WCAG 2.1 SC 2.5.5 (AAA) enhanced target size, CSS px.
pub const MIN_TARGET_AAA_PX: f64 = 44.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TargetSizeResult {
    pub width_px: f64,
    pub height_px: f64,
    pub meets_aa: bool,
    pub meets_aaa: bool,
}

pub fn evaluate_target_size(width_px: f64, height_px: f64) -> TargetSizeResult {
    TargetSizeResult {
        width_px,
        height_px,
        meets_aa: width_px >= MIN_TARGET_AA_PX && height_px >= MIN_TARGET_AA_PX,
        meets_aaa: width_px >= MIN_TARGET_AAA_PX && height_px >= MIN_TARGET_AAA_PX,
    }
}
