use serde::Serialize;
use std::fmt;
use thiserror::Error;

const MM_PER_INCH: f64 = 25.4;

/// Errors from physical-size math. These are never papered over with a
/// default pitch: every later measurement would be silently wrong.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DimensionError {
    /// Resolution string is not of the form `WxH`.
    #[error("invalid resolution {0:?}: expected WIDTHxHEIGHT")]
    MalformedResolution(String),

    /// Resolution component is zero or not an integer.
    #[error("invalid resolution {input:?}: {component} must be a positive integer")]
    NonPositiveResolution {
        input: String,
        component: &'static str,
    },

    /// Monitor diagonal is not a positive, finite number of inches.
    #[error("invalid monitor size {0}: must be a positive number of inches")]
    InvalidMonitorSize(f64),

    #[error("invalid pixel pitch {0}: must be positive")]
    InvalidPitch(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn parse(raw: &str) -> Result<Self, DimensionError> {
        let parts: Vec<&str> = raw.trim().split(['x', 'X']).map(str::trim).collect();
        if parts.len() != 2 {
            return Err(DimensionError::MalformedResolution(raw.to_string()));
        }
        let width = parse_component(raw, parts[0], "width")?;
        let height = parse_component(raw, parts[1], "height")?;
        Ok(Self { width, height })
    }

    pub fn diagonal_px(&self) -> f64 {
        diagonal_of(f64::from(self.width), f64::from(self.height))
    }
}

fn parse_component(
    input: &str,
    part: &str,
    component: &'static str,
) -> Result<u32, DimensionError> {
    if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
        return Err(DimensionError::MalformedResolution(input.to_string()));
    }
    match part.parse::<u32>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(DimensionError::NonPositiveResolution {
            input: input.to_string(),
            component,
        }),
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonitorSize {
    pub inches: f64,
}

impl MonitorSize {
    pub fn new(inches: f64) -> Result<Self, DimensionError> {
        if !inches.is_finite() || inches <= 0.0 {
            return Err(DimensionError::InvalidMonitorSize(inches));
        }
        Ok(Self { inches })
    }
}

pub fn diagonal_of(width: f64, height: f64) -> f64 {
    (width * width + height * height).sqrt()
}

/// Millimetres per CSS pixel on the reference monitor.
///
/// The reference diagonal is rounded to 2 decimals and the pitch to 3, which
/// is the precision the displayed "standard pixel size" has always used.
pub fn standard_pixel_pitch_mm(
    resolution: Resolution,
    monitor: MonitorSize,
) -> Result<f64, DimensionError> {
    let diagonal_px = round_to(resolution.diagonal_px(), 2);
    let pixels_per_inch = diagonal_px / monitor.inches;
    let pitch = round_to(MM_PER_INCH / pixels_per_inch, 3);
    if !pitch.is_finite() || pitch <= 0.0 {
        return Err(DimensionError::InvalidPitch(pitch));
    }
    Ok(pitch)
}

pub fn pixels_to_mm(px: f64, pitch_mm: f64) -> f64 {
    px * pitch_mm
}

pub fn mm_to_pixels(mm: f64, pitch_mm: f64) -> f64 {
    mm / pitch_mm
}

pub fn format_mm(value: f64) -> String {
    format!("{value:.1}mm")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhysicalSize {
    pub width_px: f64,
    pub height_px: f64,
    pub diagonal_px: f64,
    pub width_mm: f64,
    pub height_mm: f64,
    pub diagonal_mm: f64,
}

impl PhysicalSize {
    pub fn measure(width_px: f64, height_px: f64, pitch_mm: f64) -> Result<Self, DimensionError> {
        if !pitch_mm.is_finite() || pitch_mm <= 0.0 {
            return Err(DimensionError::InvalidPitch(pitch_mm));
        }
        let width_mm = pixels_to_mm(width_px, pitch_mm);
        let height_mm = pixels_to_mm(height_px, pitch_mm);
        Ok(Self {
            width_px,
            height_px,
            diagonal_px: diagonal_of(width_px, height_px),
            width_mm,
            height_mm,
            diagonal_mm: diagonal_of(width_mm, height_mm),
        })
    }
}

pub fn round_to(v: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (v * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_resolution() {
        assert_eq!(
            Resolution::parse("1920x1080").unwrap(),
            Resolution {
                width: 1920,
                height: 1080
            }
        );
        assert_eq!(Resolution::parse(" 1366 X 768 ").unwrap().to_string(), "1366x768");
    }

    #[test]
    fn rejects_malformed_resolution() {
        assert!(matches!(
            Resolution::parse("1920"),
            Err(DimensionError::MalformedResolution(_))
        ));
        assert!(matches!(
            Resolution::parse("1920x1080x2"),
            Err(DimensionError::MalformedResolution(_))
        ));
        assert!(matches!(
            Resolution::parse("axb"),
            Err(DimensionError::MalformedResolution(_))
        ));
        assert!(matches!(
            Resolution::parse("-1x768"),
            Err(DimensionError::MalformedResolution(_))
        ));
        assert!(matches!(
            Resolution::parse("0x768"),
            Err(DimensionError::NonPositiveResolution {
                component: "width",
                ..
            })
        ));
    }

    #[test]
    fn rejects_bad_monitor_size() {
        assert!(MonitorSize::new(0.0).is_err());
        assert!(MonitorSize::new(-17.0).is_err());
        assert!(MonitorSize::new(f64::NAN).is_err());
        assert!(MonitorSize::new(f64::INFINITY).is_err());
        assert!(MonitorSize::new(13.3).is_ok());
    }

    #[test]
    fn pitch_for_default_monitor() {
        let pitch = standard_pixel_pitch_mm(
            Resolution::parse("1366x768").unwrap(),
            MonitorSize::new(17.0).unwrap(),
        )
        .unwrap();
        // 17" at 1366x768 is ~92.2 ppi.
        assert!((pitch - 0.275).abs() < 0.002, "pitch {pitch}");
    }

    #[test]
    fn full_hd_24_inch_scenario() {
        let resolution = Resolution::parse("1920x1080").unwrap();
        assert!((resolution.diagonal_px() - 2202.9).abs() < 0.05);

        let pitch = standard_pixel_pitch_mm(resolution, MonitorSize::new(24.0).unwrap()).unwrap();
        let size = PhysicalSize::measure(1920.0, 1080.0, pitch).unwrap();
        assert!(
            (299.1..=300.5).contains(&size.height_mm),
            "height {}",
            size.height_mm
        );
        assert!(
            (531.0..=536.0).contains(&size.width_mm),
            "width {}",
            size.width_mm
        );
        assert!((size.diagonal_px - 2202.9).abs() < 0.05);
    }

    #[test]
    fn measure_rejects_bad_pitch() {
        assert!(PhysicalSize::measure(10.0, 10.0, 0.0).is_err());
        assert!(PhysicalSize::measure(10.0, 10.0, f64::NAN).is_err());
    }

    #[test]
    fn formats_one_decimal() {
        assert_eq!(format_mm(299.16), "299.2mm");
        assert_eq!(format_mm(3.0), "3.0mm");
    }

    proptest! {
        #[test]
        fn diagonal_is_symmetric_and_dominant(w in 1u32..10_000, h in 1u32..10_000) {
            let (w, h) = (f64::from(w), f64::from(h));
            prop_assert_eq!(diagonal_of(w, h), diagonal_of(h, w));
            prop_assert!(diagonal_of(w, h) >= w.max(h));
        }

        #[test]
        fn pixels_round_trip_through_mm(px in 0u32..20_000, pitch in 0.05f64..1.0) {
            let px = f64::from(px);
            let back = mm_to_pixels(pixels_to_mm(px, pitch), pitch);
            prop_assert!((back - px).abs() < 1e-6);
        }
    }
}
