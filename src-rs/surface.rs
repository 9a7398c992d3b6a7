use crate::dom::{ElementRef, Rect};
use crate::options::Outline;
use crate::report::InspectionReport;
use serde::Serialize;

pub const GLYPH_PX: f64 = 8.0;
pub const LINE_HEIGHT_PX: f64 = 12.0;
pub const BLOCK_PADDING_PX: f64 = 6.0;

/// Rendering adapter for the overlay. The controller decides *what* is
/// shown; implementations decide how it reaches the screen.
pub trait OverlaySurface {
    fn has_root(&self) -> bool;
    fn create_root(&mut self);
    fn remove_root(&mut self);

    fn show_block(&mut self, report: &InspectionReport);
    fn hide_block(&mut self);
    /// Rendered width/height of the popup block.
    fn block_size(&self) -> (f64, f64);
    fn move_block(&mut self, x: f64, y: f64);

    fn set_outline(&mut self, target: &ElementRef, rect: Rect, outline: &Outline, tint: bool);
    fn clear_outline(&mut self);

    fn place_tracking_indicator(&mut self, target: &ElementRef, rect: Rect, outline: &Outline);
    fn hide_tracking_indicator(&mut self);
    fn remove_tracking_indicator(&mut self);

    fn show_notice(&mut self, message: &str);
    fn dismiss_notice(&mut self);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockState {
    pub visible: bool,
    pub x: f64,
    pub y: f64,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlineState {
    pub target: String,
    pub rect: Rect,
    pub outline: Outline,
    pub tint: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingIndicator {
    pub visible: bool,
    pub target: String,
    pub rect: Rect,
    pub outline: Outline,
}

/// In-memory overlay: the state a DOM adapter would hold, plus counters the
/// tests and the CLI timeline read back.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OverlayState {
    pub root: bool,
    pub block: Option<BlockState>,
    pub report: Option<InspectionReport>,
    pub outline: Option<OutlineState>,
    pub tracking: Option<TrackingIndicator>,
    pub notice: Option<String>,
    pub notices_shown: Vec<String>,
    pub render_count: u32,
}

impl OverlayState {
    pub fn block_visible(&self) -> bool {
        self.block.as_ref().map(|b| b.visible).unwrap_or(false)
    }

    pub fn tracking_visible(&self) -> bool {
        self.tracking.as_ref().map(|t| t.visible).unwrap_or(false)
    }
}

pub fn measure_lines(lines: &[String]) -> (f64, f64) {
    let widest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) as f64;
    (
        widest * GLYPH_PX + 2.0 * BLOCK_PADDING_PX,
        lines.len() as f64 * LINE_HEIGHT_PX + 2.0 * BLOCK_PADDING_PX,
    )
}

impl OverlaySurface for OverlayState {
    fn has_root(&self) -> bool {
        self.root
    }

    fn create_root(&mut self) {
        self.root = true;
    }

    fn remove_root(&mut self) {
        let notices = std::mem::take(&mut self.notices_shown);
        let render_count = self.render_count;
        *self = Self {
            notices_shown: notices,
            render_count,
            ..Self::default()
        };
    }

    fn show_block(&mut self, report: &InspectionReport) {
        let (x, y) = self.block.as_ref().map(|b| (b.x, b.y)).unwrap_or((0.0, 0.0));
        self.block = Some(BlockState {
            visible: true,
            x,
            y,
            lines: report.lines(),
        });
        self.report = Some(report.clone());
        self.render_count += 1;
    }

    fn hide_block(&mut self) {
        if let Some(block) = self.block.as_mut() {
            block.visible = false;
        }
        self.report = None;
    }

    fn block_size(&self) -> (f64, f64) {
        self.block
            .as_ref()
            .map(|b| measure_lines(&b.lines))
            .unwrap_or((0.0, 0.0))
    }

    fn move_block(&mut self, x: f64, y: f64) {
        if let Some(block) = self.block.as_mut() {
            block.x = x;
            block.y = y;
        }
    }

    fn set_outline(&mut self, target: &ElementRef, rect: Rect, outline: &Outline, tint: bool) {
        self.outline = Some(OutlineState {
            target: target.to_string(),
            rect,
            outline: outline.clone(),
            tint,
        });
    }

    fn clear_outline(&mut self) {
        self.outline = None;
    }

    fn place_tracking_indicator(&mut self, target: &ElementRef, rect: Rect, outline: &Outline) {
        self.tracking = Some(TrackingIndicator {
            visible: true,
            target: target.to_string(),
            rect,
            outline: outline.clone(),
        });
    }

    fn hide_tracking_indicator(&mut self) {
        if let Some(tracking) = self.tracking.as_mut() {
            tracking.visible = false;
        }
    }

    fn remove_tracking_indicator(&mut self) {
        self.tracking = None;
    }

    fn show_notice(&mut self, message: &str) {
        self.notice = Some(message.to_string());
        self.notices_shown.push(message.to_string());
    }

    fn dismiss_notice(&mut self) {
        self.notice = None;
    }
}
