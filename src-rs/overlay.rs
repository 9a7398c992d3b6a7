use crate::dom::{Document, ElementRef, NodeId, Page, Viewport};
use crate::options::{InspectorOptions, InteractionMode};
use crate::report::{build_report, ElementSnapshot};
use crate::surface::OverlaySurface;
use serde::Serialize;

pub const POPUP_OFFSET_PX: f64 = 15.0;
pub const POPUP_FLIP_OFFSET_PX: f64 = 30.0;

const INTERACTIVE_TAGS: [&str; 4] = ["a", "button", "input", "area"];
const INTERACTIVE_ANCESTOR_TAGS: [&str; 3] = ["a", "button", "input"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackingState {
    /// Lookup into the page; the page owns the node.
    pub last_hovered: Option<ElementRef>,
    pub is_paused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HoverOutcome {
    Rendered,
    Duplicate,
    Suppressed,
    Missing,
}

/// Drives what the overlay shows. Options are fixed at construction; the
/// only mutable state is the hovered element, the cursor and the frame guard.
#[derive(Debug, Clone)]
pub struct OverlayController {
    options: InspectorOptions,
    tracking: TrackingState,
    cursor: Option<(f64, f64)>,
    frame_pending: bool,
}

impl OverlayController {
    pub fn new(options: InspectorOptions) -> Self {
        Self {
            options,
            tracking: TrackingState::default(),
            cursor: None,
            frame_pending: false,
        }
    }

    pub fn tracking(&self) -> &TrackingState {
        &self.tracking
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.tracking.is_paused = paused;
    }

    #[cfg(test)]
    pub fn frame_pending(&self) -> bool {
        self.frame_pending
    }

    /// The element a hover on `target` inspects under the current mode, or
    /// `None` when the hover should not show anything.
    pub fn resolve_target(&self, page: &Page, target: &ElementRef) -> Option<ElementRef> {
        match self.options.interaction_mode {
            InteractionMode::Normal => page.element(target).map(|_| target.clone()),
            InteractionMode::LinkOnly | InteractionMode::Tracking => {
                let doc = page.document(&target.frame)?;
                let node = nearest_interactive(doc, target.node)?;
                Some(ElementRef {
                    frame: target.frame.clone(),
                    node,
                })
            }
        }
    }

    pub fn on_mouse_over(
        &mut self,
        page: &Page,
        surface: &mut dyn OverlaySurface,
        target: &ElementRef,
    ) -> HoverOutcome {
        let Some(resolved) = self.resolve_target(page, target) else {
            self.clear(surface);
            return HoverOutcome::Suppressed;
        };
        if self.tracking.last_hovered.as_ref() == Some(&resolved) {
            return HoverOutcome::Duplicate;
        }
        let (Some(element), Some(rect)) = (page.element(&resolved), page.absolute_rect(&resolved))
        else {
            tracing::warn!(target = %resolved, "hovered element vanished from page");
            return HoverOutcome::Missing;
        };

        let snapshot = ElementSnapshot::capture(element);
        let report = build_report(&snapshot, &self.options);
        let outline = &self.options.outline;
        match self.options.interaction_mode {
            InteractionMode::Tracking => {
                surface.clear_outline();
                surface.place_tracking_indicator(&resolved, rect, outline);
            }
            InteractionMode::Normal | InteractionMode::LinkOnly => {
                surface.set_outline(&resolved, rect, outline, self.options.background_tint);
            }
        }
        surface.show_block(&report);
        tracing::debug!(target = %resolved, title = %report.title, "inspecting element");
        self.tracking.last_hovered = Some(resolved);

        if let Some(cursor) = self.cursor {
            self.position_block(page.top.viewport, surface, cursor);
        }
        HoverOutcome::Rendered
    }

    /// Returns to idle when the pointer leaves the inspected element, unless
    /// it moved somewhere that resolves to the same element.
    pub fn on_mouse_out(
        &mut self,
        page: &Page,
        surface: &mut dyn OverlaySurface,
        target: &ElementRef,
        related: Option<&ElementRef>,
    ) -> bool {
        let Some(current) = self.tracking.last_hovered.clone() else {
            return false;
        };
        if self.resolve_target(page, target).as_ref() != Some(&current) {
            return false;
        }
        if let Some(related) = related {
            if self.resolve_target(page, related).as_ref() == Some(&current) {
                return false;
            }
        }
        self.clear(surface);
        true
    }

    /// Records the cursor and requests a frame. `false` means a frame was
    /// already pending and this request was dropped.
    pub fn on_mouse_move(&mut self, x: f64, y: f64) -> bool {
        self.cursor = Some((x, y));
        if self.frame_pending {
            return false;
        }
        self.frame_pending = true;
        true
    }

    pub fn on_animation_frame(&mut self, page: &Page, surface: &mut dyn OverlaySurface) -> bool {
        if !self.frame_pending {
            return false;
        }
        self.frame_pending = false;
        let Some(cursor) = self.cursor else {
            return false;
        };
        if self.tracking.last_hovered.is_none() {
            return false;
        }
        self.position_block(page.top.viewport, surface, cursor);
        true
    }

    fn position_block(
        &self,
        viewport: Viewport,
        surface: &mut dyn OverlaySurface,
        cursor: (f64, f64),
    ) {
        let (x, y) = place_popup(cursor, surface.block_size(), viewport);
        surface.move_block(x, y);
    }

    pub fn clear(&mut self, surface: &mut dyn OverlaySurface) {
        surface.clear_outline();
        surface.hide_tracking_indicator();
        surface.hide_block();
        self.tracking.last_hovered = None;
    }
}

/// Nearest element at or above `node` that counts as interactive. The walk
/// stops at `body`; the first match wins.
pub fn nearest_interactive(doc: &Document, node: NodeId) -> Option<NodeId> {
    let element = doc.get(node)?;
    if INTERACTIVE_TAGS.contains(&element.tag.as_str()) {
        return Some(node);
    }
    let mut current = doc.parent(node);
    while let Some(id) = current {
        let ancestor = doc.get(id)?;
        if ancestor.tag == "body" {
            return None;
        }
        if INTERACTIVE_ANCESTOR_TAGS.contains(&ancestor.tag.as_str()) {
            return Some(id);
        }
        current = doc.parent(id);
    }
    None
}

/// Popup position in page coordinates for a cursor in client coordinates.
pub fn place_popup(cursor: (f64, f64), block: (f64, f64), viewport: Viewport) -> (f64, f64) {
    let (cx, cy) = cursor;
    let (w, h) = block;

    let mut x = cx + POPUP_OFFSET_PX;
    if x + w > viewport.width {
        x = cx - w - POPUP_FLIP_OFFSET_PX;
        if x < 0.0 {
            x = 0.0;
        }
    }

    let mut y = cy + POPUP_OFFSET_PX;
    if y + h > viewport.height {
        y = cy - h - POPUP_FLIP_OFFSET_PX;
        if y < 0.0 {
            y = 0.0;
        }
    }

    let inside = x >= 0.0 && y >= 0.0 && x + w <= viewport.width && y + h <= viewport.height;
    if !inside {
        y = POPUP_OFFSET_PX;
    }
    (x + viewport.scroll_x, y + viewport.scroll_y)
}
