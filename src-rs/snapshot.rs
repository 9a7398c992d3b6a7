use crate::dom::{Document, Page, Rect};
use crate::options::{Outline, OutlineStyle};
use crate::surface::{measure_lines, OverlayState, BLOCK_PADDING_PX, GLYPH_PX, LINE_HEIGHT_PX};
use anyhow::{Context, Result};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{DynamicImage, Rgba, RgbaImage};
use std::fs;
use std::path::Path;

const MAX_CANVAS_PX: f64 = 4096.0;
const PAGE_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const ELEMENT_BOX: Rgba<u8> = Rgba([200, 200, 200, 255]);
const BLOCK_BACKGROUND: Rgba<u8> = Rgba([20, 20, 20, 225]);
const BLOCK_TEXT: Rgba<u8> = Rgba([255, 255, 255, 255]);
const NOTICE_BACKGROUND: Rgba<u8> = Rgba([0, 90, 200, 235]);
const TINT_ALPHA: u8 = 48;

/// Rasterizes the visible viewport: element boxes in light gray, then the
/// overlay (tint, outline, tracking indicator, popup block, notice) on top.
pub fn render_snapshot(page: &Page, overlay: &OverlayState) -> RgbaImage {
    let viewport = page.top.viewport;
    let width = viewport.width.clamp(1.0, MAX_CANVAS_PX).round() as u32;
    let height = viewport.height.clamp(1.0, MAX_CANVAS_PX).round() as u32;
    let mut img = RgbaImage::from_pixel(width, height, PAGE_BACKGROUND);
    let (sx, sy) = (viewport.scroll_x, viewport.scroll_y);

    draw_document_boxes(&mut img, &page.top, -sx, -sy);

    if let Some(outline) = &overlay.outline {
        let rect = outline.rect.translate(-sx, -sy);
        if outline.tint {
            let mut tint = hex_to_rgba(&outline.outline.color_hex);
            tint[3] = TINT_ALPHA;
            fill_rect_alpha(&mut img, rect_bounds(rect), tint);
        }
        draw_outline(&mut img, rect, &outline.outline);
    }

    if let Some(tracking) = overlay.tracking.as_ref().filter(|t| t.visible) {
        draw_outline(&mut img, tracking.rect.translate(-sx, -sy), &tracking.outline);
    }

    if let Some(block) = overlay.block.as_ref().filter(|b| b.visible) {
        draw_text_block(&mut img, block.x - sx, block.y - sy, &block.lines, BLOCK_BACKGROUND);
    }

    if let Some(notice) = &overlay.notice {
        let lines = vec![notice.clone()];
        let (w, _) = measure_lines(&lines);
        let x = ((f64::from(width) - w) / 2.0).max(0.0);
        draw_text_block(&mut img, x, BLOCK_PADDING_PX, &lines, NOTICE_BACKGROUND);
    }

    img
}

pub fn save_snapshot(img: RgbaImage, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    DynamicImage::ImageRgba8(img)
        .save(path)
        .with_context(|| format!("failed to save snapshot image: {}", path.display()))?;
    Ok(())
}

fn draw_document_boxes(img: &mut RgbaImage, doc: &Document, dx: f64, dy: f64) {
    for id in doc.node_ids() {
        let Some(element) = doc.get(id) else {
            continue;
        };
        let rect = element.rect.translate(dx, dy);
        if rect.width > 0.0 && rect.height > 0.0 {
            draw_pattern_rect(img, rect_bounds(rect), ELEMENT_BOX, 1, OutlineStyle::Solid);
        }
        if let Some(child) = element.frame.as_deref() {
            draw_document_boxes(
                img,
                child,
                rect.x - child.viewport.scroll_x,
                rect.y - child.viewport.scroll_y,
            );
        }
    }
}

fn draw_outline(img: &mut RgbaImage, rect: Rect, outline: &Outline) {
    let color = hex_to_rgba(&outline.color_hex);
    let thickness = outline.width_px.round().max(1.0) as u32;
    draw_pattern_rect(img, rect_bounds(rect), color, thickness, outline.style);
}

fn rect_bounds(rect: Rect) -> (i32, i32, i32, i32) {
    (
        rect.x.round() as i32,
        rect.y.round() as i32,
        (rect.x + rect.width).round() as i32 - 1,
        (rect.y + rect.height).round() as i32 - 1,
    )
}

fn hex_to_rgba(hex: &str) -> Rgba<u8> {
    let bare = hex.trim().trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        bare.get(range)
            .and_then(|raw| u8::from_str_radix(raw, 16).ok())
    };
    match (channel(0..2), channel(2..4), channel(4..6)) {
        (Some(r), Some(g), Some(b)) if bare.len() == 6 => Rgba([r, g, b, 255]),
        _ => Rgba([255, 0, 0, 255]),
    }
}

fn pattern_on(style: OutlineStyle, step: u32, thickness: u32) -> bool {
    match style {
        OutlineStyle::Solid => true,
        OutlineStyle::Dashed => {
            let dash = 3 * thickness.max(2);
            step % (dash + thickness.max(2)) < dash
        }
        OutlineStyle::Dotted => (step / thickness.max(1)) % 2 == 0,
    }
}

/// Outline drawn inward from the element's border box, the way CSS
/// `outline-offset: -width` would paint it.
fn draw_pattern_rect(
    img: &mut RgbaImage,
    bounds: (i32, i32, i32, i32),
    color: Rgba<u8>,
    thickness: u32,
    style: OutlineStyle,
) {
    let (x0, y0, x1, y1) = bounds;
    if x1 < x0 || y1 < y0 {
        return;
    }
    for t in 0..thickness.max(1) as i32 {
        let (ix0, iy0, ix1, iy1) = (x0 + t, y0 + t, x1 - t, y1 - t);
        if ix1 < ix0 || iy1 < iy0 {
            break;
        }
        for (step, x) in (ix0..=ix1).enumerate() {
            if pattern_on(style, step as u32, thickness) {
                put_blended(img, x, iy0, color);
                put_blended(img, x, iy1, color);
            }
        }
        for (step, y) in (iy0..=iy1).enumerate() {
            if pattern_on(style, step as u32, thickness) {
                put_blended(img, ix0, y, color);
                put_blended(img, ix1, y, color);
            }
        }
    }
}

fn draw_text_block(img: &mut RgbaImage, x: f64, y: f64, lines: &[String], background: Rgba<u8>) {
    let (w, h) = measure_lines(lines);
    let (x0, y0) = (x.round() as i32, y.round() as i32);
    fill_rect_alpha(
        img,
        (x0, y0, x0 + w.round() as i32 - 1, y0 + h.round() as i32 - 1),
        background,
    );
    let pad = BLOCK_PADDING_PX as i32;
    let line_step = LINE_HEIGHT_PX as i32;
    for (idx, line) in lines.iter().enumerate() {
        draw_bitmap_text(img, x0 + pad, y0 + pad + idx as i32 * line_step, line, BLOCK_TEXT);
    }
}

fn draw_bitmap_text(img: &mut RgbaImage, x: i32, y: i32, text: &str, color: Rgba<u8>) {
    let advance = GLYPH_PX as i32;
    let mut cursor_x = x;
    for ch in text.chars() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            cursor_x += advance;
            continue;
        };
        for (row_idx, row) in glyph.iter().enumerate() {
            for col_idx in 0..8 {
                if (*row >> col_idx) & 1 == 1 {
                    put_blended(img, cursor_x + col_idx, y + row_idx as i32, color);
                }
            }
        }
        cursor_x += advance;
    }
}

fn fill_rect_alpha(img: &mut RgbaImage, bounds: (i32, i32, i32, i32), color: Rgba<u8>) {
    let (x0, y0, x1, y1) = bounds;
    for y in y0.max(0)..=y1.min(img.height() as i32 - 1) {
        for x in x0.max(0)..=x1.min(img.width() as i32 - 1) {
            put_blended(img, x, y, color);
        }
    }
}

fn put_blended(img: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= img.width() as i32 || y >= img.height() as i32 {
        return;
    }
    let dst = *img.get_pixel(x as u32, y as u32);
    img.put_pixel(x as u32, y as u32, blend_pixel(dst, color));
}

fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = f64::from(src[3]) / 255.0;
    if a <= 0.0 {
        return dst;
    }
    let inv = 1.0 - a;
    let mix = |d: u8, s: u8| {
        (f64::from(d) * inv + f64::from(s) * a)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    let out_a = (f64::from(dst[3]) + f64::from(src[3]) * inv)
        .round()
        .clamp(0.0, 255.0) as u8;
    Rgba([mix(dst[0], src[0]), mix(dst[1], src[1]), mix(dst[2], src[2]), out_a])
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}
