use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result, anyhow};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::path::Path;

/// Lines must stay this many pixels narrower than the image.
pub const CAPTION_MARGIN: u32 = 20;
/// Gap between the caption band and the bottom edge.
pub const CAPTION_BOTTOM_GAP: i64 = 10;
pub const CAPTION_MIN_HEIGHT: i64 = 10;
pub const CAPTION_BG_ALPHA: f32 = 0.6;

/// Measures and renders caption text.
pub trait Typeface: Send + Sync {
    fn text_size(&self, text: &str) -> (u32, u32);
    fn draw_text(&self, canvas: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, text: &str);
}

pub struct TrueTypeFace {
    font: FontVec,
    scale: PxScale,
}

impl TrueTypeFace {
    pub fn load(path: &Path, size_px: f32) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("failed to read font {:?}", path))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|error| anyhow!("{error}"))
            .with_context(|| format!("failed to parse font {:?}", path))?;
        Ok(Self {
            font,
            scale: PxScale::from(size_px),
        })
    }
}

impl Typeface for TrueTypeFace {
    fn text_size(&self, text: &str) -> (u32, u32) {
        text_size(self.scale, &self.font, text)
    }

    fn draw_text(&self, canvas: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, text: &str) {
        draw_text_mut(canvas, color, x, y, self.scale, &self.font, text);
    }
}

/// Greedy word wrap: a line is closed as soon as adding the next word would
/// reach `max_width`. A single word wider than the limit gets its own line.
pub fn wrap_text(text: &str, max_width: u32, measure: impl Fn(&str) -> u32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut sentence = String::new();
    for word in text.split_whitespace() {
        if !sentence.is_empty() && measure(&format!("{sentence} {word}")) >= max_width {
            lines.push(std::mem::take(&mut sentence));
        }
        if !sentence.is_empty() {
            sentence.push(' ');
        }
        sentence.push_str(word);
    }
    if !sentence.is_empty() {
        lines.push(sentence);
    }
    lines
}

/// Blend `color` over rows `top..=bottom` at `alpha`.
pub fn blend_band(image: &mut RgbImage, top: i64, bottom: i64, color: Rgb<u8>, alpha: f32) {
    let height = image.height() as i64;
    let top = top.clamp(0, height) as u32;
    let end = bottom.saturating_add(1).clamp(0, height) as u32;
    for y in top..end {
        for x in 0..image.width() {
            let pixel = image.get_pixel_mut(x, y);
            for channel in 0..3 {
                let blended =
                    pixel[channel] as f32 * (1.0 - alpha) + color[channel] as f32 * alpha;
                pixel[channel] = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Meme-style caption along the bottom: a translucent band with centred lines.
pub fn draw_caption(
    image: &mut RgbImage,
    typeface: &dyn Typeface,
    text: &str,
    text_color: Rgb<u8>,
    background: Rgb<u8>,
) {
    let (width, height) = image.dimensions();
    let lines = wrap_text(text, width.saturating_sub(CAPTION_MARGIN), |candidate| {
        typeface.text_size(candidate).0
    });
    if lines.is_empty() {
        return;
    }
    let (_, line_height) = typeface.text_size("A");
    let height = height as i64;
    let mut offset = CAPTION_MIN_HEIGHT.max(line_height as i64 * lines.len() as i64);

    blend_band(
        image,
        height - offset - CAPTION_BOTTOM_GAP,
        height - CAPTION_BOTTOM_GAP,
        background,
        CAPTION_BG_ALPHA,
    );

    for line in &lines {
        let (text_width, text_height) = typeface.text_size(line);
        let x = (width as i64 - text_width as i64) / 2;
        let y = height - offset - CAPTION_BOTTOM_GAP;
        typeface.draw_text(image, text_color, x as i32, y as i32, line);
        offset -= text_height as i64;
    }
}
