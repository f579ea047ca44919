use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use rayon::prelude::*;

/// Pixels whose channels are all below this become pure black.
pub const LOW_PASS_THRESHOLD: u8 = 50;

fn channel_histograms(image: &RgbImage) -> [[u64; 256]; 3] {
    let mut histograms = [[0u64; 256]; 3];
    for pixel in image.pixels() {
        for channel in 0..3 {
            histograms[channel][pixel[channel] as usize] += 1;
        }
    }
    histograms
}

fn apply_luts(image: &mut RgbImage, luts: &[[u8; 256]; 3]) {
    image.par_chunks_mut(3).for_each(|pixel| {
        for channel in 0..3 {
            pixel[channel] = luts[channel][pixel[channel] as usize];
        }
    });
}

/// Stretch every channel so its darkest value maps to 0 and its brightest to 255.
pub fn autocontrast(image: &mut RgbImage) {
    let histograms = channel_histograms(image);
    let mut luts = [[0u8; 256]; 3];
    for channel in 0..3 {
        let histogram = &histograms[channel];
        let lo = histogram.iter().position(|&count| count > 0);
        let hi = histogram.iter().rposition(|&count| count > 0);
        for value in 0..256 {
            luts[channel][value] = match (lo, hi) {
                (Some(lo), Some(hi)) if hi > lo => {
                    let clamped = value.clamp(lo, hi);
                    ((clamped - lo) * 255 / (hi - lo)) as u8
                }
                _ => value as u8,
            };
        }
    }
    apply_luts(image, &luts);
}

/// Per-channel histogram equalization.
pub fn equalize(image: &mut RgbImage) {
    let histograms = channel_histograms(image);
    let mut luts = [[0u8; 256]; 3];
    for channel in 0..3 {
        let histogram = &histograms[channel];
        let last = histogram.iter().rposition(|&count| count > 0);
        let total: u64 = histogram.iter().sum();
        let step = match last {
            Some(last) => (total - histogram[last]) / 255,
            None => 0,
        };
        let mut running = step / 2;
        for value in 0..256 {
            luts[channel][value] = if step == 0 {
                value as u8
            } else {
                (running / step).min(255) as u8
            };
            running += histogram[value];
        }
    }
    apply_luts(image, &luts);
}

// 5x5 ring: the outer border of the window, centre excluded. Weights sum to 16.
const RING_OFFSETS: [(i64, i64); 16] = [
    (-2, -2), (-1, -2), (0, -2), (1, -2), (2, -2),
    (-2, -1), (2, -1),
    (-2, 0), (2, 0),
    (-2, 1), (2, 1),
    (-2, 2), (-1, 2), (0, 2), (1, 2), (2, 2),
];

/// Classic 5x5 ring blur; edges are clamped.
pub fn ring_blur(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut output = RgbImage::new(width, height);
    if width == 0 || height == 0 {
        return output;
    }
    let row_len = width as usize * 3;
    output
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as i64 {
                let mut sums = [0u32; 3];
                for (dx, dy) in RING_OFFSETS {
                    let sx = (x + dx).clamp(0, width as i64 - 1) as u32;
                    let sy = (y as i64 + dy).clamp(0, height as i64 - 1) as u32;
                    let source = image.get_pixel(sx, sy);
                    for channel in 0..3 {
                        sums[channel] += source[channel] as u32;
                    }
                }
                let offset = x as usize * 3;
                for channel in 0..3 {
                    row[offset + channel] = ((sums[channel] + 8) / 16) as u8;
                }
            }
        });
    output
}

/// Force near-black pixels to black.
pub fn low_pass_threshold(image: &mut RgbImage) {
    image.par_chunks_mut(3).for_each(|pixel| {
        if pixel.iter().all(|&value| value < LOW_PASS_THRESHOLD) {
            pixel.copy_from_slice(&[0, 0, 0]);
        }
    });
}

/// Paint a frame `edge` pixels wide along every side.
pub fn draw_border(image: &mut RgbImage, edge: u32, color: Rgb<u8>) {
    let (width, height) = image.dimensions();
    if edge == 0 || width == 0 || height == 0 {
        return;
    }
    let horizontal = edge.min(height);
    let vertical = edge.min(width);
    draw_filled_rect_mut(image, Rect::at(0, 0).of_size(width, horizontal), color);
    draw_filled_rect_mut(
        image,
        Rect::at(0, (height - horizontal) as i32).of_size(width, horizontal),
        color,
    );
    draw_filled_rect_mut(image, Rect::at(0, 0).of_size(vertical, height), color);
    draw_filled_rect_mut(
        image,
        Rect::at((width - vertical) as i32, 0).of_size(vertical, height),
        color,
    );
}

/// Height matching `width` for the aspect ratio of `source`, at least 1.
pub fn scaled_height(source: (u32, u32), width: u32) -> u32 {
    let (source_width, source_height) = source;
    if source_width == 0 {
        return 1;
    }
    ((width as u64 * source_height as u64) / source_width as u64).max(1) as u32
}

/// Shrink to `thumbnail_width` (never enlarging) and blow back up to
/// `final_width` with nearest-neighbour sampling.
pub fn pixelate(image: &RgbImage, thumbnail_width: u32, final_width: u32) -> RgbImage {
    let dimensions = image.dimensions();
    let thumb_width = thumbnail_width.min(dimensions.0).max(1);
    let thumb_height = scaled_height(dimensions, thumb_width).min(dimensions.1.max(1));
    let thumbnail = imageops::thumbnail(image, thumb_width, thumb_height);

    let final_width = final_width.max(1);
    let final_height = scaled_height(dimensions, final_width);
    imageops::resize(&thumbnail, final_width, final_height, FilterType::Nearest)
}
