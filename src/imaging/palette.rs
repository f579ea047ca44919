//! Adaptive palette built with median cut.

use image::{Rgb, RgbImage};
use rayon::prelude::*;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
}

struct ColorBox {
    // (color, pixel count), never empty
    colors: Vec<([u8; 3], u32)>,
}

impl ColorBox {
    fn widest_channel(&self) -> (usize, u8) {
        (0..3)
            .map(|channel| {
                let (min, max) = self.colors.iter().fold((u8::MAX, u8::MIN), |(lo, hi), (c, _)| {
                    (lo.min(c[channel]), hi.max(c[channel]))
                });
                (channel, max - min)
            })
            .max_by_key(|&(channel, range)| (range, std::cmp::Reverse(channel)))
            .unwrap_or((0, 0))
    }

    fn population(&self) -> u64 {
        self.colors.iter().map(|&(_, count)| count as u64).sum()
    }

    fn split(mut self) -> (ColorBox, ColorBox) {
        let (channel, _) = self.widest_channel();
        self.colors.sort_by_key(|&(color, _)| (color[channel], color));
        let half = self.population() / 2;
        let mut seen = 0u64;
        let mut cut = 1;
        for (index, &(_, count)) in self.colors.iter().enumerate() {
            seen += count as u64;
            if seen >= half {
                cut = index + 1;
                break;
            }
        }
        let cut = cut.clamp(1, self.colors.len() - 1);
        let upper = self.colors.split_off(cut);
        (self, ColorBox { colors: upper })
    }

    fn average(&self) -> [u8; 3] {
        let total = self.population().max(1);
        let mut sums = [0u64; 3];
        for &(color, count) in &self.colors {
            for channel in 0..3 {
                sums[channel] += color[channel] as u64 * count as u64;
            }
        }
        sums.map(|sum| ((sum + total / 2) / total) as u8)
    }
}

impl Palette {
    /// At most `max_colors` entries. Deterministic for a given image.
    pub fn median_cut(image: &RgbImage, max_colors: usize) -> Palette {
        let mut histogram: HashMap<[u8; 3], u32> = HashMap::new();
        for pixel in image.pixels() {
            *histogram.entry(pixel.0).or_insert(0) += 1;
        }
        let mut colors: Vec<([u8; 3], u32)> = histogram.into_iter().collect();
        colors.sort_unstable();
        if colors.is_empty() || max_colors == 0 {
            return Palette { colors: Vec::new() };
        }

        let mut boxes = vec![ColorBox { colors }];
        while boxes.len() < max_colors {
            let candidate = boxes
                .iter()
                .enumerate()
                .filter(|(_, color_box)| color_box.colors.len() > 1)
                .max_by_key(|(index, color_box)| {
                    (color_box.widest_channel().1, std::cmp::Reverse(*index))
                })
                .map(|(index, _)| index);
            let Some(index) = candidate else {
                break;
            };
            let (lower, upper) = boxes.swap_remove(index).split();
            boxes.push(lower);
            boxes.push(upper);
        }

        let mut colors: Vec<[u8; 3]> = boxes.iter().map(ColorBox::average).collect();
        colors.sort_unstable();
        colors.dedup();
        Palette { colors }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Add `color` as an exact entry so snapping never moves it.
    pub fn with_color(mut self, color: [u8; 3]) -> Palette {
        if let Err(index) = self.colors.binary_search(&color) {
            self.colors.insert(index, color);
        }
        self
    }

    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    pub fn nearest(&self, color: [u8; 3]) -> [u8; 3] {
        let distance = |candidate: &[u8; 3]| -> u32 {
            (0..3)
                .map(|channel| {
                    let delta = candidate[channel] as i32 - color[channel] as i32;
                    (delta * delta) as u32
                })
                .sum()
        };
        self.colors
            .iter()
            .min_by_key(|candidate| distance(candidate))
            .copied()
            .unwrap_or(color)
    }

    /// Replace every pixel with its nearest palette entry.
    pub fn apply(&self, image: &mut RgbImage) {
        if self.colors.is_empty() {
            return;
        }
        image.par_chunks_mut(3).for_each(|pixel| {
            let mapped = self.nearest([pixel[0], pixel[1], pixel[2]]);
            pixel.copy_from_slice(&mapped);
        });
    }
}

/// Reduce `image` to at most `max_colors` colors and return the palette used.
pub fn quantize(image: &mut RgbImage, max_colors: usize) -> Palette {
    let palette = Palette::median_cut(image, max_colors);
    palette.apply(image);
    palette
}

pub fn distinct_colors(image: &RgbImage) -> usize {
    let mut seen: Vec<Rgb<u8>> = image.pixels().copied().collect();
    seen.sort_unstable_by_key(|pixel| pixel.0);
    seen.dedup();
    seen.len()
}
