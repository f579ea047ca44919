//! The "bitify" filter: palette reduction, pixelation, border and a quote caption.

pub mod caption;
pub mod color;
pub mod filters;
pub mod palette;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use log::{info, warn};
use rand::seq::IndexedRandom;
use std::io::Cursor;
use std::path::Path;

use crate::config::daemon::DaemonConfig;
use caption::{Typeface, TrueTypeFace, draw_caption};
use color::parse_hex_color;

#[derive(Debug, Clone, PartialEq)]
pub struct BitifySettings {
    pub bit_depth: usize,
    pub thumbnail_width: u32,
    pub final_width: u32,
    pub border_edge: u32,
    pub border_color: Rgb<u8>,
    pub quote_text_color: Rgb<u8>,
    pub quote_bg_color: Rgb<u8>,
}

impl BitifySettings {
    pub fn from_config(config: &DaemonConfig) -> Result<Self> {
        Ok(Self {
            bit_depth: config.bit_depth.max(1),
            thumbnail_width: config.thumbnail_width.max(1),
            final_width: config.final_width.max(1),
            border_edge: config.border_edge_size_pixels,
            border_color: parse_hex_color(&config.border_color).context("borderColor")?,
            quote_text_color: parse_hex_color(&config.quote_text_color)
                .context("quoteTextColor")?,
            quote_bg_color: parse_hex_color(&config.quote_bg_color).context("quoteBgColor")?,
        })
    }
}

impl Default for BitifySettings {
    fn default() -> Self {
        let config = DaemonConfig::default();
        Self {
            bit_depth: config.bit_depth,
            thumbnail_width: config.thumbnail_width,
            final_width: config.final_width,
            border_edge: config.border_edge_size_pixels,
            border_color: Rgb([0xEE, 0xEE, 0xEE]),
            quote_text_color: Rgb([0xFF, 0xFF, 0xFF]),
            quote_bg_color: Rgb([0, 0, 0]),
        }
    }
}

pub struct Bitifier {
    pub settings: BitifySettings,
    typeface: Option<Box<dyn Typeface>>,
    quotes: Vec<String>,
}

impl Bitifier {
    pub fn new(
        settings: BitifySettings,
        typeface: Option<Box<dyn Typeface>>,
        quotes: Vec<String>,
    ) -> Self {
        Self {
            settings,
            typeface,
            quotes,
        }
    }

    /// Build from the daemon settings. A missing font or quotes file only
    /// disables captions.
    pub fn from_config(config: &DaemonConfig) -> Result<Self> {
        let settings = BitifySettings::from_config(config)?;
        let typeface: Option<Box<dyn Typeface>> =
            match TrueTypeFace::load(&config.font_ttf, config.font_size) {
                Ok(face) => Some(Box::new(face)),
                Err(error) => {
                    warn!("Captions disabled: {:#}", error);
                    None
                }
            };
        let quotes = match load_quotes(&config.quotes_file) {
            Ok(quotes) => quotes,
            Err(error) => {
                warn!("No quotes loaded: {:#}", error);
                Vec::new()
            }
        };
        info!("Loaded {} quotes", quotes.len());
        Ok(Self::new(settings, typeface, quotes))
    }

    pub fn random_quote(&self) -> Option<&str> {
        self.quotes
            .choose(&mut rand::rng())
            .map(|quote| quote.as_str())
    }

    /// Run the whole filter. `format` selects the contrast pass.
    pub fn bitify(
        &self,
        image: DynamicImage,
        format: Option<ImageFormat>,
        quote: Option<&str>,
    ) -> RgbImage {
        let settings = &self.settings;
        let mut image = image.into_rgb8();

        match format {
            Some(ImageFormat::Jpeg) => filters::autocontrast(&mut image),
            Some(ImageFormat::Gif) => filters::equalize(&mut image),
            _ => {}
        }

        let palette = palette::quantize(&mut image, settings.bit_depth);
        let mut image = filters::ring_blur(&image);
        filters::low_pass_threshold(&mut image);

        let final_width = image.width().min(settings.final_width);
        filters::draw_border(&mut image, settings.border_edge, settings.border_color);
        let mut image = filters::pixelate(&image, settings.thumbnail_width, final_width);
        palette.with_color(settings.border_color.0).apply(&mut image);

        if let (Some(typeface), Some(quote)) = (self.typeface.as_deref(), quote) {
            draw_caption(
                &mut image,
                typeface,
                quote,
                settings.quote_text_color,
                settings.quote_bg_color,
            );
        }
        image
    }

    /// Decode `bytes`, bitify with a random quote and encode as PNG.
    pub fn bitify_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let format = image::guess_format(bytes).ok();
        let decoded = image::load_from_memory(bytes).context("failed to decode image")?;
        let processed = self.bitify(decoded, format, self.random_quote());
        encode_png(&processed)
    }
}

/// One quote per line, trimmed, blank lines skipped.
pub fn load_quotes(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read quotes file {:?}", path))?;
    Ok(parse_quotes(&text))
}

pub fn parse_quotes(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .context("failed to encode PNG")?;
    Ok(buffer.into_inner())
}
