use anyhow::{Result, anyhow, bail};
use image::Rgb;

/// Parse `#RGB` or `#RRGGBB`.
pub fn parse_hex_color(hex: &str) -> Result<Rgb<u8>> {
    let digits = hex.trim().trim_start_matches('#');
    if !digits.is_ascii() {
        bail!("color {hex:?} is not hex");
    }
    let expanded: String = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).collect(),
        6 => digits.to_string(),
        _ => bail!("color {hex:?} is not #RGB or #RRGGBB"),
    };
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&expanded[range], 16).map_err(|_| anyhow!("color {hex:?} is not hex"))
    };
    Ok(Rgb([channel(0..2)?, channel(2..4)?, channel(4..6)?]))
}
