//! Palette lookup and RGBA quantization

use crate::constants::TRANSPARENT_INDEX;
use crate::error::FlexError;
use crate::types::PixelGrid;
use serde::{Deserialize, Serialize};

/// Bytes before the color table in a VGA palette file
pub const VGA_PALETTE_HEADER: usize = 4;

/// Number of palette entries
pub const PALETTE_SIZE: usize = 256;

/// Alpha values below this become transparent
pub const ALPHA_THRESHOLD: u8 = 128;

/// An 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
}

impl Rgb {
    /// Create a color
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Squared euclidean distance in RGB space
    pub fn distance_sq(&self, other: &Rgb) -> u32 {
        let dr = self.r as i32 - other.r as i32;
        let dg = self.g as i32 - other.g as i32;
        let db = self.b as i32 - other.b as i32;
        (dr * dr + dg * dg + db * db) as u32
    }
}

/// Maps palette indices to colors
///
/// Implementors only supply [`ColorLookup::rgb`]; the nearest-color search
/// has a default that skips the transparent index.
pub trait ColorLookup {
    /// Color stored at `index`
    fn rgb(&self, index: u8) -> Rgb;

    /// Index of the closest opaque color; ties go to the lowest index
    fn nearest(&self, color: Rgb) -> u8 {
        let mut best = 0u8;
        let mut best_distance = u32::MAX;
        for index in 0..TRANSPARENT_INDEX {
            let distance = self.rgb(index).distance_sq(&color);
            if distance < best_distance {
                best = index;
                best_distance = distance;
                if distance == 0 {
                    break;
                }
            }
        }
        best
    }
}

/// A 256-entry palette
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: [Rgb; PALETTE_SIZE],
}

impl Palette {
    /// Palette from 256 colors
    pub fn new(colors: [Rgb; PALETTE_SIZE]) -> Self {
        Self { colors }
    }

    /// Parse a VGA palette file
    ///
    /// The file holds a 4-byte header followed by 256 RGB triples of 6-bit
    /// components. Each component is scaled by 4 and clamped to 255.
    pub fn from_vga_bytes(data: &[u8]) -> Result<Self, FlexError> {
        let needed = VGA_PALETTE_HEADER + PALETTE_SIZE * 3;
        if data.len() < needed {
            return Err(FlexError::UnexpectedEnd { offset: data.len() });
        }

        let scale = |v: u8| (v as u16 * 4).min(255) as u8;
        let mut colors = [Rgb::default(); PALETTE_SIZE];
        for (color, triple) in colors
            .iter_mut()
            .zip(data[VGA_PALETTE_HEADER..needed].chunks_exact(3))
        {
            *color = Rgb::new(scale(triple[0]), scale(triple[1]), scale(triple[2]));
        }
        Ok(Self { colors })
    }

    /// All colors in index order
    pub fn colors(&self) -> &[Rgb; PALETTE_SIZE] {
        &self.colors
    }
}

impl ColorLookup for Palette {
    fn rgb(&self, index: u8) -> Rgb {
        self.colors[index as usize]
    }
}

/// Quantize an RGBA image to palette indices
///
/// Pixels with alpha below [`ALPHA_THRESHOLD`] become transparent; all
/// others map to the nearest opaque palette entry.
pub fn quantize_rgba<L: ColorLookup>(
    rgba: &[u8],
    width: usize,
    height: usize,
    palette: &L,
) -> Result<PixelGrid, FlexError> {
    if rgba.len() % 4 != 0 {
        return Err(FlexError::GridSizeMismatch {
            width: width.min(u16::MAX as usize) as u16,
            height: height.min(u16::MAX as usize) as u16,
            expected: width * height * 4,
            actual: rgba.len(),
        });
    }

    let pixels: Vec<u8> = rgba
        .chunks_exact(4)
        .map(|px| {
            if px[3] < ALPHA_THRESHOLD {
                TRANSPARENT_INDEX
            } else {
                palette.nearest(Rgb::new(px[0], px[1], px[2]))
            }
        })
        .collect();

    PixelGrid::from_pixels(width, height, pixels)
}
