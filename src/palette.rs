//! Dominant-color palette extraction.
//!
//! Pixels are sampled (every `quality`-th opaque pixel), bucketed into a
//! 5-bit-per-channel histogram and reduced with a modified median cut:
//! boxes are first split by population until 75% of the requested colors
//! exist, then by population × volume. Each box is represented by the mean
//! of the pixels that fell into it, and boxes are ordered by population with
//! ties going to the box whose pixels were sampled first.

use std::cmp::Reverse;
use std::path::Path;

use image::DynamicImage;

use crate::color::Color;
use crate::error::{Error, Result};

/// Bits kept per channel in the histogram
const SIGBITS: u32 = 5;
const RSHIFT: u32 = 8 - SIGBITS;
const HISTOGRAM_SIZE: usize = 1 << (3 * SIGBITS);

/// Pixels less opaque than this are ignored
const ALPHA_THRESHOLD: u8 = 125;

/// Share of the target palette produced by population-only splits
const FRACT_BY_POPULATION: f64 = 0.75;

// ── Palette ─────────────────────────────────────────────────────────

/// Ordered, duplicate-free, non-empty list of colors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette(Vec<Color>);

impl Palette {
    /// Build a palette, keeping the first occurrence of each color
    pub fn from_colors<I: IntoIterator<Item = Color>>(colors: I) -> Result<Self> {
        let mut unique: Vec<Color> = Vec::new();
        for color in colors {
            if !unique.contains(&color) {
                unique.push(color);
            }
        }
        if unique.is_empty() {
            return Err(Error::EmptyPalette);
        }
        Ok(Self(unique))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Color> {
        self.0.get(index).copied()
    }

    pub fn colors(&self) -> &[Color] {
        &self.0
    }
}

// ── Extraction ──────────────────────────────────────────────────────

/// Extract up to `max_colors` dominant colors from an image file
pub fn extract<P: AsRef<Path>>(path: P, max_colors: usize, quality: u32) -> Result<Palette> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })?;
    extract_from_bytes(&bytes, max_colors, quality)
}

/// Extract from an encoded image (PNG, JPEG, GIF, BMP, WebP)
pub fn extract_from_bytes(bytes: &[u8], max_colors: usize, quality: u32) -> Result<Palette> {
    if looks_like_svg(bytes) {
        return Err(Error::Decode(
            "vector images must be rasterized before extraction".into(),
        ));
    }
    let img = image::load_from_memory(bytes)?;
    extract_from_image(&img, max_colors, quality)
}

/// Extract from an already decoded image
pub fn extract_from_image(img: &DynamicImage, max_colors: usize, quality: u32) -> Result<Palette> {
    let max_colors = max_colors.max(1);
    let rgba = img.to_rgba8();
    let bins = sample_histogram(rgba.as_raw(), quality.max(1) as usize);

    let mut boxes = median_cut(bins, max_colors);
    boxes.sort_by_key(|b| (Reverse(b.population()), b.first_seen()));

    let palette = Palette::from_colors(boxes.iter().map(ColorBox::average))?;
    Ok(Palette(palette.0.into_iter().take(max_colors).collect()))
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let head = &bytes[start..bytes.len().min(start + 256)];
    head.starts_with(b"<svg")
        || (head.starts_with(b"<?xml") && head.windows(4).any(|w| w == b"<svg"))
}

/// One histogram cell
#[derive(Debug, Clone)]
struct Bin {
    /// Quantized (r, g, b) coordinates
    key: [u8; 3],
    count: u64,
    sum: [u64; 3],
    /// Index of the first sample that landed here
    first_seen: usize,
}

/// Histogram of sampled opaque pixels, bins in first-seen order
fn sample_histogram(rgba: &[u8], step: usize) -> Vec<Bin> {
    let mut slots = vec![usize::MAX; HISTOGRAM_SIZE];
    let mut bins: Vec<Bin> = Vec::new();

    for (sample, px) in rgba.chunks_exact(4).step_by(step).enumerate() {
        if px[3] < ALPHA_THRESHOLD {
            continue;
        }
        let key = [px[0] >> RSHIFT, px[1] >> RSHIFT, px[2] >> RSHIFT];
        let slot = ((key[0] as usize) << (2 * SIGBITS))
            | ((key[1] as usize) << SIGBITS)
            | key[2] as usize;

        if slots[slot] == usize::MAX {
            slots[slot] = bins.len();
            bins.push(Bin {
                key,
                count: 0,
                sum: [0; 3],
                first_seen: sample,
            });
        }
        let bin = &mut bins[slots[slot]];
        bin.count += 1;
        for (sum, &v) in bin.sum.iter_mut().zip(&px[..3]) {
            *sum += v as u64;
        }
    }

    bins
}

/// A set of histogram bins treated as one color cluster
#[derive(Debug, Clone)]
struct ColorBox {
    bins: Vec<Bin>,
}

impl ColorBox {
    fn population(&self) -> u64 {
        self.bins.iter().map(|b| b.count).sum()
    }

    fn first_seen(&self) -> usize {
        self.bins.iter().map(|b| b.first_seen).min().unwrap_or(usize::MAX)
    }

    fn range(&self, axis: usize) -> (u8, u8) {
        let values = self.bins.iter().map(|b| b.key[axis]);
        let min = values.clone().min().unwrap_or(0);
        let max = values.max().unwrap_or(0);
        (min, max)
    }

    fn volume(&self) -> u64 {
        (0..3)
            .map(|axis| {
                let (min, max) = self.range(axis);
                (max - min) as u64 + 1
            })
            .product()
    }

    fn can_split(&self) -> bool {
        self.bins.len() > 1
    }

    /// Split at the population median along the widest axis
    fn split(mut self) -> (ColorBox, ColorBox) {
        let axis = (0..3)
            .max_by_key(|&axis| {
                let (min, max) = self.range(axis);
                (max - min, Reverse(axis))
            })
            .unwrap_or(0);
        self.bins.sort_by_key(|b| (b.key[axis], b.first_seen));

        let total = self.population();
        let mut acc = 0;
        let mut cut = 1;
        for (i, bin) in self.bins.iter().enumerate() {
            acc += bin.count;
            if acc * 2 >= total {
                cut = i + 1;
                break;
            }
        }
        let cut = cut.clamp(1, self.bins.len() - 1);

        let upper = self.bins.split_off(cut);
        (self, ColorBox { bins: upper })
    }

    /// Rounded mean of the pixels in the box
    fn average(&self) -> Color {
        let count = self.population().max(1);
        let mut channels = [0u8; 3];
        for (axis, channel) in channels.iter_mut().enumerate() {
            let sum: u64 = self.bins.iter().map(|b| b.sum[axis]).sum();
            *channel = ((sum + count / 2) / count).min(255) as u8;
        }
        Color::from_channels(channels)
    }
}

fn median_cut(bins: Vec<Bin>, max_colors: usize) -> Vec<ColorBox> {
    if bins.is_empty() {
        return Vec::new();
    }
    let mut boxes = vec![ColorBox { bins }];

    let by_population = ((max_colors as f64) * FRACT_BY_POPULATION).ceil() as usize;
    split_until(&mut boxes, by_population.max(1), |b| b.population());
    split_until(&mut boxes, max_colors, |b| b.population() * b.volume());

    boxes
}

fn split_until(boxes: &mut Vec<ColorBox>, target: usize, priority: impl Fn(&ColorBox) -> u64) {
    while boxes.len() < target {
        let candidate = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.can_split())
            .max_by_key(|(_, b)| (priority(b), Reverse(b.first_seen())))
            .map(|(i, _)| i);

        let Some(index) = candidate else {
            break;
        };
        let (lower, upper) = boxes.swap_remove(index).split();
        boxes.push(lower);
        boxes.push(upper);
    }
}
