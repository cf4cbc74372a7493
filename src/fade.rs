//! Linear per-channel fades between two colors

use crate::color::Color;

/// Frames of a single fade, in display order
pub type Gradient = Vec<Color>;

/// Linearly interpolate between two colors, rounding to the nearest value
pub fn lerp(a: Color, b: Color, t: f64) -> Color {
    let t = t.clamp(0.0, 1.0);
    let mix = |from: u8, to: u8| {
        let v = from as f64 + (to as f64 - from as f64) * t;
        v.round().clamp(0.0, 255.0) as u8
    };
    Color::new(mix(a.r, b.r), mix(a.g, b.g), mix(a.b, b.b))
}

/// Gradient of `steps` frames from `start` towards `end`.
///
/// `start` itself is not emitted: frame `i` sits at `(i + 1) / steps` of the
/// way, and the last frame is exactly `end`. With `steps <= 1` the fade is a
/// single jump to `end`.
pub fn fade(start: Color, end: Color, steps: usize) -> Gradient {
    if steps <= 1 {
        return vec![end];
    }

    let mut gradient: Gradient = (1..=steps)
        .map(|i| lerp(start, end, i as f64 / steps as f64))
        .collect();
    if let Some(last) = gradient.last_mut() {
        *last = end;
    }
    gradient
}
