//! Cycles through the current palette, one target color per fade

use crate::color::Color;
use crate::error::{Error, Result};
use crate::palette::Palette;

/// Stateful cursor over the most recently supplied palette
#[derive(Debug, Clone, Default)]
pub struct ColorSequencer {
    palette: Option<Palette>,
    cursor: usize,
    last: Option<Color>,
}

impl ColorSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next target color.
    ///
    /// A palette that differs from the stored one is adopted in place: the
    /// cursor keeps its position unless it now points past the end, in which
    /// case it restarts at 0. With more than one color the previous target is
    /// never returned twice in a row.
    pub fn next(&mut self, palette: &Palette) -> Result<Color> {
        let len = palette.len();
        if len == 0 {
            return Err(Error::EmptyPalette);
        }

        if self.palette.as_ref() != Some(palette) {
            self.palette = Some(palette.clone());
            if self.cursor >= len {
                self.cursor = 0;
            }
        }

        let mut color = palette.get(self.cursor).ok_or(Error::EmptyPalette)?;
        if len > 1 && self.last == Some(color) {
            self.cursor = (self.cursor + 1) % len;
            color = palette.get(self.cursor).ok_or(Error::EmptyPalette)?;
        }

        self.cursor = (self.cursor + 1) % len;
        self.last = Some(color);
        Ok(color)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn palette(&self) -> Option<&Palette> {
        self.palette.as_ref()
    }
}
