//! Tile index ranges and pyramids.

use crate::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive rectangular range of tile indices at a single zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct TileRange2D {
    pub min_x: u64,
    pub min_y: u64,
    pub max_x: u64,
    pub max_y: u64,
}

impl TileRange2D {
    pub fn new(min_x: u64, min_y: u64, max_x: u64, max_y: u64) -> Result<Self> {
        let range = Self {
            min_x,
            min_y,
            max_x,
            max_y,
        };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_x < self.min_x {
            return Err(Error::InvalidRequest(format!(
                "max_x < min_x in {}",
                self
            )));
        }
        if self.max_y < self.min_y {
            return Err(Error::InvalidRequest(format!(
                "max_y < min_y in {}",
                self
            )));
        }
        Ok(())
    }

    /// Tiles across, saturating at `u64::MAX` for a full-width range.
    pub fn span_x(&self) -> u64 {
        (self.max_x - self.min_x).saturating_add(1)
    }

    pub fn span_y(&self) -> u64 {
        (self.max_y - self.min_y).saturating_add(1)
    }

    /// Total number of tiles in the range.
    pub fn count(&self) -> u64 {
        self.span_x().saturating_mul(self.span_y())
    }

    /// Number of `width` x `height` meta-tiles needed to cover the range.
    pub fn count_meta_tiles(&self, width: u32, height: u32) -> u64 {
        let metas = |tiles: u64, size: u32| tiles.div_ceil(u64::from(size.max(1)));
        metas(self.span_x(), width).saturating_mul(metas(self.span_y(), height))
    }

    /// Splits the range into meta-tiles of at most `width` x `height` tiles,
    /// row by row starting at the lower left corner. Edge meta-tiles are
    /// clipped to the range.
    pub fn meta_tiles(&self, width: u32, height: u32) -> MetaTiles {
        MetaTiles {
            range: *self,
            width: u64::from(width.max(1)),
            height: u64::from(height.max(1)),
            next: Some((self.min_x, self.min_y)),
        }
    }
}

impl fmt::Display for TileRange2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[x: {} - {}, y: {} - {}]",
            self.min_x, self.max_x, self.min_y, self.max_y
        )
    }
}

/// Iterator over the meta-tiles of a [`TileRange2D`].
#[derive(Debug, Clone)]
pub struct MetaTiles {
    range: TileRange2D,
    width: u64,
    height: u64,
    next: Option<(u64, u64)>,
}

impl Iterator for MetaTiles {
    type Item = TileRange2D;

    fn next(&mut self) -> Option<Self::Item> {
        let (min_x, min_y) = self.next?;
        let max_x = self.range.max_x.min(min_x.saturating_add(self.width - 1));
        let max_y = self.range.max_y.min(min_y.saturating_add(self.height - 1));

        self.next = if max_x < self.range.max_x {
            Some((max_x + 1, min_y))
        } else if max_y < self.range.max_y {
            Some((self.range.min_x, max_y + 1))
        } else {
            None
        };

        Some(TileRange2D {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }
}

/// The tile range covered at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct ZoomLevelRange {
    pub zoom: u8,
    pub range: TileRange2D,
}

/// Tile ranges for a contiguous or sparse set of zoom levels, ordered by zoom.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct TilePyramid {
    levels: Vec<ZoomLevelRange>,
}

impl TilePyramid {
    pub fn new(levels: impl IntoIterator<Item = ZoomLevelRange>) -> Self {
        let mut levels: Vec<_> = levels.into_iter().collect();
        levels.sort_by_key(|level| level.zoom);
        Self { levels }
    }

    pub fn single_level(zoom: u8, range: TileRange2D) -> Self {
        Self {
            levels: vec![ZoomLevelRange { zoom, range }],
        }
    }

    pub fn levels(&self) -> &[ZoomLevelRange] {
        &self.levels
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn min_zoom(&self) -> Option<u8> {
        self.levels.first().map(|level| level.zoom)
    }

    pub fn max_zoom(&self) -> Option<u8> {
        self.levels.last().map(|level| level.zoom)
    }

    /// Total number of tiles across all levels.
    pub fn count(&self) -> u64 {
        self.levels
            .iter()
            .fold(0u64, |acc, level| acc.saturating_add(level.range.count()))
    }

    /// The levels within `min_zoom..=max_zoom`; open bounds keep the pyramid's own.
    pub fn subset(&self, min_zoom: Option<u8>, max_zoom: Option<u8>) -> Self {
        let min = min_zoom.unwrap_or(u8::MIN);
        let max = max_zoom.unwrap_or(u8::MAX);
        Self {
            levels: self
                .levels
                .iter()
                .filter(|level| level.zoom >= min && level.zoom <= max)
                .copied()
                .collect(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.levels.is_empty() {
            return Err(Error::InvalidRequest(
                "tile pyramid has no zoom levels".to_string(),
            ));
        }
        for pair in self.levels.windows(2) {
            if pair[0].zoom == pair[1].zoom {
                return Err(Error::InvalidRequest(format!(
                    "zoom level {} is defined more than once",
                    pair[0].zoom
                )));
            }
        }
        for level in &self.levels {
            level.range.validate()?;
        }
        Ok(())
    }
}
