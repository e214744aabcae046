//! Strata layout: which tile holds a node at a given depth
//!
//! The key space is cut into horizontal strata; every node belongs to the
//! tile rooted at the top of its stratum, and that tile is as tall as the
//! stratum.

use crate::error::LayoutError;
use crate::types::NodeId;

/// Ten 8-bit strata over a 176-bit terminal stratum (256-bit keys)
pub const DEFAULT_MAP_STRATA: [u32; 11] = [8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 176];

const MAX_DEPTH: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stratum {
    root_depth: u32,
    height: u32,
}

/// Tile layout derived from a list of strata heights
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    strata: Vec<Stratum>,
    total_depth: u32,
}

impl Layout {
    /// Build a layout from heights listed from the root down.
    ///
    /// # Errors
    ///
    /// Fails for an empty list, a height that is zero or not a multiple of 8,
    /// or heights summing past 256 bits.
    pub fn new(heights: &[u32]) -> Result<Self, LayoutError> {
        if heights.is_empty() {
            return Err(LayoutError::EmptyStrata);
        }

        let mut strata = Vec::with_capacity(heights.len());
        let mut depth = 0u32;
        for (index, &height) in heights.iter().enumerate() {
            if height == 0 || height % 8 != 0 {
                return Err(LayoutError::InvalidHeight { index, height });
            }
            strata.push(Stratum {
                root_depth: depth,
                height,
            });
            depth = depth.saturating_add(height);
        }
        if depth > MAX_DEPTH {
            return Err(LayoutError::TooDeep(depth));
        }

        Ok(Self {
            strata,
            total_depth: depth,
        })
    }

    /// Layout used by map storage unless configured otherwise
    pub fn default_map() -> Self {
        Self {
            strata: default_strata(),
            total_depth: DEFAULT_MAP_STRATA.iter().sum(),
        }
    }

    /// Depth of the leaves (key size in bits)
    pub fn total_depth(&self) -> u32 {
        self.total_depth
    }

    pub fn heights(&self) -> Vec<u32> {
        self.strata.iter().map(|s| s.height).collect()
    }

    /// Height of the tile whose stratum contains `depth`
    ///
    /// # Errors
    ///
    /// `DepthOutOfRange` unless `depth < total_depth()`
    pub fn tile_height(&self, depth: u32) -> Result<u32, LayoutError> {
        Ok(self.stratum(depth)?.height)
    }

    /// Depth of the root of the tile containing `depth`
    ///
    /// # Errors
    ///
    /// `DepthOutOfRange` unless `depth < total_depth()`
    pub fn tile_root_depth(&self, depth: u32) -> Result<u32, LayoutError> {
        Ok(self.stratum(depth)?.root_depth)
    }

    /// True if a tile is rooted at `depth`
    pub fn is_tile_boundary(&self, depth: u32) -> bool {
        self.strata.iter().any(|s| s.root_depth == depth)
    }

    /// Root id of the tile that stores the node `id`.
    ///
    /// Nodes at a stratum boundary are the bottom row of the tile above and
    /// are stored there; the root node (depth 0) maps to the top tile.
    ///
    /// # Errors
    ///
    /// `DepthOutOfRange` for ids deeper than the layout
    pub fn tile_root(&self, id: &NodeId) -> Result<NodeId, LayoutError> {
        let depth = id.bit_len();
        if depth > self.total_depth {
            return Err(LayoutError::DepthOutOfRange {
                depth,
                total: self.total_depth,
            });
        }
        let lookup = depth.saturating_sub(1);
        let root_depth = self.stratum(lookup)?.root_depth;
        Ok(id.prefix(root_depth))
    }

    fn stratum(&self, depth: u32) -> Result<Stratum, LayoutError> {
        if depth >= self.total_depth {
            return Err(LayoutError::DepthOutOfRange {
                depth,
                total: self.total_depth,
            });
        }
        // Strata are sorted by root depth; pick the last one starting at or above `depth`.
        let pos = self.strata.partition_point(|s| s.root_depth <= depth);
        Ok(self.strata[pos - 1])
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::default_map()
    }
}

fn default_strata() -> Vec<Stratum> {
    let mut depth = 0;
    DEFAULT_MAP_STRATA
        .iter()
        .map(|&height| {
            let s = Stratum {
                root_depth: depth,
                height,
            };
            depth += height;
            s
        })
        .collect()
}
