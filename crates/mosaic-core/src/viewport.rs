use serde::{Deserialize, Serialize};

/// Derived grid layout for the composite surface.
///
/// Computed once at setup from the stream count and the tile dimensions of
/// the first frame. Streams are packed into a square grid of
/// `col_row = ceil(sqrt(stream_count))` columns and rows, so the total
/// surface area is always `col_row^2 * tile area` even when the last
/// row or column is only partially filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    /// Number of independent streams composed onto the surface.
    pub stream_count: u32,
    /// Width of one grid cell in pixels.
    pub tile_width: u32,
    /// Height of one grid cell in pixels.
    pub tile_height: u32,
    /// Columns (and rows) of the grid.
    pub col_row: u32,
    /// Total composite surface width.
    pub surface_width: u32,
    /// Total composite surface height.
    pub surface_height: u32,
}

impl Viewport {
    /// Compute the grid layout for `stream_count` tiles of
    /// `tile_width x tile_height`.
    pub fn new(stream_count: u32, tile_width: u32, tile_height: u32) -> Self {
        let col_row = (stream_count as f64).sqrt().ceil() as u32;
        Self {
            stream_count,
            tile_width,
            tile_height,
            col_row,
            surface_width: tile_width * col_row,
            surface_height: tile_height * col_row,
        }
    }

    /// Top-left corner of the cell assigned to `lane_id`.
    ///
    /// Lanes fill the grid in row-major order:
    /// `(tile_width * (id % col_row), tile_height * (id / col_row))`.
    pub fn cell_origin(&self, lane_id: u32) -> (u32, u32) {
        (
            self.tile_width * (lane_id % self.col_row),
            self.tile_height * (lane_id / self.col_row),
        )
    }

    /// Whether `lane_id` addresses a cell of this grid.
    pub fn contains_lane(&self, lane_id: u32) -> bool {
        lane_id < self.stream_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_col_row_is_ceil_sqrt() {
        assert_eq!(Viewport::new(1, 320, 240).col_row, 1);
        assert_eq!(Viewport::new(2, 320, 240).col_row, 2);
        assert_eq!(Viewport::new(4, 320, 240).col_row, 2);
        assert_eq!(Viewport::new(5, 320, 240).col_row, 3);
        assert_eq!(Viewport::new(9, 320, 240).col_row, 3);
        assert_eq!(Viewport::new(10, 320, 240).col_row, 4);
    }

    #[test]
    fn test_surface_covers_full_square_grid() {
        // 5 streams on a 3x3 grid: the surface still spans all 9 cells.
        let vp = Viewport::new(5, 320, 240);
        assert_eq!(vp.surface_width, 3 * 320);
        assert_eq!(vp.surface_height, 3 * 240);
    }

    #[test]
    fn test_cell_origin_row_major() {
        let vp = Viewport::new(5, 320, 240);
        assert_eq!(vp.cell_origin(0), (0, 0));
        assert_eq!(vp.cell_origin(2), (2 * 320, 0));
        assert_eq!(vp.cell_origin(3), (0, 240));
        // Lane 4 sits in the second column of the second row.
        assert_eq!(vp.cell_origin(4), (320, 240));
    }

    #[test]
    fn test_contains_lane() {
        let vp = Viewport::new(4, 320, 240);
        assert!(vp.contains_lane(0));
        assert!(vp.contains_lane(3));
        assert!(!vp.contains_lane(4));
    }
}
