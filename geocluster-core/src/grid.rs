use serde::Serialize;

use crate::constants::{GRID_MIN_PADDING_DEG, GRID_PADDING_FRACTION};
use crate::point::LocationPoint;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// Point counts over a square lat/lon grid, indexed `cells[lat][lon]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DensityGrid {
    pub resolution: usize,
    pub cells: Vec<Vec<usize>>,
    pub bounds: Option<GridBounds>,
}

impl DensityGrid {
    pub fn total(&self) -> usize {
        self.cells.iter().flatten().sum()
    }

    /// Busiest cell as (lat index, lon index, count). First one wins on ties.
    pub fn peak(&self) -> Option<(usize, usize, usize)> {
        let mut best: Option<(usize, usize, usize)> = None;
        for (i, row) in self.cells.iter().enumerate() {
            for (j, count) in row.iter().enumerate() {
                match best {
                    Some((_, _, c)) if *count <= c => {}
                    _ if *count == 0 => {}
                    _ => best = Some((i, j, *count)),
                }
            }
        }
        best
    }

    /// Center coordinate of a cell.
    pub fn cell_center(&self, lat_idx: usize, lon_idx: usize) -> Option<(f64, f64)> {
        let b = self.bounds?;
        if lat_idx >= self.resolution || lon_idx >= self.resolution {
            return None;
        }
        let lat_step = (b.max_lat - b.min_lat) / self.resolution as f64;
        let lon_step = (b.max_lon - b.min_lon) / self.resolution as f64;
        Some((
            b.min_lat + (lat_idx as f64 + 0.5) * lat_step,
            b.min_lon + (lon_idx as f64 + 0.5) * lon_step,
        ))
    }
}

/// Bin points with valid coordinates into a `resolution × resolution` grid.
///
/// Bounds are the points' bounding box padded by 10% per axis (0.01° when an
/// axis has no extent).
pub fn density_grid(points: &[LocationPoint], resolution: usize) -> DensityGrid {
    let valid: Vec<&LocationPoint> = points.iter().filter(|p| p.has_valid_coordinates()).collect();
    if valid.is_empty() || resolution == 0 {
        return DensityGrid {
            resolution,
            cells: Vec::new(),
            bounds: None,
        };
    }

    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lon = f64::MAX;
    let mut max_lon = f64::MIN;
    for p in &valid {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lon = min_lon.min(p.longitude);
        max_lon = max_lon.max(p.longitude);
    }

    let lat_pad = padding(max_lat - min_lat);
    let lon_pad = padding(max_lon - min_lon);
    let bounds = GridBounds {
        min_lat: min_lat - lat_pad,
        max_lat: max_lat + lat_pad,
        min_lon: min_lon - lon_pad,
        max_lon: max_lon + lon_pad,
    };

    let lat_step = (bounds.max_lat - bounds.min_lat) / resolution as f64;
    let lon_step = (bounds.max_lon - bounds.min_lon) / resolution as f64;
    let mut cells = vec![vec![0usize; resolution]; resolution];
    for p in &valid {
        let lat_idx = cell_index(p.latitude, bounds.min_lat, lat_step, resolution);
        let lon_idx = cell_index(p.longitude, bounds.min_lon, lon_step, resolution);
        cells[lat_idx][lon_idx] += 1;
    }

    DensityGrid {
        resolution,
        cells,
        bounds: Some(bounds),
    }
}

fn padding(extent: f64) -> f64 {
    let pad = extent * GRID_PADDING_FRACTION;
    if pad > 0.0 {
        pad
    } else {
        GRID_MIN_PADDING_DEG
    }
}

fn cell_index(value: f64, min: f64, step: f64, resolution: usize) -> usize {
    let raw = ((value - min) / step).floor();
    if raw <= 0.0 {
        0
    } else {
        (raw as usize).min(resolution - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_RESOLUTION: usize = 10;
    const TEST_EPSILON: f64 = 1e-9;

    #[test]
    fn empty_input_has_no_bounds() {
        let grid = density_grid(&[], TEST_RESOLUTION);
        assert!(grid.bounds.is_none());
        assert!(grid.cells.is_empty());
        assert!(grid.peak().is_none());
    }

    #[test]
    fn counts_sum_to_valid_points() {
        let points = vec![
            LocationPoint::new(0.0, 0.0),
            LocationPoint::new(1.0, 1.0),
            LocationPoint::new(1.0, 1.0),
            LocationPoint::new(0.5, 0.2),
            LocationPoint::new(f64::NAN, 0.0),
        ];
        let grid = density_grid(&points, TEST_RESOLUTION);
        assert_eq!(grid.total(), 4);
        assert_eq!(grid.cells.len(), TEST_RESOLUTION);
        let (i, j, count) = grid.peak().unwrap();
        assert_eq!(count, 2);
        let (lat, lon) = grid.cell_center(i, j).unwrap();
        assert!((lat - 1.0).abs() < 0.2);
        assert!((lon - 1.0).abs() < 0.2);
    }

    #[test]
    fn single_point_gets_minimum_padding() {
        let grid = density_grid(&[LocationPoint::new(45.0, 9.0)], TEST_RESOLUTION);
        let b = grid.bounds.unwrap();
        assert!((b.min_lat - (45.0 - GRID_MIN_PADDING_DEG)).abs() < TEST_EPSILON);
        assert!((b.max_lon - (9.0 + GRID_MIN_PADDING_DEG)).abs() < TEST_EPSILON);
        assert_eq!(grid.total(), 1);
    }

    #[test]
    fn padding_is_ten_percent_of_extent() {
        let grid = density_grid(
            &[LocationPoint::new(0.0, 0.0), LocationPoint::new(10.0, 20.0)],
            TEST_RESOLUTION,
        );
        let b = grid.bounds.unwrap();
        assert!((b.min_lat + 1.0).abs() < TEST_EPSILON);
        assert!((b.max_lon - 22.0).abs() < TEST_EPSILON);
    }
}
