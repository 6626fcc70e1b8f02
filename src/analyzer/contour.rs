//! Closed-contour extraction from a binary mask.
//!
//! Each 8-connected foreground region yields one contour: the set of its
//! boundary pixels (pixels with at least one 4-neighbor outside the region or
//! outside the image). Coordinates are (row, col).

use image::GrayImage;

/// Axis-aligned bounding box in pixel coordinates, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_row: u32,
    pub min_col: u32,
    pub max_row: u32,
    pub max_col: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.max_col - self.min_col + 1
    }

    pub fn height(&self) -> u32 {
        self.max_row - self.min_row + 1
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }
}

/// The boundary of one foreground region.
#[derive(Debug, Clone)]
pub struct Contour {
    pub points: Vec<(u32, u32)>,
}

impl Contour {
    /// Bounding box from the contour's minimum/maximum row and column.
    /// Returns `None` for an empty contour.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let first = *self.points.first()?;
        let mut bbox = BoundingBox {
            min_row: first.0,
            min_col: first.1,
            max_row: first.0,
            max_col: first.1,
        };
        for &(row, col) in &self.points {
            bbox.min_row = bbox.min_row.min(row);
            bbox.min_col = bbox.min_col.min(col);
            bbox.max_row = bbox.max_row.max(row);
            bbox.max_col = bbox.max_col.max(col);
        }
        Some(bbox)
    }
}

/// Extract one contour per 8-connected foreground region, in scan order.
pub fn find_contours(mask: &GrayImage) -> Vec<Contour> {
    let (width, height) = (mask.width() as i64, mask.height() as i64);
    let mut visited = vec![false; (width * height) as usize];
    let mut contours = Vec::new();

    let foreground = |row: i64, col: i64| -> bool {
        row >= 0
            && col >= 0
            && row < height
            && col < width
            && mask.get_pixel(col as u32, row as u32).0[0] != 0
    };

    for row in 0..height {
        for col in 0..width {
            let idx = (row * width + col) as usize;
            if visited[idx] || !foreground(row, col) {
                continue;
            }

            // Flood one region, collecting its boundary pixels.
            let mut points = Vec::new();
            let mut stack = vec![(row, col)];
            visited[idx] = true;
            while let Some((r, c)) = stack.pop() {
                let on_boundary = !foreground(r - 1, c)
                    || !foreground(r + 1, c)
                    || !foreground(r, c - 1)
                    || !foreground(r, c + 1);
                if on_boundary {
                    points.push((r as u32, c as u32));
                }
                for dr in -1i64..=1 {
                    for dc in -1i64..=1 {
                        if dr == 0 && dc == 0 {
                            continue;
                        }
                        let (nr, nc) = (r + dr, c + dc);
                        if foreground(nr, nc) {
                            let nidx = (nr * width + nc) as usize;
                            if !visited[nidx] {
                                visited[nidx] = true;
                                stack.push((nr, nc));
                            }
                        }
                    }
                }
            }
            contours.push(Contour { points });
        }
    }

    contours
}

/// The contour with the most boundary points; ties broken by first occurrence.
/// A cheap proxy for "largest region".
pub fn largest_contour(contours: &[Contour]) -> Option<&Contour> {
    contours.iter().reduce(|best, candidate| {
        if candidate.points.len() > best.points.len() {
            candidate
        } else {
            best
        }
    })
}
