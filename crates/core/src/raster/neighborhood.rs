//! Moving-window definitions for neighborhood operations

use crate::error::{Error, Result};

/// Side length of a square moving window, in cells.
///
/// Always odd and at least 3, so the window has a center cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowSize(usize);

impl WindowSize {
    /// Validate a window size
    pub fn new(size: i64) -> Result<Self> {
        if size < 3 || size % 2 == 0 {
            return Err(Error::InvalidWindowSize { size });
        }
        let cells = usize::try_from(size).ok().and_then(|s| s.checked_mul(s));
        if cells.is_none() {
            return Err(Error::InvalidParameter {
                name: "size",
                value: size.to_string(),
                reason: "window cell count overflows".into(),
            });
        }
        Ok(Self(size as usize))
    }

    /// Window that reaches `radius` map units from the center cell.
    ///
    /// The half-width is `radius / cell_size` rounded to the nearest cell,
    /// at least 1. A 150 m radius on a 10 m grid gives a 31-cell window.
    pub fn from_radius(radius: f64, cell_size: f64) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidParameter {
            name: "radius",
            value: format!("{} (cell size {})", radius, cell_size),
            reason: reason.into(),
        };
        if !(radius > 0.0 && cell_size > 0.0) {
            return Err(invalid("radius and cell size must be positive"));
        }
        let ratio = (radius / cell_size).round();
        // i64 casts saturate, so anything at or past this bound is too large
        if !ratio.is_finite() || ratio >= i64::MAX as f64 {
            return Err(invalid("radius is too large for the cell size"));
        }
        let size = (ratio as i64)
            .max(1)
            .checked_mul(2)
            .and_then(|s| s.checked_add(1))
            .ok_or_else(|| invalid("radius is too large for the cell size"))?;
        Self::new(size)
    }

    /// Side length in cells
    pub fn get(self) -> usize {
        self.0
    }

    /// Cells between the center and the window edge: `(size - 1) / 2`
    pub fn half(self) -> usize {
        (self.0 - 1) / 2
    }
}

impl TryFrom<i64> for WindowSize {
    type Error = Error;

    fn try_from(size: i64) -> Result<Self> {
        Self::new(size)
    }
}

/// Shape of a moving window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub size: WindowSize,
    /// Keep only cells whose center lies within `half` cells of the center
    pub circular: bool,
}

impl Window {
    pub fn square(size: WindowSize) -> Self {
        Self { size, circular: false }
    }

    pub fn circle(size: WindowSize) -> Self {
        Self { size, circular: true }
    }

    /// Check if a relative position is within this window
    pub fn contains(&self, dr: isize, dc: isize) -> bool {
        let k = self.size.half() as isize;
        if dr.abs() > k || dc.abs() > k {
            return false;
        }
        !self.circular || dr * dr + dc * dc <= k * k
    }

    /// Relative positions inside the window, center included, row-major
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        let k = self.size.half() as isize;
        let mut offsets = Vec::with_capacity(self.size.get() * self.size.get());
        for dr in -k..=k {
            for dc in -k..=k {
                if self.contains(dr, dc) {
                    offsets.push((dr, dc));
                }
            }
        }
        offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_size_rejects_even_and_small() {
        for size in [2, 4, -3, 0, 1] {
            assert!(
                matches!(WindowSize::new(size), Err(Error::InvalidWindowSize { size: s }) if s == size),
                "size {size} should be rejected"
            );
        }
        assert_eq!(WindowSize::new(3).unwrap().half(), 1);
    }

    #[test]
    fn test_window_size_from_radius() {
        assert_eq!(WindowSize::from_radius(150.0, 10.0).unwrap().get(), 31);
        assert_eq!(WindowSize::from_radius(250.0, 10.0).unwrap().get(), 51);
        assert_eq!(WindowSize::from_radius(510.0, 10.0).unwrap().get(), 103);
        assert_eq!(WindowSize::from_radius(4.0, 10.0).unwrap().get(), 3);
    }

    #[test]
    fn test_window_size_rejects_unbounded_radius() {
        for (radius, cell) in [(f64::INFINITY, 10.0), (f64::NAN, 10.0), (1e300, 1e-10), (1e19, 1.0)] {
            assert!(
                matches!(WindowSize::from_radius(radius, cell), Err(Error::InvalidParameter { .. })),
                "radius {radius} on {cell}"
            );
        }
        assert!(matches!(
            WindowSize::new(i64::MAX),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_window_offsets() {
        let size = WindowSize::new(5).unwrap();
        assert_eq!(Window::square(size).offsets().len(), 25);
        // radius 2 circle drops the four corners and their neighbors
        assert_eq!(Window::circle(size).offsets().len(), 13);
    }
}
