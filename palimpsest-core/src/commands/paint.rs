//! # Paint
//!
//! A handful of simple, deterministic content commands. Enough to drive the history engine from scripts and
//! tests, not a drawing tool suite. All of them paint source-over and silently clip to the canvas.

use az::SaturatingAs;

use super::{ContentCommand, ReplayError};
use crate::bitmap::{Bitmap, Rgba8};

/// Paint the whole layer.
#[derive(serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct Fill {
    pub color: Rgba8,
}
impl ContentCommand for Fill {
    fn apply(&self, target: &mut Bitmap) -> Result<(), ReplayError> {
        for pixel in target.pixels_mut() {
            *pixel = self.color.over(*pixel);
        }
        Ok(())
    }
    fn name(&self) -> &str {
        "Fill"
    }
}

/// Paint an axis-aligned rectangle, with its top-left corner at `x, y`.
#[derive(serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct FillRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub color: Rgba8,
}
impl ContentCommand for FillRect {
    fn apply(&self, target: &mut Bitmap) -> Result<(), ReplayError> {
        let right = self.x.saturating_add(self.width).min(target.width());
        let bottom = self.y.saturating_add(self.height).min(target.height());
        for y in self.y..bottom {
            for x in self.x..right {
                target.blend(x, y, self.color);
            }
        }
        Ok(())
    }
    fn name(&self) -> &str {
        "FillRect"
    }
}

/// A straight line drawn with a square brush `width` pixels across.
/// Endpoints may lie outside the canvas.
#[derive(serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct Line {
    pub from: (i32, i32),
    pub to: (i32, i32),
    pub width: u32,
    pub color: Rgba8,
}
impl Line {
    /// Every pixel on the canvas touched by the brush, each listed once no matter how many brush positions
    /// overlap it, so translucent lines don't darken where stamps overlap.
    ///
    /// Brush centers follow the line one step along its major axis at a time. Rather than walking them, each
    /// canvas column (or row, for steep lines) looks up the run of centers whose brush reaches it. The minor
    /// coordinate moves by at most one per step, so that run covers one contiguous span. Cost depends on the
    /// canvas alone, however long the line or wide the brush.
    fn coverage(&self, canvas_width: u32, canvas_height: u32) -> Vec<(u32, u32)> {
        let width = i64::from(self.width.max(1));
        // Brush covers [low, high] around its center, biased toward positive for even widths.
        let low = -(width - 1) / 2;
        let high = width / 2;

        let (from, to) = (
            (i64::from(self.from.0), i64::from(self.from.1)),
            (i64::from(self.to.0), i64::from(self.to.1)),
        );
        let steep = (to.1 - from.1).abs() > (to.0 - from.0).abs();
        // (major, minor) coordinates, and the canvas in the same terms.
        let (mut start, mut end, major_len, minor_len) = if steep {
            ((from.1, from.0), (to.1, to.0), canvas_height, canvas_width)
        } else {
            (from, to, canvas_width, canvas_height)
        };
        if start.0 > end.0 {
            std::mem::swap(&mut start, &mut end);
        }
        let run = i128::from(end.0 - start.0);
        let rise = i128::from(end.1 - start.1);
        // Rounded to nearest, halves up.
        let minor_at = |major: i64| -> i64 {
            if run == 0 {
                return start.1;
            }
            let numerator = i128::from(major - start.0) * rise;
            let offset = (2 * numerator + run).div_euclid(2 * run);
            // |rise| <= run, so the offset is no larger than the line is long.
            start.1 + offset.saturating_as::<i64>()
        };

        let mut covered = Vec::new();
        for major in 0..i64::from(major_len) {
            // Centers whose brush reaches this column.
            let first = (major - high).max(start.0);
            let last = (major - low).min(end.0);
            if first > last {
                continue;
            }
            let (a, b) = (minor_at(first), minor_at(last));
            let top = (a.min(b) + low).max(0);
            let bottom = (a.max(b) + high).min(i64::from(minor_len) - 1);
            for minor in top..=bottom {
                let (major, minor) = (major.saturating_as::<u32>(), minor.saturating_as::<u32>());
                covered.push(if steep { (minor, major) } else { (major, minor) });
            }
        }
        covered
    }
}
impl ContentCommand for Line {
    fn apply(&self, target: &mut Bitmap) -> Result<(), ReplayError> {
        for (x, y) in self.coverage(target.width(), target.height()) {
            target.blend(x, y, self.color);
        }
        Ok(())
    }
    fn name(&self) -> &str {
        "Line"
    }
}

#[cfg(test)]
mod test {
    use super::*;
    const RED: Rgba8 = Rgba8::new(255, 0, 0, 255);

    #[test]
    fn fill_rect_clips() {
        let mut bitmap = Bitmap::new(4, 4).unwrap();
        FillRect {
            x: 2,
            y: 3,
            width: 10,
            height: 10,
            color: RED,
        }
        .apply(&mut bitmap)
        .unwrap();
        assert_eq!(bitmap.get(2, 3), Some(RED));
        assert_eq!(bitmap.get(3, 3), Some(RED));
        assert_eq!(bitmap.get(1, 3), Some(Rgba8::TRANSPARENT));
        assert_eq!(bitmap.get(2, 2), Some(Rgba8::TRANSPARENT));
        let painted = bitmap.pixels().iter().filter(|p| **p == RED).count();
        assert_eq!(painted, 2);
    }
    #[test]
    fn diagonal_line() {
        let mut bitmap = Bitmap::new(5, 5).unwrap();
        Line {
            from: (0, 0),
            to: (4, 4),
            width: 1,
            color: RED,
        }
        .apply(&mut bitmap)
        .unwrap();
        for i in 0..5 {
            assert_eq!(bitmap.get(i, i), Some(RED));
        }
        let painted = bitmap.pixels().iter().filter(|p| **p == RED).count();
        assert_eq!(painted, 5);
    }
    #[test]
    fn wide_line_offscreen_ends() {
        let line = Line {
            from: (-10, 1),
            to: (10, 1),
            width: 3,
            color: RED,
        };
        // Rows 0..=2, all 4 columns.
        assert_eq!(line.coverage(4, 4).len(), 12);
    }
    #[test]
    fn steep_line() {
        let line = Line {
            from: (1, 7),
            to: (2, 0),
            width: 1,
            color: RED,
        };
        let mut covered = line.coverage(4, 8);
        covered.sort_unstable_by_key(|&(x, y)| (y, x));
        // One pixel per row, drifting one column over.
        assert_eq!(covered.len(), 8);
        assert_eq!(covered[0], (2, 0));
        assert_eq!(covered[7], (1, 7));
        assert!(covered.windows(2).all(|pair| pair[0].1 + 1 == pair[1].1));
    }
    #[test]
    fn extreme_lines_stay_cheap() {
        let across = Line {
            from: (i32::MIN, 2),
            to: (i32::MAX, 2),
            width: 1,
            color: RED,
        };
        let covered = across.coverage(8, 8);
        assert_eq!(covered.len(), 8);
        assert!(covered.iter().all(|&(_, y)| y == 2));

        let huge_brush = Line {
            from: (i32::MIN, i32::MIN),
            to: (i32::MAX, i32::MAX),
            width: u32::MAX,
            color: RED,
        };
        assert_eq!(huge_brush.coverage(8, 8).len(), 64);

        let far_away = Line {
            from: (-1_000_000, -5),
            to: (1_000_000, -5),
            width: 4,
            color: RED,
        };
        assert!(far_away.coverage(8, 8).is_empty());
    }
    #[test]
    fn translucent_overlap_painted_once() {
        let half = Rgba8::new(0, 0, 255, 128);
        let mut bitmap = Bitmap::new(8, 8).unwrap();
        Line {
            from: (1, 1),
            to: (6, 1),
            width: 4,
            color: half,
        }
        .apply(&mut bitmap)
        .unwrap();
        // Onto transparent, a single application leaves the color as-is.
        assert_eq!(bitmap.get(3, 1), Some(half));
    }
    #[test]
    fn deterministic() {
        let line = Line {
            from: (3, -2),
            to: (17, 9),
            width: 2,
            color: Rgba8::new(10, 200, 30, 77),
        };
        let mut a = Bitmap::new(16, 8).unwrap();
        let mut b = a.clone();
        line.apply(&mut a).unwrap();
        line.apply(&mut b).unwrap();
        assert_eq!(a, b);
    }
}
