//! Ribbon polygons built from two offset curves of the same line.
//!
//! ```text
//!      o            +---o---+
//!      |            |   |   |
//!      o     ->     |   o   |
//!       \            \   \   \
//!        o            \  -o- +
//!                      +/
//! ```

use crate::error::GeometryError;
use crate::offset_curve::OffsetCurveBuilder;
use geo::line_intersection::{LineIntersection, line_intersection};
use geo_types::{Coord, Line, LineString, Polygon};
use log::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct PolygonAssembler {
    curve_builder: OffsetCurveBuilder,
    center_on_line: bool,
    remove_artifacts: bool,
}

impl PolygonAssembler {
    pub fn new(center_on_line: bool, remove_artifacts: bool) -> Self {
        Self {
            curve_builder: OffsetCurveBuilder::new(),
            center_on_line,
            remove_artifacts,
        }
    }

    pub fn center_on_line(&self) -> bool {
        self.center_on_line
    }

    /// Builds the ribbon for `line`. `width` and `offset` are in map units;
    /// `offset` is ignored when the polygon is centered on the line.
    pub fn convert(
        &self,
        line: &LineString<f64>,
        width: f64,
        offset: f64,
    ) -> Result<Polygon<f64>, GeometryError> {
        let (first, second) = side_offsets(width, offset, self.center_on_line)?;
        debug!(
            "Drawing polygon with width={}, center_on_line={}, remove_artifacts={} using offsets {} and {}",
            width, self.center_on_line, self.remove_artifacts, first, second
        );

        // both sides are offset from the input line, never from each other
        let side0 = self.curve_builder.build_offset(&line.0, first)?;
        let side1 = self.curve_builder.build_offset(&line.0, second)?;

        let mut ring: Vec<Coord<f64>> = Vec::with_capacity(side0.len() + side1.len() + 1);
        ring.extend_from_slice(&side0);
        ring.extend(side1.iter().rev());
        let closing = side0.first().copied().ok_or(GeometryError::DegenerateGeometry {
            points: line.0.len(),
        })?;
        ring.push(closing);

        if self.remove_artifacts {
            ring = cut_loops(&ring);
        }

        if ring.len() < 4 || ring.first() != ring.last() {
            return Err(GeometryError::InvalidRing { points: ring.len() });
        }
        Ok(Polygon::new(LineString::new(ring), vec![]))
    }
}

/// The two offsets the sides of the ribbon are drawn at.
///
/// Centered ribbons straddle the line. Otherwise the ribbon starts at `offset`
/// and extends `width` further away from the line, so the sign of `offset`
/// picks the side.
pub fn side_offsets(
    width: f64,
    offset: f64,
    center_on_line: bool,
) -> Result<(f64, f64), GeometryError> {
    if !width.is_finite() || width <= 0.0 {
        return Err(GeometryError::InvalidWidth { width });
    }
    if center_on_line {
        return Ok((-width / 2.0, width / 2.0));
    }
    if offset == 0.0 {
        return Err(GeometryError::UndefinedWidthDirection);
    }
    Ok((offset, offset + width * offset.signum()))
}

/// Cuts small self-loops out of a closed ring.
///
/// Each segment is tested against every later, non-adjacent segment. At the
/// first crossing that is not just the segment's own end point, the vertices in
/// between are replaced by the crossing and the walk continues on the later
/// segment. Quadratic in the ring length and a heuristic: it removes the loops
/// offsetting leaves at sharp joins, it does not make arbitrary rings simple.
pub fn cut_loops(ring: &[Coord<f64>]) -> Vec<Coord<f64>> {
    if ring.len() < 4 {
        return ring.to_vec();
    }
    let segment_count = ring.len() - 1;
    let segment = |j: usize| Line::new(ring[j], ring[j + 1]);

    let mut kept = Vec::with_capacity(ring.len());
    kept.push(ring[0]);
    let mut start = ring[0];
    let mut i = 0;

    while i < segment_count {
        let current = Line::new(start, ring[i + 1]);

        let cut = ((i + 2)..segment_count)
            // the closing segment shares the ring's first vertex with the first segment
            .filter(|&j| !(i == 0 && j == segment_count - 1))
            .find_map(|j| {
                crossing(current, segment(j))
                    .filter(|point| *point != current.end)
                    .map(|point| (j, point))
            });

        match cut {
            Some((j, point)) => {
                kept.push(point);
                start = point;
                i = j;
            }
            None => {
                kept.push(ring[i + 1]);
                start = ring[i + 1];
                i += 1;
            }
        }
    }

    kept.dedup();
    kept
}

/// Where `a` meets `b`; for overlapping segments the overlap end nearest to `a.start`.
fn crossing(a: Line<f64>, b: Line<f64>) -> Option<Coord<f64>> {
    match line_intersection(a, b)? {
        LineIntersection::SinglePoint { intersection, .. } => Some(intersection),
        LineIntersection::Collinear { intersection } => {
            let to_start = |c: Coord<f64>| (c.x - a.start.x).hypot(c.y - a.start.y);
            if to_start(intersection.start) <= to_start(intersection.end) {
                Some(intersection.start)
            } else {
                Some(intersection.end)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{coord, line_string};

    #[test]
    fn test_centered_offsets_are_symmetric() {
        let (a, b) = side_offsets(6.0, 123.0, true).unwrap();
        assert_eq!(a + b, 0.0);
        assert_eq!(b - a, 6.0);
    }

    #[test]
    fn test_width_extends_away_from_the_line() {
        assert_eq!(side_offsets(4.0, 2.0, false).unwrap(), (2.0, 6.0));
        assert_eq!(side_offsets(4.0, -2.0, false).unwrap(), (-2.0, -6.0));
        assert_eq!(
            side_offsets(4.0, 0.0, false),
            Err(GeometryError::UndefinedWidthDirection)
        );
    }

    #[test]
    fn test_straight_line_ribbon() {
        let line = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)];
        let polygon = PolygonAssembler::new(true, false)
            .convert(&line, 2.0, 0.0)
            .unwrap();

        let expected = vec![
            coord! { x: 0.0, y: -1.0 },
            coord! { x: 10.0, y: -1.0 },
            coord! { x: 10.0, y: 1.0 },
            coord! { x: 0.0, y: 1.0 },
            coord! { x: 0.0, y: -1.0 },
        ];
        assert_eq!(polygon.exterior().0, expected);
        assert!(polygon.interiors().is_empty());
    }

    #[test]
    fn test_offset_ribbon_sits_beside_the_line() {
        let line = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)];
        let polygon = PolygonAssembler::new(false, false)
            .convert(&line, 3.0, -1.0)
            .unwrap();
        let ys: Vec<f64> = polygon.exterior().0.iter().map(|c| c.y).collect();
        assert!(ys.iter().all(|y| (-4.0..=-1.0).contains(y)));
        assert!(ys.contains(&-4.0));
    }

    #[test]
    fn test_degenerate_line_propagates() {
        let line = line_string![(x: 1.0, y: 1.0)];
        let result = PolygonAssembler::new(true, false).convert(&line, 2.0, 0.0);
        assert_eq!(result, Err(GeometryError::DegenerateGeometry { points: 1 }));
    }

    #[test]
    fn test_zero_width_is_rejected() {
        let line = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)];
        let assembler = PolygonAssembler::new(true, false);
        assert_eq!(
            assembler.convert(&line, 0.0, 0.0),
            Err(GeometryError::InvalidWidth { width: 0.0 })
        );
        assert!(matches!(
            assembler.convert(&line, f64::NAN, 0.0),
            Err(GeometryError::InvalidWidth { .. })
        ));
        assert_eq!(
            side_offsets(-2.0, 1.0, false),
            Err(GeometryError::InvalidWidth { width: -2.0 })
        );
    }

    #[test]
    fn test_empty_line_is_an_error() {
        let empty = LineString::new(vec![]);
        for (width, center) in [(0.0, true), (2.0, true), (2.0, false)] {
            let result = PolygonAssembler::new(center, false).convert(&empty, width, 1.0);
            assert!(result.is_err());
        }
        assert_eq!(
            PolygonAssembler::new(true, false).convert(&empty, 2.0, 0.0),
            Err(GeometryError::DegenerateGeometry { points: 0 })
        );
    }

    #[test]
    fn test_cut_loops_removes_a_self_loop() {
        let ring = vec![
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 6.0, y: 0.0 },
            coord! { x: 6.0, y: 2.0 },
            coord! { x: 4.0, y: 2.0 },
            coord! { x: 4.0, y: -2.0 },
            coord! { x: 10.0, y: -2.0 },
            coord! { x: 10.0, y: 5.0 },
            coord! { x: 0.0, y: 5.0 },
            coord! { x: 0.0, y: 0.0 },
        ];
        let expected = vec![
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 4.0, y: 0.0 },
            coord! { x: 4.0, y: -2.0 },
            coord! { x: 10.0, y: -2.0 },
            coord! { x: 10.0, y: 5.0 },
            coord! { x: 0.0, y: 5.0 },
            coord! { x: 0.0, y: 0.0 },
        ];
        assert_eq!(cut_loops(&ring), expected);
    }

    #[test]
    fn test_cut_loops_keeps_simple_rings() {
        let ring = vec![
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 10.0, y: 0.0 },
            coord! { x: 10.0, y: 10.0 },
            coord! { x: 0.0, y: 10.0 },
            coord! { x: 0.0, y: 0.0 },
        ];
        assert_eq!(cut_loops(&ring), ring);
    }

    #[test]
    fn test_sharp_join_loop_is_cut_at_the_crossing() {
        // a hairpin with a wide ribbon makes the inner side fold over itself
        let line = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 0.0, y: 1.0)];
        let plain = PolygonAssembler::new(true, false)
            .convert(&line, 6.0, 0.0)
            .unwrap();
        let cleaned = PolygonAssembler::new(true, true)
            .convert(&line, 6.0, 0.0)
            .unwrap();

        let vertex = coord! { x: 10.0, y: 0.0 };
        let plain_ring = &plain.exterior().0;
        assert!(plain_ring.contains(&vertex));

        // the inner side folds back through the hairpin vertex; the cut
        // replaces that fold with the point where the sides cross
        let ring = &cleaned.exterior().0;
        assert_eq!(ring.first(), ring.last());
        assert!(!ring.contains(&vertex));
        assert!(
            ring.iter()
                .any(|c| (c.x - 0.2).abs() < 1e-9 && (c.y - 3.0).abs() < 1e-9)
        );
        assert_eq!(ring.len(), plain_ring.len() - 3);
    }
}
