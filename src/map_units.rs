use crate::error::ProcessError;
use geo_types::{Rect, coord};

/// Extent and pixel size of the image a request renders into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapContext {
    pub bbox: Rect<f64>,
    pub image_width: u32,
    pub image_height: u32,
}

impl MapContext {
    pub fn new(bbox: Rect<f64>, image_width: u32, image_height: u32) -> Result<Self, ProcessError> {
        if image_width < 1 || image_height < 1 {
            return Err(ProcessError::configuration(format!(
                "image size must be at least 1x1 pixels, got {}x{}",
                image_width, image_height
            )));
        }
        let (min, max) = (bbox.min(), bbox.max());
        if [min.x, min.y, max.x, max.y].iter().any(|v| !v.is_finite()) {
            return Err(ProcessError::configuration(format!(
                "bbox coordinates must be finite, got ({}, {}, {}, {})",
                min.x, min.y, max.x, max.y
            )));
        }
        if bbox.width() <= 0.0 || bbox.height() <= 0.0 {
            return Err(ProcessError::configuration(format!(
                "bbox must have a positive extent, got {}x{}",
                bbox.width(),
                bbox.height()
            )));
        }
        Ok(Self {
            bbox,
            image_width,
            image_height,
        })
    }

    pub fn from_bounds(
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
        image_width: u32,
        image_height: u32,
    ) -> Result<Self, ProcessError> {
        let bbox = Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y });
        Self::new(bbox, image_width, image_height)
    }

    pub fn pixels_to_map_units(&self, pixels: f64) -> f64 {
        pixel_distance_to_map_units(
            self.bbox.width(),
            self.bbox.height(),
            self.image_width,
            self.image_height,
            pixels,
        )
    }
}

/// Converts a distance in pixels to map units.
///
/// The x and y resolutions are averaged so a slightly skewed image request
/// still yields one usable factor.
pub fn pixel_distance_to_map_units(
    bbox_width: f64,
    bbox_height: f64,
    image_width: u32,
    image_height: u32,
    pixels: f64,
) -> f64 {
    let units_per_pixel_x = bbox_width / image_width as f64;
    let units_per_pixel_y = bbox_height / image_height as f64;

    ((units_per_pixel_x + units_per_pixel_y) / 2.0) * pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_square_request() {
        // 1000 map units over 100 pixels: 10 units per pixel
        let ctx = MapContext::from_bounds(0.0, 0.0, 1000.0, 1000.0, 100, 100).unwrap();
        assert_eq!(ctx.pixels_to_map_units(8.0), 80.0);
        assert_eq!(ctx.pixels_to_map_units(0.0), 0.0);
    }

    #[test]
    fn test_skewed_request_averages_axes() {
        let ctx = MapContext::from_bounds(0.0, 0.0, 200.0, 100.0, 100, 100).unwrap();
        // x: 2 units/px, y: 1 unit/px
        assert!((ctx.pixels_to_map_units(10.0) - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_sized_image_is_rejected() {
        let result = MapContext::from_bounds(0.0, 0.0, 1.0, 1.0, 0, 10);
        assert!(matches!(result, Err(ProcessError::Configuration(_))));
    }

    #[test]
    fn test_empty_or_invalid_bbox_is_rejected() {
        let flat = MapContext::from_bounds(5.0, 5.0, 5.0, -5.0, 100, 100);
        assert!(matches!(flat, Err(ProcessError::Configuration(_))));

        let point = MapContext::from_bounds(1.0, 1.0, 1.0, 1.0, 100, 100);
        assert!(matches!(point, Err(ProcessError::Configuration(_))));

        let nan = MapContext::from_bounds(0.0, f64::NAN, 10.0, 10.0, 100, 100);
        assert!(matches!(nan, Err(ProcessError::Configuration(_))));

        let infinite = MapContext::from_bounds(0.0, 0.0, f64::INFINITY, 10.0, 100, 100);
        assert!(matches!(infinite, Err(ProcessError::Configuration(_))));
    }

    #[test]
    fn test_reversed_corners_are_accepted() {
        let ctx = MapContext::from_bounds(10.0, 10.0, 0.0, 0.0, 10, 10).unwrap();
        assert_eq!(ctx.pixels_to_map_units(2.0), 2.0);
    }

    proptest! {
        #[test]
        fn conversion_is_linear(
            w in 0.001f64..1e6,
            h in 0.001f64..1e6,
            px_w in 1u32..4096,
            px_h in 1u32..4096,
            x in -1000.0f64..1000.0,
        ) {
            let once = pixel_distance_to_map_units(w, h, px_w, px_h, x);
            let twice = pixel_distance_to_map_units(w, h, px_w, px_h, 2.0 * x);
            prop_assert!((twice - 2.0 * once).abs() <= 1e-9 * once.abs().max(1.0));
            prop_assert_eq!(pixel_distance_to_map_units(w, h, px_w, px_h, 0.0), 0.0);
        }
    }
}
