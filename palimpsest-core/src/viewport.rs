//! # Viewport
//!
//! The camera over the canvas. Undo and redo never move it, but it is shared with UI code that may be
//! moving it concurrently, so [`crate::undo_redo::UndoRedoManager`] captures it before an operation and
//! puts it back afterwards.

use cgmath::{EuclideanSpace, Point2, Vector2};

/// Uniform scale followed by a translation, mapping canvas space to view space.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct ViewTransform {
    pub scale: f32,
    /// Position of the canvas's top-left corner, in view space.
    pub translation: Vector2<f32>,
}
impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            translation: Vector2::new(0.0, 0.0),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// Scale has collapsed to zero (or NaN) and the view can no longer be inverted.
    #[error("uninvertable")]
    Uninvertable,
}

impl ViewTransform {
    /// Scale about this center in viewspace such that the center remains in the same spot in the viewport after scaling.
    pub fn scale_about(&mut self, view_center: Point2<f32>, scale_by: f32) {
        // vec from center to top-left
        let local_center = view_center.to_vec() - self.translation;
        self.scale *= scale_by;
        self.translation = view_center.to_vec() - local_center * scale_by;
    }
    /// Pan by this displacement in viewspace.
    pub fn pan(&mut self, delta: Vector2<f32>) {
        self.translation += delta;
    }
    /// Convert this point in canvas space to view space.
    #[must_use]
    pub fn project(&self, canvas_point: Point2<f32>) -> Point2<f32> {
        Point2::from_vec(canvas_point.to_vec() * self.scale + self.translation)
    }
    /// Convert this point in view space to canvas space.
    /// # Errors
    /// If the scale is degenerate.
    pub fn unproject(&self, view_point: Point2<f32>) -> Result<Point2<f32>, TransformError> {
        if !self.scale.is_normal() {
            return Err(TransformError::Uninvertable);
        }
        Ok(Point2::from_vec(
            (view_point.to_vec() - self.translation) / self.scale,
        ))
    }
}

/// The transform as shared between the UI and the undo machinery.
pub type SharedView = std::sync::Arc<parking_lot::RwLock<ViewTransform>>;

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn scale_about_keeps_center() {
        let mut view = ViewTransform::default();
        view.pan(Vector2::new(10.0, -4.0));
        let center = Point2::new(50.0, 30.0);
        let before = view.unproject(center).unwrap();
        view.scale_about(center, 2.5);
        let after = view.unproject(center).unwrap();
        assert!((before.x - after.x).abs() < 1e-4 && (before.y - after.y).abs() < 1e-4);
        assert!((view.scale - 2.5).abs() < f32::EPSILON);
    }
    #[test]
    fn project_unproject() {
        let view = ViewTransform {
            scale: 0.5,
            translation: Vector2::new(3.0, 7.0),
        };
        let point = Point2::new(8.0, 2.0);
        assert_eq!(view.project(point), Point2::new(7.0, 8.0));
        assert_eq!(view.unproject(view.project(point)).unwrap(), point);
    }
    #[test]
    fn degenerate() {
        let view = ViewTransform {
            scale: 0.0,
            ..Default::default()
        };
        assert!(view.unproject(Point2::new(0.0, 0.0)).is_err());
    }
}
