// Zoom and pan state for the schedule image viewer

use serde::Serialize;

pub const MIN_SCALE: f64 = 0.5;
pub const MAX_SCALE: f64 = 5.0;
pub const BUTTON_STEP: f64 = 0.5;
pub const WHEEL_STEP: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DragStart {
    pointer: Point,
    pan: Point,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PinchStart {
    distance: f64,
    scale: f64,
}

/// Input-to-transform state machine. Holds no image, only the container size
/// that bounds panning.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomView {
    scale: f64,
    pan: Point,
    width: f64,
    height: f64,
    drag: Option<DragStart>,
    pinch: Option<PinchStart>,
}

impl ZoomView {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            scale: 1.0,
            pan: Point::ORIGIN,
            width: width.max(0.0),
            height: height.max(0.0),
            drag: None,
            pinch: None,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn pan(&self) -> Point {
        self.pan
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Largest horizontal pan: half of the overflow at the current scale.
    pub fn max_pan_x(&self) -> f64 {
        (self.width * (self.scale - 1.0) / 2.0).max(0.0)
    }

    pub fn max_pan_y(&self) -> f64 {
        (self.height * (self.scale - 1.0) / 2.0).max(0.0)
    }

    /// Called whenever the hosting dialog opens.
    pub fn reset(&mut self) {
        self.scale = 1.0;
        self.pan = Point::ORIGIN;
        self.drag = None;
        self.pinch = None;
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width.max(0.0);
        self.height = height.max(0.0);
        self.clamp_pan();
    }

    pub fn zoom_in(&mut self) {
        self.set_scale(self.scale + BUTTON_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.set_scale(self.scale - BUTTON_STEP);
    }

    /// Scrolling up (negative delta) zooms in.
    pub fn wheel(&mut self, delta_y: f64) {
        if delta_y < 0.0 {
            self.set_scale(self.scale + WHEEL_STEP);
        } else if delta_y > 0.0 {
            self.set_scale(self.scale - WHEEL_STEP);
        }
    }

    pub fn pinch_start(&mut self, first: Point, second: Point) {
        let distance = first.distance(second);
        self.drag = None;
        self.pinch = (distance > 0.0).then_some(PinchStart {
            distance,
            scale: self.scale,
        });
    }

    pub fn pinch_move(&mut self, first: Point, second: Point) {
        if let Some(start) = self.pinch {
            let ratio = first.distance(second) / start.distance;
            self.set_scale(start.scale * ratio);
        }
    }

    /// A finger lifted; with one left the gesture continues as a drag from it.
    pub fn touch_end(&mut self, remaining: Option<Point>) {
        self.pinch = None;
        match remaining {
            Some(pointer) => self.drag_start(pointer),
            None => self.drag_end(),
        }
    }

    pub fn drag_start(&mut self, pointer: Point) {
        self.drag = (self.scale > 1.0).then_some(DragStart {
            pointer,
            pan: self.pan,
        });
    }

    pub fn drag_move(&mut self, pointer: Point) {
        if let Some(start) = self.drag {
            self.pan = Point::new(
                start.pan.x + (pointer.x - start.pointer.x),
                start.pan.y + (pointer.y - start.pointer.y),
            );
            self.clamp_pan();
        }
    }

    pub fn drag_end(&mut self) {
        self.drag = None;
    }

    fn set_scale(&mut self, scale: f64) {
        if scale.is_finite() {
            self.scale = scale.clamp(MIN_SCALE, MAX_SCALE);
        }
        self.clamp_pan();
    }

    fn clamp_pan(&mut self) {
        if self.scale <= 1.0 {
            self.pan = Point::ORIGIN;
            self.drag = None;
            return;
        }
        let (max_x, max_y) = (self.max_pan_x(), self.max_pan_y());
        self.pan = Point::new(self.pan.x.clamp(-max_x, max_x), self.pan.y.clamp(-max_y, max_y));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_bounded(view: &ZoomView) {
        assert!((MIN_SCALE..=MAX_SCALE).contains(&view.scale()));
        if view.scale() <= 1.0 {
            assert_eq!(view.pan(), Point::ORIGIN);
        } else {
            assert!(view.pan().x.abs() <= view.max_pan_x());
            assert!(view.pan().y.abs() <= view.max_pan_y());
        }
    }

    #[test]
    fn scale_stays_within_bounds_for_any_button_or_wheel_sequence() {
        let mut view = ZoomView::new(400.0, 300.0);
        for _ in 0..20 {
            view.zoom_in();
            assert_bounded(&view);
        }
        assert_eq!(view.scale(), MAX_SCALE);

        for _ in 0..100 {
            view.wheel(120.0);
            assert_bounded(&view);
        }
        assert_eq!(view.scale(), MIN_SCALE);

        view.wheel(-1.0);
        assert!((view.scale() - 0.6).abs() < 1e-9);
        view.zoom_out();
        assert_eq!(view.scale(), MIN_SCALE);
    }

    #[test]
    fn drag_is_clamped_to_half_the_overflow() {
        let mut view = ZoomView::new(400.0, 300.0);
        view.zoom_in();
        view.zoom_in(); // 2.0

        view.drag_start(Point::new(10.0, 10.0));
        view.drag_move(Point::new(1_000.0, -1_000.0));
        assert_eq!(view.pan(), Point::new(200.0, -150.0));

        view.drag_move(Point::new(30.0, 20.0));
        assert_eq!(view.pan(), Point::new(20.0, 10.0));
        assert_bounded(&view);
    }

    #[test]
    fn drag_does_nothing_at_base_scale() {
        let mut view = ZoomView::new(400.0, 300.0);
        view.drag_start(Point::new(0.0, 0.0));
        view.drag_move(Point::new(50.0, 50.0));
        assert!(!view.is_dragging());
        assert_eq!(view.pan(), Point::ORIGIN);
    }

    #[test]
    fn zooming_out_pulls_the_image_back_on_screen() {
        let mut view = ZoomView::new(400.0, 300.0);
        view.set_scale(3.0);
        view.drag_start(Point::ORIGIN);
        view.drag_move(Point::new(-500.0, 500.0));
        assert_eq!(view.pan(), Point::new(-400.0, 300.0));

        view.zoom_out(); // 2.5
        assert_eq!(view.pan(), Point::new(-300.0, 225.0));

        view.zoom_out();
        view.zoom_out(); // 1.5
        view.zoom_out(); // 1.0
        assert_eq!(view.pan(), Point::ORIGIN);
    }

    #[test]
    fn pinch_scales_from_the_baseline_and_hands_off_to_drag() {
        let mut view = ZoomView::new(400.0, 300.0);
        view.pinch_start(Point::new(100.0, 100.0), Point::new(200.0, 100.0));
        view.pinch_move(Point::new(50.0, 100.0), Point::new(250.0, 100.0));
        assert!((view.scale() - 2.0).abs() < 1e-9);

        view.pinch_move(Point::new(0.0, 0.0), Point::new(2_000.0, 0.0));
        assert_eq!(view.scale(), MAX_SCALE);

        view.touch_end(Some(Point::new(0.0, 0.0)));
        assert!(view.is_dragging());
        view.drag_move(Point::new(40.0, 0.0));
        assert_eq!(view.pan(), Point::new(40.0, 0.0));
    }

    #[test]
    fn degenerate_pinch_is_ignored() {
        let mut view = ZoomView::new(400.0, 300.0);
        view.pinch_start(Point::new(5.0, 5.0), Point::new(5.0, 5.0));
        view.pinch_move(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        assert_eq!(view.scale(), 1.0);
    }

    #[test]
    fn reset_restores_identity() {
        let mut view = ZoomView::new(400.0, 300.0);
        view.zoom_in();
        view.drag_start(Point::ORIGIN);
        view.drag_move(Point::new(30.0, 30.0));

        view.reset();
        assert_eq!(view.scale(), 1.0);
        assert_eq!(view.pan(), Point::ORIGIN);
        assert!(!view.is_dragging());
    }
}
