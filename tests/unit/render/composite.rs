use super::*;
use crate::surface::PixelSurface;

const BLACK: Rgba8Premul = Rgba8Premul {
    r: 0,
    g: 0,
    b: 0,
    a: 255,
};

fn solid(canvas: Canvas, rgba: [u8; 4]) -> Arc<PixelSurface> {
    let color = Rgba8Premul::from_straight_rgba(rgba[0], rgba[1], rgba[2], rgba[3]);
    Arc::new(PixelSurface::from_frame(
        FrameRGBA::filled(canvas, color).unwrap(),
    ))
}

struct Broken {
    id: SurfaceId,
}

impl RenderSurface for Broken {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn pixel_size(&self) -> Canvas {
        Canvas::new(4, 4)
    }

    fn draw_into(&self, _target: &mut FrameRGBA, _dst: kurbo::Rect) -> StrataResult<()> {
        Err(StrataError::surface("not ready"))
    }
}

#[test]
fn over_fast_paths() {
    assert_eq!(over([1, 2, 3, 4], [0, 0, 0, 0]), [1, 2, 3, 4]);
    assert_eq!(over([1, 2, 3, 4], [9, 8, 7, 255]), [9, 8, 7, 255]);
    assert_eq!(over([0, 0, 0, 255], [128, 0, 0, 128]), [128, 0, 0, 255]);
}

#[test]
fn stretch_2x2_into_4x4_replicates_quadrants() {
    let mut src = FrameRGBA::new(Canvas::new(2, 2)).unwrap();
    src.data = vec![
        255, 0, 0, 255, 0, 255, 0, 255, //
        0, 0, 255, 255, 255, 255, 255, 255,
    ];
    let mut dst = FrameRGBA::filled(Canvas::new(4, 4), BLACK).unwrap();
    let rect = dst.canvas().rect();
    blit_stretched_over(&mut dst, &src, rect).unwrap();

    assert_eq!(dst.pixel(0, 0), Some([255, 0, 0, 255]));
    assert_eq!(dst.pixel(1, 1), Some([255, 0, 0, 255]));
    assert_eq!(dst.pixel(3, 0), Some([0, 255, 0, 255]));
    assert_eq!(dst.pixel(0, 3), Some([0, 0, 255, 255]));
    assert_eq!(dst.pixel(3, 3), Some([255, 255, 255, 255]));
}

#[test]
fn blit_into_sub_rect_leaves_outside_untouched() {
    let src = FrameRGBA::filled(Canvas::new(1, 1), Rgba8Premul::from_straight_rgba(255, 255, 255, 255))
        .unwrap();
    let mut dst = FrameRGBA::filled(Canvas::new(4, 4), BLACK).unwrap();
    blit_stretched_over(&mut dst, &src, kurbo::Rect::new(2.0, 2.0, 8.0, 8.0)).unwrap();

    assert_eq!(dst.pixel(1, 1), Some([0, 0, 0, 255]));
    assert_eq!(dst.pixel(2, 2), Some([255, 255, 255, 255]));
    assert_eq!(dst.pixel(3, 3), Some([255, 255, 255, 255]));
}

#[test]
fn blit_rejects_zero_sized_source() {
    let src = FrameRGBA::new(Canvas::new(0, 0)).unwrap();
    let mut dst = FrameRGBA::new(Canvas::new(2, 2)).unwrap();
    let rect = dst.canvas().rect();
    assert!(blit_stretched_over(&mut dst, &src, rect).is_err());
}

#[test]
fn compositor_rejects_translucent_background_and_empty_size() {
    assert!(Compositor::new(Canvas::new(4, 4), Rgba8Premul::transparent()).is_err());
    assert!(Compositor::new(Canvas::new(0, 4), BLACK).is_err());
}

#[test]
fn empty_tick_is_background_only() {
    let mut c = Compositor::new(Canvas::new(3, 3), BLACK).unwrap();
    let report = c.composite(&[]);
    assert_eq!(report, CompositeReport::default());
    assert!(c.frame().data.chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
}

#[test]
fn later_layers_draw_over_earlier_ones() {
    let canvas = Canvas::new(4, 4);
    let bottom = solid(canvas, [255, 0, 0, 255]);
    let top = solid(Canvas::new(2, 2), [0, 0, 255, 255]);
    let mut c = Compositor::new(canvas, BLACK).unwrap();

    let surfaces: Vec<Arc<dyn RenderSurface>> = vec![bottom, top];
    let report = c.composite(&surfaces);
    assert_eq!(report.drawn, 2);
    assert!(c.frame().data.chunks_exact(4).all(|px| px == [0, 0, 255, 255]));
}

#[test]
fn translucent_layer_blends_over_background() {
    let canvas = Canvas::new(2, 2);
    let mut c = Compositor::new(canvas, BLACK).unwrap();
    let surfaces: Vec<Arc<dyn RenderSurface>> = vec![solid(canvas, [255, 255, 255, 0])];
    c.composite(&surfaces);
    assert_eq!(c.frame().pixel(0, 0), Some([0, 0, 0, 255]));
}

#[test]
fn failing_surface_is_skipped_and_counted() {
    let canvas = Canvas::new(4, 4);
    let broken = Arc::new(Broken {
        id: SurfaceId::next(),
    });
    let good = solid(canvas, [0, 255, 0, 255]);
    let mut c = Compositor::new(canvas, BLACK)
        .unwrap()
        .with_failure_warn_threshold(2);

    let surfaces: Vec<Arc<dyn RenderSurface>> = vec![good, broken.clone()];
    for _ in 0..3 {
        let report = c.composite(&surfaces);
        assert_eq!(report.drawn, 1);
        assert_eq!(report.failed, 1);
    }
    assert_eq!(c.consecutive_failures(broken.id), 3);
    assert_eq!(c.frame().pixel(2, 2), Some([0, 255, 0, 255]));
}

struct Flaky {
    id: SurfaceId,
    fail: std::sync::atomic::AtomicBool,
}

impl RenderSurface for Flaky {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn pixel_size(&self) -> Canvas {
        Canvas::new(2, 2)
    }

    fn draw_into(&self, target: &mut FrameRGBA, _dst: kurbo::Rect) -> StrataResult<()> {
        if self.fail.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(StrataError::surface("detached"));
        }
        target.fill(Rgba8Premul::from_straight_rgba(9, 9, 9, 255));
        Ok(())
    }
}

#[test]
fn successful_draw_resets_failure_count() {
    let flaky = Arc::new(Flaky {
        id: SurfaceId::next(),
        fail: std::sync::atomic::AtomicBool::new(true),
    });
    let mut c = Compositor::new(Canvas::new(2, 2), BLACK).unwrap();
    let surfaces: Vec<Arc<dyn RenderSurface>> = vec![flaky.clone()];

    c.composite(&surfaces);
    c.composite(&surfaces);
    assert_eq!(c.consecutive_failures(flaky.id), 2);

    flaky
        .fail
        .store(false, std::sync::atomic::Ordering::Relaxed);
    assert_eq!(c.composite(&surfaces).drawn, 1);
    assert_eq!(c.consecutive_failures(flaky.id), 0);
    assert_eq!(c.frame().pixel(1, 1), Some([9, 9, 9, 255]));
}

#[test]
fn released_surface_degrades_only_its_layer() {
    let canvas = Canvas::new(2, 2);
    let base = solid(canvas, [0, 0, 255, 255]);
    let top = solid(canvas, [255, 0, 0, 255]);
    let mut c = Compositor::new(canvas, BLACK).unwrap();
    let surfaces: Vec<Arc<dyn RenderSurface>> = vec![base, top.clone()];

    top.release();
    let report = c.composite(&surfaces);
    assert_eq!((report.drawn, report.failed), (1, 1));
    assert_eq!(c.frame().pixel(0, 0), Some([0, 0, 255, 255]));
}

#[test]
fn hidden_surface_is_not_drawn() {
    let canvas = Canvas::new(2, 2);
    let s = solid(canvas, [255, 255, 255, 255]);
    s.set_presented(false);
    let mut c = Compositor::new(canvas, BLACK).unwrap();
    let surfaces: Vec<Arc<dyn RenderSurface>> = vec![s];
    let report = c.composite(&surfaces);
    assert_eq!(report.hidden, 1);
    assert_eq!(report.drawn, 0);
    assert_eq!(c.frame().pixel(0, 0), Some([0, 0, 0, 255]));
}

struct Panicky {
    id: SurfaceId,
}

impl RenderSurface for Panicky {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn pixel_size(&self) -> Canvas {
        Canvas::new(2, 2)
    }

    fn draw_into(&self, _target: &mut FrameRGBA, _dst: kurbo::Rect) -> StrataResult<()> {
        panic!("surface backend lost");
    }
}

#[test]
fn panicking_surface_counts_as_failed_draw() {
    let canvas = Canvas::new(2, 2);
    let panicky = Arc::new(Panicky {
        id: SurfaceId::next(),
    });
    let top = solid(canvas, [255, 0, 0, 255]);
    let mut c = Compositor::new(canvas, BLACK).unwrap();
    let surfaces: Vec<Arc<dyn RenderSurface>> = vec![panicky.clone(), top];

    for _ in 0..2 {
        let report = c.composite(&surfaces);
        assert_eq!((report.drawn, report.failed), (1, 1));
    }
    assert_eq!(c.consecutive_failures(panicky.id), 2);
    assert_eq!(c.frame().pixel(1, 1), Some([255, 0, 0, 255]));
}
