//! CPU raster backend (tiny-skia).
//!
//! Immediate-mode: every edge, halo, node and signal is its own path draw, so
//! there is nothing to batch. Glow is a blur-shadow approximation built from a
//! few translucent halos around each node, additive on dark themes.

use tiny_skia::{BlendMode, Color, FillRule, Paint, PathBuilder, Pixmap, Stroke, Transform};

use super::{
    edge_style, node_style, signal_style, BackendKind, FrameView, RenderBackend, RenderError,
    RenderStats, Scene, SHADOW_BLUR,
};
use crate::palette::Rgba;
use crate::topology::Point;

/// Concentric rings used to fake the blur shadow.
const HALO_RINGS: usize = 3;

pub struct RasterBackend {
    pixmap: Option<Pixmap>,
    width: u32,
    height: u32,
    disposed: bool,
}

fn to_color(c: Rgba) -> Option<Color> {
    Color::from_rgba(
        c.r.clamp(0.0, 1.0),
        c.g.clamp(0.0, 1.0),
        c.b.clamp(0.0, 1.0),
        c.a.clamp(0.0, 1.0),
    )
}

fn paint_for(c: Rgba, blend_mode: BlendMode) -> Option<Paint<'static>> {
    let mut paint = Paint::default();
    paint.set_color(to_color(c)?);
    paint.anti_alias = true;
    paint.blend_mode = blend_mode;
    Some(paint)
}

impl RasterBackend {
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        let mut backend = Self {
            pixmap: None,
            width: 0,
            height: 0,
            disposed: false,
        };
        backend.resize(width, height)?;
        Ok(backend)
    }

    fn fill_circle(pixmap: &mut Pixmap, center: Point, radius: f32, paint: &Paint<'_>) -> bool {
        if radius <= 0.0 {
            return false;
        }
        match PathBuilder::from_circle(center.x, center.y, radius) {
            Some(path) => {
                pixmap.fill_path(&path, paint, FillRule::Winding, Transform::identity(), None);
                true
            }
            None => false,
        }
    }
}

impl RenderBackend for RasterBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Raster
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        let empty = width == 0 || height == 0;
        if width == self.width && height == self.height && (self.pixmap.is_some() || empty) {
            return Ok(());
        }
        self.width = width;
        self.height = height;
        self.pixmap = if width == 0 || height == 0 {
            // Nothing to draw into until a usable size arrives.
            None
        } else {
            Some(Pixmap::new(width, height).ok_or(RenderError::Surface { width, height })?)
        };
        Ok(())
    }

    fn render(&mut self, scene: &Scene<'_>) -> Result<RenderStats, RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        let Some(pixmap) = self.pixmap.as_mut() else {
            return Ok(RenderStats::default());
        };
        pixmap.fill(Color::TRANSPARENT);
        let mut draw_calls = 0u32;
        // Additive halos wash out on light backgrounds.
        let halo_blend = if scene.theme.is_dark() {
            BlendMode::Plus
        } else {
            BlendMode::SourceOver
        };

        for id in 0..scene.edges.len() {
            let Some(style) = edge_style(scene, id) else {
                continue;
            };
            let Some(paint) = paint_for(style.color, BlendMode::SourceOver) else {
                continue;
            };
            let mut pb = PathBuilder::new();
            pb.move_to(style.from.x, style.from.y);
            pb.line_to(style.to.x, style.to.y);
            if let Some(path) = pb.finish() {
                let stroke = Stroke {
                    width: style.width,
                    ..Stroke::default()
                };
                pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
                draw_calls += 1;
            }
        }

        for id in 0..scene.nodes.len() {
            let Some(style) = node_style(scene, id) else {
                continue;
            };

            let blur = SHADOW_BLUR * style.glow;
            if blur > 0.5 {
                for ring in (1..=HALO_RINGS).rev() {
                    let t = ring as f32 / HALO_RINGS as f32;
                    let halo = style.color.fade(0.18 * (1.0 - t * 0.6));
                    if let Some(paint) = paint_for(halo, halo_blend) {
                        let radius = style.radius + blur * t;
                        if Self::fill_circle(pixmap, style.center, radius, &paint) {
                            draw_calls += 1;
                        }
                    }
                }
            }

            if let Some(paint) = paint_for(style.color, BlendMode::SourceOver) {
                if Self::fill_circle(pixmap, style.center, style.radius, &paint) {
                    draw_calls += 1;
                }
            }
            if let Some(core) = style.core.and_then(|c| paint_for(c, BlendMode::SourceOver)) {
                if Self::fill_circle(pixmap, style.center, style.radius * 0.5, &core) {
                    draw_calls += 1;
                }
            }
        }

        for signal in scene.signals.iter() {
            let Some(style) = signal_style(scene, signal) else {
                continue;
            };
            if let Some(paint) = paint_for(style.color.fade(0.35), halo_blend) {
                if Self::fill_circle(pixmap, style.center, style.radius * 2.0, &paint) {
                    draw_calls += 1;
                }
            }
            if let Some(paint) = paint_for(style.color, BlendMode::SourceOver) {
                if Self::fill_circle(pixmap, style.center, style.radius, &paint) {
                    draw_calls += 1;
                }
            }
        }

        Ok(RenderStats { draw_calls })
    }

    fn is_ready(&self) -> bool {
        !self.disposed
    }

    fn dispose(&mut self) {
        self.pixmap = None;
        self.disposed = true;
    }

    fn frame(&self) -> Option<FrameView<'_>> {
        let pixmap = self.pixmap.as_ref()?;
        Some(FrameView {
            width: pixmap.width(),
            height: pixmap.height(),
            pixels: pixmap.data(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{scene, settled};
    use super::*;

    fn pixel_alpha(frame: &FrameView<'_>, x: f32, y: f32) -> u8 {
        let (x, y) = (x.round() as usize, y.round() as usize);
        frame.pixels[(y * frame.width as usize + x) * 4 + 3]
    }

    #[test]
    fn draws_nodes_at_their_positions() {
        let (topo, pool, active, colors) = settled(200.0, 120.0, &[2, 3]);
        let mut raster = RasterBackend::new(200, 120).unwrap();
        let stats = raster.render(&scene(&topo, &pool, &active, &colors)).unwrap();
        assert!(stats.draw_calls > 0);

        let frame = raster.frame().unwrap();
        assert_eq!((frame.width, frame.height), (200, 120));
        assert_eq!(frame.pixels.len(), 200 * 120 * 4);
        for n in &topo.nodes {
            assert!(pixel_alpha(&frame, n.position.x, n.position.y) > 0);
        }
        // Corners stay clear.
        assert_eq!(pixel_alpha(&frame, 0.0, 0.0), 0);
    }

    #[test]
    fn each_frame_starts_from_clear() {
        let (mut topo, pool, active, colors) = settled(100.0, 100.0, &[1, 1]);
        let mut raster = RasterBackend::new(100, 100).unwrap();
        raster.render(&scene(&topo, &pool, &active, &colors)).unwrap();
        let before = topo.nodes[1].position;

        for n in &mut topo.nodes {
            n.opacity = 0.0;
        }
        for e in &mut topo.edges {
            e.opacity = 0.0;
            e.highlight.reset();
        }
        let empty_pool = crate::pool::SignalPool::with_capacity(0);
        let calm = crate::render::ActiveSets::default();
        raster
            .render(&scene(&topo, &empty_pool, &calm, &colors))
            .unwrap();
        let frame = raster.frame().unwrap();
        assert_eq!(pixel_alpha(&frame, before.x, before.y), 0);
    }

    #[test]
    fn zero_size_is_not_an_error() {
        let (topo, pool, active, colors) = settled(100.0, 100.0, &[2, 2]);
        let mut raster = RasterBackend::new(0, 0).unwrap();
        assert!(raster.is_ready());
        let stats = raster.render(&scene(&topo, &pool, &active, &colors)).unwrap();
        assert_eq!(stats.draw_calls, 0);
        assert!(raster.frame().is_none());

        raster.resize(64, 32).unwrap();
        assert_eq!(raster.frame().unwrap().width, 64);
    }

    #[test]
    fn glow_adds_draw_calls() {
        let (topo, pool, active, colors) = settled(200.0, 120.0, &[2, 3]);
        let mut raster = RasterBackend::new(200, 120).unwrap();
        let mut s = scene(&topo, &pool, &active, &colors);
        s.glow_intensity = 0.0;
        let plain = raster.render(&s).unwrap().draw_calls;
        s.glow_intensity = 1.0;
        let glowing = raster.render(&s).unwrap().draw_calls;
        assert!(glowing > plain);
    }

    #[test]
    fn disposed_backend_refuses_to_render() {
        let (topo, pool, active, colors) = settled(100.0, 100.0, &[2, 2]);
        let mut raster = RasterBackend::new(100, 100).unwrap();
        raster.dispose();
        assert!(!raster.is_ready());
        assert!(raster.frame().is_none());
        assert!(matches!(
            raster.render(&scene(&topo, &pool, &active, &colors)),
            Err(RenderError::Disposed)
        ));
    }
}
