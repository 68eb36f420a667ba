//! Backend selection with one-way fallback.
//!
//! The raster backend is always built first so there is something to draw
//! with. A GPU backend is then tried; if it cannot be created, or later fails
//! mid-session, the selector drops it and stays on raster for good.

use super::raster::RasterBackend;
use super::{BackendKind, FrameView, RenderBackend, RenderError, RenderStats, Scene};

/// Builds the accelerated backend for a given size.
pub type GpuFactory = Box<dyn FnOnce(u32, u32) -> Result<Box<dyn RenderBackend>, RenderError>>;

/// The GPU factory for this build.
///
/// Without the `gpu` feature it always reports `Unsupported`.
pub fn default_gpu_factory() -> GpuFactory {
    #[cfg(feature = "gpu")]
    {
        Box::new(|width, height| {
            let gpu = super::gpu::GpuBackend::new(width, height)?;
            Ok(Box::new(gpu) as Box<dyn RenderBackend>)
        })
    }
    #[cfg(not(feature = "gpu"))]
    {
        Box::new(|_, _| Err(RenderError::Unsupported("built without the `gpu` feature")))
    }
}

pub struct BackendSelector {
    raster: RasterBackend,
    gpu: Option<Box<dyn RenderBackend>>,
    last_stats: RenderStats,
    disposed: bool,
}

impl BackendSelector {
    pub fn new(width: u32, height: u32, force_raster: bool) -> Result<Self, RenderError> {
        Self::with_gpu_factory(width, height, force_raster, default_gpu_factory())
    }

    /// Like [`BackendSelector::new`] with a caller-supplied GPU constructor.
    pub fn with_gpu_factory(
        width: u32,
        height: u32,
        force_raster: bool,
        factory: GpuFactory,
    ) -> Result<Self, RenderError> {
        let raster = RasterBackend::new(width, height)?;

        let gpu = if force_raster {
            tracing::debug!("raster rendering forced by configuration");
            None
        } else {
            match factory(width, height) {
                Ok(gpu) if gpu.is_ready() => Some(gpu),
                Ok(mut gpu) => {
                    tracing::debug!("GPU backend not ready; using raster");
                    gpu.dispose();
                    None
                }
                Err(e) => {
                    tracing::debug!(error = %e, "GPU backend unavailable; using raster");
                    None
                }
            }
        };

        let selector = Self {
            raster,
            gpu,
            last_stats: RenderStats::default(),
            disposed: false,
        };
        tracing::info!(backend = selector.active_name(), "renderer selected");
        Ok(selector)
    }

    pub fn active_kind(&self) -> BackendKind {
        match &self.gpu {
            Some(gpu) => gpu.kind(),
            None => BackendKind::Raster,
        }
    }

    pub fn active_name(&self) -> &'static str {
        self.active_kind().name()
    }

    pub fn last_stats(&self) -> RenderStats {
        self.last_stats
    }

    fn drop_gpu(&mut self) {
        if let Some(mut gpu) = self.gpu.take() {
            gpu.dispose();
        }
    }
}

impl RenderBackend for BackendSelector {
    fn kind(&self) -> BackendKind {
        self.active_kind()
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        if let Some(gpu) = self.gpu.as_mut() {
            if let Err(e) = gpu.resize(width, height) {
                tracing::warn!(error = %e, "GPU resize failed; continuing on raster");
                self.drop_gpu();
            }
        }
        self.raster.resize(width, height)
    }

    fn render(&mut self, scene: &Scene<'_>) -> Result<RenderStats, RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        if let Some(gpu) = self.gpu.as_mut() {
            match gpu.render(scene) {
                Ok(stats) => {
                    self.last_stats = stats;
                    return Ok(stats);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "GPU render failed; continuing on raster");
                    self.drop_gpu();
                }
            }
        }
        let stats = self.raster.render(scene)?;
        self.last_stats = stats;
        Ok(stats)
    }

    fn is_ready(&self) -> bool {
        !self.disposed
            && match &self.gpu {
                Some(gpu) => gpu.is_ready(),
                None => self.raster.is_ready(),
            }
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.drop_gpu();
        self.raster.dispose();
        self.disposed = true;
    }

    fn frame(&self) -> Option<FrameView<'_>> {
        match &self.gpu {
            Some(gpu) => gpu.frame(),
            None => self.raster.frame(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{scene, settled};
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Stand-in accelerated backend.
    struct FakeGpu {
        fail_render: bool,
        renders: Rc<Cell<u32>>,
        disposed: Rc<Cell<bool>>,
    }

    impl RenderBackend for FakeGpu {
        fn kind(&self) -> BackendKind {
            BackendKind::Gpu
        }
        fn resize(&mut self, _: u32, _: u32) -> Result<(), RenderError> {
            Ok(())
        }
        fn render(&mut self, _: &Scene<'_>) -> Result<RenderStats, RenderError> {
            self.renders.set(self.renders.get() + 1);
            if self.fail_render {
                Err(RenderError::Gpu("device lost".into()))
            } else {
                Ok(RenderStats { draw_calls: 2 })
            }
        }
        fn is_ready(&self) -> bool {
            !self.disposed.get()
        }
        fn dispose(&mut self) {
            self.disposed.set(true);
        }
        fn frame(&self) -> Option<FrameView<'_>> {
            None
        }
    }

    fn fake(fail_render: bool) -> (GpuFactory, Rc<Cell<u32>>, Rc<Cell<bool>>) {
        let renders = Rc::new(Cell::new(0));
        let disposed = Rc::new(Cell::new(false));
        let (r, d) = (renders.clone(), disposed.clone());
        let factory: GpuFactory = Box::new(move |_, _| {
            Ok(Box::new(FakeGpu {
                fail_render,
                renders: r,
                disposed: d,
            }) as Box<dyn RenderBackend>)
        });
        (factory, renders, disposed)
    }

    #[test]
    fn failed_gpu_construction_selects_raster() {
        let failing: GpuFactory = Box::new(|_, _| Err(RenderError::Adapter));
        let sel = BackendSelector::with_gpu_factory(100, 100, false, failing).unwrap();
        assert_eq!(sel.active_kind(), BackendKind::Raster);
        assert_eq!(sel.active_name(), "raster");
        assert!(sel.is_ready());
    }

    #[test]
    fn working_gpu_is_preferred() {
        let (factory, renders, _) = fake(false);
        let mut sel = BackendSelector::with_gpu_factory(100, 100, false, factory).unwrap();
        assert_eq!(sel.active_kind(), BackendKind::Gpu);

        let (topo, pool, active, colors) = settled(100.0, 100.0, &[2, 2]);
        let stats = sel.render(&scene(&topo, &pool, &active, &colors)).unwrap();
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(sel.last_stats(), stats);
        assert_eq!(renders.get(), 1);
    }

    #[test]
    fn force_raster_skips_gpu() {
        let (factory, _, _) = fake(false);
        let sel = BackendSelector::with_gpu_factory(100, 100, true, factory).unwrap();
        assert_eq!(sel.active_kind(), BackendKind::Raster);
    }

    #[test]
    fn render_failure_latches_to_raster() {
        let (factory, renders, disposed) = fake(true);
        let mut sel = BackendSelector::with_gpu_factory(100, 100, false, factory).unwrap();
        let (topo, pool, active, colors) = settled(100.0, 100.0, &[2, 2]);
        let s = scene(&topo, &pool, &active, &colors);

        // The failing frame is still drawn, by raster.
        let stats = sel.render(&s).unwrap();
        assert!(stats.draw_calls > 0);
        assert_eq!(sel.active_kind(), BackendKind::Raster);
        assert!(disposed.get());
        assert!(sel.frame().is_some());

        sel.render(&s).unwrap();
        assert_eq!(renders.get(), 1, "GPU is never retried");
    }

    #[test]
    fn dispose_is_idempotent() {
        let mut sel = BackendSelector::new(50, 50, true).unwrap();
        sel.dispose();
        sel.dispose();
        assert!(!sel.is_ready());
        assert!(sel.frame().is_none());
        assert!(matches!(sel.resize(10, 10), Err(RenderError::Disposed)));
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn default_factory_without_gpu_feature_is_unsupported() {
        let factory = default_gpu_factory();
        assert!(matches!(factory(10, 10), Err(RenderError::Unsupported(_))));
    }
}
