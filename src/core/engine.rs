//! The mounted visualization.
//!
//! [`NetworkViz`] owns the model (topology + signal pool), the choreographer,
//! the palette and the renderer, and is driven by the host: one
//! [`NetworkViz::tick`] per display refresh, plus pushed resize and theme
//! notifications. Nothing here panics on bad input; degenerate geometry just
//! yields an empty, idle scene.

use std::time::Duration;

use crate::choreography::{Choreographer, Phase};
use crate::config::VizConfig;
use crate::observer::{EngineSnapshot, VizAdapter};
use crate::palette::{ColorOverrides, ColorSchemeProvider, Theme};
use crate::pool::SignalPool;
use crate::prng::Prng;
use crate::render::selector::{default_gpu_factory, BackendSelector, GpuFactory};
use crate::render::{ActiveSets, BackendKind, FrameView, RenderBackend, RenderStats, Scene};
use crate::scheduler::{FrameScheduler, Instant};
use crate::topology::Topology;

#[derive(Debug, Clone, Copy)]
struct PendingResize {
    width: u32,
    height: u32,
    due: Instant,
}

pub struct NetworkViz {
    config: VizConfig,
    width: u32,
    height: u32,

    topology: Topology,
    pool: SignalPool,
    choreographer: Choreographer,
    palette: ColorSchemeProvider,
    active: ActiveSets,

    scheduler: FrameScheduler,
    renderer: Option<BackendSelector>,
    last_stats: RenderStats,
    pending_resize: Option<PendingResize>,
    torn_down: bool,
}

impl NetworkViz {
    /// Build the model and renderer for a `width` x `height` viewport and
    /// start animating.
    pub fn mount(width: u32, height: u32, theme: Theme, config: VizConfig) -> Self {
        Self::mount_with_gpu_factory(width, height, theme, config, default_gpu_factory())
    }

    /// [`NetworkViz::mount`] with a caller-supplied GPU backend constructor.
    pub fn mount_with_gpu_factory(
        width: u32,
        height: u32,
        theme: Theme,
        config: VizConfig,
        gpu_factory: GpuFactory,
    ) -> Self {
        let config = config.sanitized();
        let rng = match config.seed {
            Some(seed) => Prng::new(seed),
            None => Prng::from_entropy(),
        };
        let mut choreographer = Choreographer::new(config.choreography_params(), rng);
        let topology = Topology::generate(
            width as f32,
            height as f32,
            &config.layer_sizes,
            1,
            choreographer.rng_mut(),
        );
        let mut pool = SignalPool::for_edges(topology.edges.len());
        choreographer.restart(&topology, &mut pool);

        let selected =
            BackendSelector::with_gpu_factory(width, height, config.force_raster, gpu_factory);
        let renderer = match selected {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::error!(error = %e, "no renderer available; frames will be empty");
                None
            }
        };

        let mut scheduler = FrameScheduler::new();
        scheduler.start();

        tracing::debug!(
            width,
            height,
            nodes = topology.nodes.len(),
            edges = topology.edges.len(),
            pool = pool.capacity(),
            "visualization mounted"
        );

        Self {
            palette: ColorSchemeProvider::new(theme, config.colors.clone()),
            config,
            width,
            height,
            topology,
            pool,
            choreographer,
            active: ActiveSets::default(),
            scheduler,
            renderer,
            last_stats: RenderStats::default(),
            pending_resize: None,
            torn_down: false,
        }
    }

    /// Run one display refresh at host time `now`.
    ///
    /// Returns the render stats, or `None` when no frame was drawn (paused,
    /// torn down, or the renderer failed).
    pub fn tick(&mut self, now: Instant) -> Option<RenderStats> {
        if self.torn_down {
            return None;
        }
        self.apply_due_resize(now);
        let dt = self.scheduler.tick(now)?;

        let theme = self.palette.theme();
        self.choreographer
            .advance(dt, &mut self.topology, &mut self.pool, theme);
        self.active.recompute(&self.topology);
        self.render()
    }

    fn render(&mut self) -> Option<RenderStats> {
        let renderer = self.renderer.as_mut()?;
        let scene = Scene {
            nodes: &self.topology.nodes,
            edges: &self.topology.edges,
            signals: &self.pool,
            active: &self.active,
            colors: self.palette.scheme(),
            glow_intensity: self.config.glow_intensity,
            theme: self.palette.theme(),
        };
        match renderer.render(&scene) {
            Ok(stats) => {
                self.last_stats = stats;
                Some(stats)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    backend = renderer.active_name(),
                    "render failed; frame skipped"
                );
                None
            }
        }
    }

    /// Record a new viewport size. The rebuild happens on the first tick after
    /// the debounce interval has passed since the latest notification.
    pub fn notify_resize(&mut self, width: u32, height: u32, now: Instant) {
        if self.torn_down {
            return;
        }
        if (width, height) == (self.width, self.height) {
            // Back to where we are: nothing to rebuild.
            self.pending_resize = None;
            return;
        }
        let debounce = Duration::from_millis(self.config.resize_debounce_ms);
        self.pending_resize = Some(PendingResize {
            width,
            height,
            due: now + debounce,
        });
    }

    fn apply_due_resize(&mut self, now: Instant) {
        let Some(pending) = self.pending_resize else {
            return;
        };
        if now < pending.due {
            return;
        }
        self.pending_resize = None;
        self.rebuild(pending.width, pending.height);
    }

    /// Replace the model for a new viewport size.
    ///
    /// Pending tasks are cancelled and the pool cleared before the arrays are
    /// replaced, so nothing planned against the old layout can touch the new one.
    fn rebuild(&mut self, width: u32, height: u32) {
        self.choreographer.cancel(&mut self.pool);
        self.active.clear();

        let generation = self.topology.generation() + 1;
        self.topology = Topology::generate(
            width as f32,
            height as f32,
            &self.config.layer_sizes,
            generation,
            self.choreographer.rng_mut(),
        );
        self.pool = SignalPool::for_edges(self.topology.edges.len());
        self.choreographer.restart(&self.topology, &mut self.pool);

        if let Some(renderer) = self.renderer.as_mut() {
            if let Err(e) = renderer.resize(width, height) {
                tracing::error!(error = %e, width, height, "renderer resize failed");
            }
        }
        self.width = width;
        self.height = height;

        tracing::debug!(
            width,
            height,
            generation,
            nodes = self.topology.nodes.len(),
            edges = self.topology.edges.len(),
            "topology rebuilt"
        );
    }

    pub fn set_theme(&mut self, theme: Theme) {
        if self.palette.set_theme(theme) {
            tracing::debug!(dark = theme.is_dark(), "theme changed");
        }
    }

    /// Boolean form of [`NetworkViz::set_theme`].
    pub fn set_dark_mode(&mut self, dark: bool) {
        self.set_theme(Theme::from_dark_flag(dark));
    }

    pub fn set_color_overrides(&mut self, overrides: ColorOverrides) {
        self.config.colors = overrides.clone();
        self.palette.set_overrides(overrides);
    }

    /// Stop producing frames until [`NetworkViz::resume`]. Scene time freezes.
    pub fn pause(&mut self) {
        self.scheduler.pause();
    }

    pub fn resume(&mut self) {
        self.scheduler.resume();
    }

    pub fn is_paused(&self) -> bool {
        !self.torn_down && !self.scheduler.is_running()
    }

    /// Stop everything and free the renderer. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.scheduler.stop();
        self.choreographer.cancel(&mut self.pool);
        self.pool.clear();
        if let Some(mut renderer) = self.renderer.take() {
            renderer.dispose();
        }
        self.topology = Topology::default();
        self.active.clear();
        self.pending_resize = None;
        self.torn_down = true;
        tracing::debug!("visualization torn down");
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// The most recently rendered frame.
    pub fn frame(&self) -> Option<FrameView<'_>> {
        self.renderer.as_ref()?.frame()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        VizAdapter::new(self).snapshot()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn theme(&self) -> Theme {
        self.palette.theme()
    }

    pub fn config(&self) -> &VizConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.choreographer.phase()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn pool(&self) -> &SignalPool {
        &self.pool
    }

    pub fn choreographer(&self) -> &Choreographer {
        &self.choreographer
    }

    pub fn active_sets(&self) -> &ActiveSets {
        &self.active
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.renderer.as_ref().map(BackendSelector::active_kind)
    }

    /// Diagnostic name of the active backend (`"gpu"` or `"raster"`).
    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend_kind().map(BackendKind::name)
    }

    pub fn last_stats(&self) -> RenderStats {
        self.last_stats
    }

    pub fn ticks(&self) -> u64 {
        self.scheduler.ticks()
    }
}

impl Drop for NetworkViz {
    fn drop(&mut self) {
        self.teardown();
    }
}
