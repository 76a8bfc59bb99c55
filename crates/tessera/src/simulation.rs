//! # Simulation Loop
//!
//! Drives the built-in system groups of a [`World`] once per frame:
//!
//! ```text
//! Frame N (delta clamped to max_delta):
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. FRAME PHASE                                                      │
//! │    ├─ DefaultSystemGroup                                            │
//! │    ├─ FrameSimulationSystemGroup                                    │
//! │    └─ FrameRenderSystemGroup                                        │
//! │                                                                     │
//! │ 2. FIXED PHASE (accumulator += delta)                               │
//! │    └─ while accumulator >= fixed_timestep, up to the step cap:      │
//! │       ├─ FixedSimulationSystemGroup                                 │
//! │       └─ FixedRenderSystemGroup                                     │
//! │                                                                     │
//! │ 3. LATE PHASE                                                       │
//! │    ├─ LateFrameSimulationSystemGroup                                │
//! │    └─ LateFrameRenderSystemGroup                                    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Fixed groups receive `fixed_timestep` as their delta; frame groups
//! receive the clamped frame delta.

use std::time::Instant;

use tessera_core::{
    DefaultSystemGroup, FixedRenderSystemGroup, FixedSimulationSystemGroup,
    FrameRenderSystemGroup, FrameSimulationSystemGroup, LateFrameRenderSystemGroup,
    LateFrameSimulationSystemGroup, World, WorldBuilder,
};

use crate::config::{LoopConfig, SimulationConfig};
use crate::error::{SimulationError, SimulationResult};

/// Timing of one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStats {
    /// Frame number, starting at 0.
    pub frame: u64,
    /// Clamped delta in seconds.
    pub delta: f32,
    /// Whole frame in microseconds.
    pub total_us: u64,
    /// Frame phase in microseconds.
    pub frame_us: u64,
    /// Fixed phase in microseconds.
    pub fixed_us: u64,
    /// Late phase in microseconds.
    pub late_us: u64,
    /// Fixed steps run.
    pub fixed_steps: u32,
    /// Fixed steps skipped because of the step cap.
    pub dropped_steps: u32,
    /// Live entities at the end of the frame.
    pub entities: usize,
}

/// Accumulator for frame statistics.
#[derive(Clone, Debug)]
pub struct FrameStatsAccumulator {
    /// Total frames recorded.
    pub frames_recorded: u64,
    /// Sum of total frame times.
    pub total_us_sum: u64,
    /// Sum of frame phase times.
    pub frame_us_sum: u64,
    /// Sum of fixed phase times.
    pub fixed_us_sum: u64,
    /// Sum of late phase times.
    pub late_us_sum: u64,
    /// Fixed steps run.
    pub fixed_steps: u64,
    /// Fixed steps dropped.
    pub dropped_steps: u64,
    /// Min frame time.
    pub min_frame_us: u64,
    /// Max frame time.
    pub max_frame_us: u64,
    /// Frames that exceeded budget.
    pub frames_over_budget: u64,
    budget_us: u64,
}

impl FrameStatsAccumulator {
    /// Creates an accumulator counting frames slower than `budget_ms`.
    #[must_use]
    pub fn new(budget_ms: f32) -> Self {
        Self {
            frames_recorded: 0,
            total_us_sum: 0,
            frame_us_sum: 0,
            fixed_us_sum: 0,
            late_us_sum: 0,
            fixed_steps: 0,
            dropped_steps: 0,
            min_frame_us: u64::MAX,
            max_frame_us: 0,
            frames_over_budget: 0,
            budget_us: budget_to_us(budget_ms),
        }
    }

    /// Records a frame's statistics.
    pub fn record(&mut self, stats: FrameStats) {
        self.frames_recorded += 1;
        self.total_us_sum += stats.total_us;
        self.frame_us_sum += stats.frame_us;
        self.fixed_us_sum += stats.fixed_us;
        self.late_us_sum += stats.late_us;
        self.fixed_steps += u64::from(stats.fixed_steps);
        self.dropped_steps += u64::from(stats.dropped_steps);
        self.min_frame_us = self.min_frame_us.min(stats.total_us);
        self.max_frame_us = self.max_frame_us.max(stats.total_us);

        if self.is_over_budget(&stats) {
            self.frames_over_budget += 1;
        }
    }

    /// Checks if a frame took longer than the budget.
    #[must_use]
    pub fn is_over_budget(&self, stats: &FrameStats) -> bool {
        stats.total_us > self.budget_us
    }

    /// Frame budget in microseconds.
    #[must_use]
    pub const fn budget_us(&self) -> u64 {
        self.budget_us
    }

    /// Returns average frame time in milliseconds.
    #[must_use]
    pub fn avg_frame_ms(&self) -> f64 {
        average_ms(self.total_us_sum, self.frames_recorded)
    }

    /// Returns average FPS.
    #[must_use]
    pub fn avg_fps(&self) -> f64 {
        let avg_ms = self.avg_frame_ms();
        if avg_ms <= 0.0 {
            return 0.0;
        }
        1000.0 / avg_ms
    }

    /// Returns the fraction of frames over budget.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn over_budget_ratio(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        self.frames_over_budget as f64 / self.frames_recorded as f64
    }

    /// Prints a summary of the statistics.
    #[allow(clippy::cast_precision_loss)]
    pub fn print_summary(&self) {
        let min_frame_us = if self.frames_recorded == 0 { 0 } else { self.min_frame_us };
        println!("╔══════════════════════════════════════════════════════════════════╗");
        println!("║                    FRAME STATISTICS SUMMARY                      ║");
        println!("╚══════════════════════════════════════════════════════════════════╝");
        println!();
        println!("┌─ TIMING ───────────────────────────────────────────────────────┐");
        println!("│ Frames Recorded:    {}", self.frames_recorded);
        println!("│ Average Frame:      {:.3} ms ({:.1} FPS)", self.avg_frame_ms(), self.avg_fps());
        println!("│ Min Frame:          {:.3} ms", min_frame_us as f64 / 1000.0);
        println!("│ Max Frame:          {:.3} ms", self.max_frame_us as f64 / 1000.0);
        println!("└──────────────────────────────────────────────────────────────────┘");
        println!();
        println!("┌─ BUDGET ───────────────────────────────────────────────────────┐");
        println!("│ Target:             {:.3} ms", self.budget_us as f64 / 1000.0);
        println!(
            "│ Over Budget:        {} frames ({:.1}%)",
            self.frames_over_budget,
            self.over_budget_ratio() * 100.0
        );
        println!("│ Fixed Steps:        {} run, {} dropped", self.fixed_steps, self.dropped_steps);
        println!("└──────────────────────────────────────────────────────────────────┘");

        if self.frames_recorded > 0 {
            println!();
            println!("┌─ BREAKDOWN ─────────────────────────────────────────────────────┐");
            println!("│ Frame groups:       {:.3} ms", average_ms(self.frame_us_sum, self.frames_recorded));
            println!("│ Fixed groups:       {:.3} ms", average_ms(self.fixed_us_sum, self.frames_recorded));
            println!("│ Late groups:        {:.3} ms", average_ms(self.late_us_sum, self.frames_recorded));
            println!("└──────────────────────────────────────────────────────────────────┘");
        }
    }
}

impl Default for FrameStatsAccumulator {
    fn default() -> Self {
        Self::new(LoopConfig::default().frame_budget_ms)
    }
}

/// Owns a world and ticks its system groups.
#[derive(Debug)]
pub struct Simulation {
    world: World,
    config: LoopConfig,
    accumulator: f32,
    frame: u64,
    stats: FrameStatsAccumulator,
    loaded: bool,
}

impl Simulation {
    /// Wraps an existing world.
    #[must_use]
    pub fn new(world: World, config: LoopConfig) -> Self {
        Self {
            world,
            stats: FrameStatsAccumulator::new(config.frame_budget_ms),
            config,
            accumulator: 0.0,
            frame: 0,
            loaded: false,
        }
    }

    /// Builds the world from `builder` with the configured sizing.
    ///
    /// # Errors
    ///
    /// Returns the first system factory error or ordering conflict.
    pub fn from_builder(builder: WorldBuilder, config: &SimulationConfig) -> SimulationResult<Self> {
        config.validate()?;
        let world = builder.with_config(config.world.clone()).build()?;
        Ok(Self::new(world, config.simulation.clone()))
    }

    /// The simulated world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// The simulated world, mutably.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Loop settings.
    #[must_use]
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Checks if [`Simulation::load`] has run.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Creates the built-in groups and sets every group up.
    ///
    /// Loading twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the first ordering conflict or setup error.
    pub fn load(&mut self) -> SimulationResult<()> {
        if self.loaded {
            return Ok(());
        }
        if self.world.is_destroyed() {
            return Err(tessera_core::EcsError::WorldDestroyed.into());
        }
        self.world.get_or_create_group::<DefaultSystemGroup>();
        self.world.get_or_create_group::<FrameSimulationSystemGroup>();
        self.world.get_or_create_group::<FrameRenderSystemGroup>();
        self.world.get_or_create_group::<FixedSimulationSystemGroup>();
        self.world.get_or_create_group::<FixedRenderSystemGroup>();
        self.world.get_or_create_group::<LateFrameSimulationSystemGroup>();
        self.world.get_or_create_group::<LateFrameRenderSystemGroup>();

        self.world.setup_system_groups()?;
        self.loaded = true;
        tracing::info!(
            groups = self.world.group_names().len(),
            entities = self.world.entity_count(),
            "simulation loaded"
        );
        Ok(())
    }

    /// Runs one frame.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::NotLoaded`] before [`Simulation::load`],
    /// otherwise the first system or command error, which aborts the frame.
    pub fn update(&mut self, delta: f32) -> SimulationResult<FrameStats> {
        if !self.loaded {
            return Err(SimulationError::NotLoaded);
        }
        let delta = if delta.is_finite() {
            delta.clamp(0.0, self.config.max_delta)
        } else {
            0.0
        };
        let frame_start = Instant::now();

        self.world.run_group::<DefaultSystemGroup>(delta)?;
        self.world.run_group::<FrameSimulationSystemGroup>(delta)?;
        self.world.run_group::<FrameRenderSystemGroup>(delta)?;
        let frame_us = elapsed_us(frame_start);

        let fixed_start = Instant::now();
        let step = self.config.fixed_timestep;
        self.accumulator += delta;
        let mut fixed_steps = 0;
        while self.accumulator >= step && fixed_steps < self.config.max_fixed_steps_per_frame {
            self.world.run_group::<FixedSimulationSystemGroup>(step)?;
            self.world.run_group::<FixedRenderSystemGroup>(step)?;
            self.accumulator -= step;
            fixed_steps += 1;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let dropped_steps = (self.accumulator / step) as u32;
        if dropped_steps > 0 {
            self.accumulator %= step;
            tracing::debug!(frame = self.frame, dropped_steps, "fixed step cap reached");
        }
        let fixed_us = elapsed_us(fixed_start);

        let late_start = Instant::now();
        self.world.run_group::<LateFrameSimulationSystemGroup>(delta)?;
        self.world.run_group::<LateFrameRenderSystemGroup>(delta)?;
        let late_us = elapsed_us(late_start);

        let stats = FrameStats {
            frame: self.frame,
            delta,
            total_us: elapsed_us(frame_start),
            frame_us,
            fixed_us,
            late_us,
            fixed_steps,
            dropped_steps,
            entities: self.world.entity_count(),
        };
        self.end_frame(stats);
        Ok(stats)
    }

    fn end_frame(&mut self, stats: FrameStats) {
        self.frame += 1;
        self.stats.record(stats);

        if self.config.enable_timing_logs && self.stats.is_over_budget(&stats) {
            #[allow(clippy::cast_precision_loss)]
            let total_ms = stats.total_us as f64 / 1000.0;
            tracing::warn!(
                frame = stats.frame,
                total_ms,
                budget_ms = self.config.frame_budget_ms,
                "frame exceeded budget"
            );
        }
    }

    /// Fraction of a fixed step left in the accumulator, in `[0, 1)`.
    #[must_use]
    pub fn interpolation_alpha(&self) -> f32 {
        self.accumulator / self.config.fixed_timestep
    }

    /// Frames run so far.
    #[inline]
    #[must_use]
    pub const fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Returns the accumulated statistics.
    #[must_use]
    pub fn stats(&self) -> &FrameStatsAccumulator {
        &self.stats
    }

    /// Runs the world's reset hooks and system resets, and rewinds the clock.
    ///
    /// # Errors
    ///
    /// Returns the first system error.
    pub fn reset(&mut self) -> SimulationResult<()> {
        self.world.reset()?;
        self.accumulator = 0.0;
        self.frame = 0;
        self.stats = FrameStatsAccumulator::new(self.config.frame_budget_ms);
        Ok(())
    }

    /// Cleans every group up. The world stays alive until dropped.
    ///
    /// # Errors
    ///
    /// Returns the first cleanup error.
    pub fn unload(&mut self) -> SimulationResult<()> {
        if !self.loaded {
            return Ok(());
        }
        self.loaded = false;
        self.world.cleanup_system_groups()?;
        tracing::info!(frames = self.frame, "simulation unloaded");
        Ok(())
    }

    /// Consumes the simulation and returns its world.
    #[must_use]
    pub fn into_world(self) -> World {
        self.world
    }
}

fn elapsed_us(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_micros()).unwrap_or(u64::MAX)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn budget_to_us(budget_ms: f32) -> u64 {
    (f64::from(budget_ms.max(0.0)) * 1000.0) as u64
}

#[allow(clippy::cast_precision_loss)]
fn average_ms(sum_us: u64, frames: u64) -> f64 {
    if frames == 0 {
        return 0.0;
    }
    (sum_us as f64 / frames as f64) / 1000.0
}
