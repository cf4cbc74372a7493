//! Transition scheduler
//!
//! Drives the IDLE -> FADING -> PAUSED cycle: pick the next palette color,
//! fade towards it frame by frame, rest, repeat. Every wait is a
//! suspension point at which a shutdown request ends the loop; the state
//! (cursor, displayed color) is consistent at each of them.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::color::Color;
use crate::config::Config;
use crate::driver::DeviceDriver;
use crate::error::{Error, Result};
use crate::fade::fade;
use crate::palette::{self, Palette};
use crate::sequencer::ColorSequencer;

/// Lower bound for the wait after a cycle that could not start
pub const MIN_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Between fades
    Idle,
    /// Emitting gradient frames
    Fading,
    /// Resting after a fade
    Paused,
}

/// How a single cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Every frame was displayed
    Completed,
    /// A frame push failed; the rest of the fade was skipped
    Aborted,
    /// No target could be chosen (unreadable image, empty palette)
    Skipped,
    /// Shutdown was requested during a wait
    Interrupted,
}

/// Per-instance state, owned by the scheduler
#[derive(Debug)]
pub struct PluginState {
    /// Last extracted palette and the source it was extracted from
    palette: Option<(Palette, PaletteSource)>,
    sequencer: ColorSequencer,
    /// Color currently shown on the devices
    current: Color,
    driver: DeviceDriver,
}

#[derive(Debug, Clone, PartialEq)]
struct PaletteSource {
    path: PathBuf,
    modified: Option<SystemTime>,
    /// Catches rewrites within one timestamp tick
    len: u64,
    max_colors: usize,
    quality: u32,
}

impl PluginState {
    pub fn new(driver: DeviceDriver) -> Self {
        Self {
            palette: None,
            sequencer: ColorSequencer::new(),
            current: Color::BLACK,
            driver,
        }
    }

    pub fn current(&self) -> Color {
        self.current
    }

    pub fn palette(&self) -> Option<&Palette> {
        self.palette.as_ref().map(|(palette, _)| palette)
    }

    pub fn sequencer(&self) -> &ColorSequencer {
        &self.sequencer
    }

    pub fn driver(&self) -> &DeviceDriver {
        &self.driver
    }
}

pub struct Scheduler {
    config: Config,
    state: PluginState,
    phase: Phase,
    shutdown: watch::Receiver<bool>,
    config_updates: Option<watch::Receiver<Config>>,
}

impl Scheduler {
    /// The scheduler stops once `shutdown` turns true or its sender is dropped
    pub fn new(config: Config, driver: DeviceDriver, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            config,
            state: PluginState::new(driver),
            phase: Phase::Idle,
            shutdown,
            config_updates: None,
        }
    }

    /// Pick up configuration changes at the start of each cycle
    pub fn with_config_updates(mut self, updates: watch::Receiver<Config>) -> Self {
        self.config_updates = Some(updates);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &PluginState {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }

    /// Cycle until shutdown, then hand back the state
    pub async fn run(mut self) -> PluginState {
        info!(
            "Fading through {} ({} steps, {:?} apart)",
            self.config.input.display(),
            self.config.gradient_steps,
            self.config.interval
        );
        while !self.is_shutdown() {
            if self.tick().await == TickOutcome::Interrupted {
                break;
            }
        }
        debug!("Scheduler stopped at {}", self.state.current);
        self.state
    }

    /// Run one IDLE -> FADING -> PAUSED cycle
    pub async fn tick(&mut self) -> TickOutcome {
        self.phase = Phase::Idle;
        self.apply_config_update();

        let target = match self.next_target().await {
            Ok(target) => target,
            Err(e) => {
                warn!("Skipping cycle: {e}");
                let delay = self.config.pause_after_fade.max(MIN_RETRY_DELAY);
                return self.rest(delay, TickOutcome::Skipped).await;
            }
        };

        let gradient = fade(self.state.current, target, self.config.gradient_steps);
        debug!(
            "Fading {} -> {} in {} frames",
            self.state.current,
            target,
            gradient.len()
        );

        self.phase = Phase::Fading;
        let mut outcome = TickOutcome::Completed;
        for (i, &frame) in gradient.iter().enumerate() {
            if i > 0 && !self.wait(self.config.interval).await {
                self.phase = Phase::Idle;
                return TickOutcome::Interrupted;
            }
            if frame == self.state.current {
                continue;
            }
            match self.state.driver.set_color(frame).await {
                Ok(()) => self.state.current = frame,
                Err(e) => {
                    warn!(
                        "Frame {}/{} failed, abandoning fade: {e}",
                        i + 1,
                        gradient.len()
                    );
                    outcome = TickOutcome::Aborted;
                    break;
                }
            }
        }

        self.rest(self.config.pause_after_fade, outcome).await
    }

    /// PAUSED for `duration`, then back to IDLE
    async fn rest(&mut self, duration: Duration, outcome: TickOutcome) -> TickOutcome {
        self.phase = Phase::Paused;
        let finished = self.wait(duration).await;
        self.phase = Phase::Idle;
        if finished {
            outcome
        } else {
            TickOutcome::Interrupted
        }
    }

    /// Sleep unless shutdown is requested first; false when interrupted
    async fn wait(&mut self, duration: Duration) -> bool {
        if self.is_shutdown() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.shutdown.wait_for(|stop| *stop) => false,
        }
    }

    async fn next_target(&mut self) -> Result<Color> {
        let palette = self.current_palette().await?;
        self.state.sequencer.next(&palette)
    }

    async fn current_palette(&mut self) -> Result<Palette> {
        if !self.config.colors.is_empty() {
            return Palette::from_colors(self.config.colors.iter().copied());
        }

        let path = self.config.input.clone();
        let metadata = tokio::fs::metadata(&path).await.map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        let source = PaletteSource {
            path,
            modified: metadata.modified().ok(),
            len: metadata.len(),
            max_colors: self.config.max_palette_size,
            quality: self.config.quality,
        };

        if let Some((palette, cached)) = &self.state.palette {
            if cached == &source && source.modified.is_some() {
                return Ok(palette.clone());
            }
        }

        let (path, max_colors, quality) = (source.path.clone(), source.max_colors, source.quality);
        let palette = tokio::task::spawn_blocking(move || palette::extract(path, max_colors, quality))
            .await
            .map_err(|e| Error::Decode(format!("extraction task failed: {e}")))??;
        info!(
            "Extracted {} colors from {}",
            palette.len(),
            source.path.display()
        );
        self.state.palette = Some((palette.clone(), source));
        Ok(palette)
    }

    fn apply_config_update(&mut self) {
        let Some(updates) = &mut self.config_updates else {
            return;
        };
        if !updates.has_changed().unwrap_or(false) {
            return;
        }
        let config = updates.borrow_and_update().clone();
        if config.address != self.config.address {
            warn!(
                "Address change to {} takes effect after reactivation",
                config.address
            );
        }
        debug!("Configuration updated");
        self.config = config;
        // The host reconfigures after writing a new image
        self.state.palette = None;
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("phase", &self.phase)
            .field("current", &self.state.current)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawConfig;
    use crate::testing::RecordingController;
    use std::path::Path;
    use std::sync::Arc;

    const RED: Color = Color::new(255, 0, 0);
    const GREEN: Color = Color::new(0, 255, 0);

    fn config(input: &Path, steps: usize) -> Config {
        Config::resolve(RawConfig {
            input: Some(input.display().to_string()),
            gradient_steps: Some(crate::config::NumberValue::Int(steps as i64)),
            ..Default::default()
        })
        .unwrap()
    }

    /// Left half red, right half green; red wins ties by being sampled first
    fn write_red_green(dir: &Path) -> PathBuf {
        let path = dir.join("wall.png");
        let img = image::RgbImage::from_fn(8, 8, |x, _| {
            if x < 4 {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([0, 255, 0])
            }
        });
        img.save(&path).unwrap();
        path
    }

    async fn scheduler(
        config: Config,
        controller: Arc<RecordingController>,
    ) -> (Scheduler, watch::Sender<bool>) {
        let driver = DeviceDriver::activate(controller).await.unwrap();
        let (tx, rx) = watch::channel(false);
        (Scheduler::new(config, driver, rx), tx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fade_from_black() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_red_green(dir.path());
        let controller = Arc::new(RecordingController::single_device(3));
        let (mut scheduler, _tx) = scheduler(config(&input, 4), controller.clone()).await;

        assert_eq!(scheduler.phase(), Phase::Idle);
        assert_eq!(scheduler.tick().await, TickOutcome::Completed);
        assert_eq!(scheduler.phase(), Phase::Idle);

        let frames = controller.pushed_colors(0);
        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|c| c.g == 0 && c.b == 0));
        assert!(frames.windows(2).all(|w| w[0].r < w[1].r));
        assert_eq!(frames.last(), Some(&RED));
        assert_eq!(scheduler.state().current(), RED);
        assert_eq!(
            scheduler.state().palette().map(|p| p.colors().to_vec()),
            Some(vec![RED, GREEN])
        );

        // Second cycle continues from red
        assert_eq!(scheduler.tick().await, TickOutcome::Completed);
        let frames = controller.pushed_colors(0);
        assert_eq!(frames.len(), 8);
        assert_eq!(frames[7], GREEN);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_are_spaced_by_interval() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_red_green(dir.path());
        let controller = Arc::new(RecordingController::single_device(1));
        let mut config = config(&input, 5);
        config.interval = Duration::from_millis(100);
        config.pause_after_fade = Duration::from_secs(2);
        let (mut scheduler, _tx) = scheduler(config, controller).await;

        let start = tokio::time::Instant::now();
        scheduler.tick().await;
        // 4 gaps between 5 frames, then the pause
        assert_eq!(start.elapsed(), Duration::from_millis(2400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_push_aborts_fade() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_red_green(dir.path());
        let controller = Arc::new(RecordingController::single_device(2).failing_updates([2]));
        let (mut scheduler, _tx) = scheduler(config(&input, 5), controller.clone()).await;

        assert_eq!(scheduler.tick().await, TickOutcome::Aborted);
        assert_eq!(scheduler.phase(), Phase::Idle);

        // Step 1 shown, step 2 failed, steps 3-5 never attempted
        assert_eq!(controller.update_calls(), 2);
        let frames = controller.pushed_colors(0);
        assert_eq!(frames, vec![Color::new(51, 0, 0)]);
        assert_eq!(scheduler.state().current(), Color::new(51, 0, 0));

        // Next cycle fades from the last displayed color
        assert_eq!(scheduler.tick().await, TickOutcome::Completed);
        let frames = controller.pushed_colors(0);
        assert_eq!(frames[1], Color::new(41, 51, 0));
        assert_eq!(frames.last(), Some(&GREEN));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_color_palette() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_red_green(dir.path());
        let controller = Arc::new(RecordingController::single_device(1));
        let mut config = config(&input, 3);
        config.max_palette_size = 1;
        let (mut scheduler, _tx) = scheduler(config, controller.clone()).await;

        for _ in 0..3 {
            assert_eq!(scheduler.tick().await, TickOutcome::Completed);
        }
        let palette = scheduler.state().palette().unwrap();
        assert_eq!(palette.len(), 1);
        let only = palette.colors()[0];
        // Later fades go from the only color to itself and push nothing new
        assert_eq!(controller.pushed_colors(0).len(), 3);
        assert_eq!(scheduler.state().current(), only);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_image_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.png");
        std::fs::write(&input, b"not an image").unwrap();
        let controller = Arc::new(RecordingController::single_device(1));
        let (mut scheduler, _tx) = scheduler(config(&input, 4), controller.clone()).await;

        let start = tokio::time::Instant::now();
        assert_eq!(scheduler.tick().await, TickOutcome::Skipped);
        assert_eq!(start.elapsed(), MIN_RETRY_DELAY);
        assert_eq!(controller.update_calls(), 0);
        assert_eq!(scheduler.state().current(), Color::BLACK);

        // Missing file is skipped the same way
        std::fs::remove_file(&input).unwrap();
        assert_eq!(scheduler.tick().await, TickOutcome::Skipped);

        // So is an image without a single opaque pixel
        image::RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 0]))
            .save_with_format(&input, image::ImageFormat::Png)
            .unwrap();
        assert_eq!(scheduler.tick().await, TickOutcome::Skipped);
        assert_eq!(controller.update_calls(), 0);
        assert_eq!(scheduler.state().current(), Color::BLACK);
        std::fs::remove_file(&input).unwrap();

        write_red_green(dir.path());
        std::fs::rename(dir.path().join("wall.png"), &input).unwrap();
        assert_eq!(scheduler.tick().await, TickOutcome::Completed);
        assert_eq!(scheduler.state().current(), RED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_colors_override_image() {
        let dir = tempfile::tempdir().unwrap();
        let controller = Arc::new(RecordingController::single_device(1));
        let mut config = config(&dir.path().join("missing.png"), 1);
        config.colors = vec![Color::new(0, 0, 255), Color::new(255, 255, 255)];
        let (mut scheduler, _tx) = scheduler(config, controller.clone()).await;

        scheduler.tick().await;
        scheduler.tick().await;
        scheduler.tick().await;
        assert_eq!(
            controller.pushed_colors(0),
            vec![
                Color::new(0, 0, 255),
                Color::new(255, 255, 255),
                Color::new(0, 0, 255)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_palette_follows_image_changes() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_red_green(dir.path());
        let controller = Arc::new(RecordingController::single_device(1));
        let (mut scheduler, _tx) = scheduler(config(&input, 1), controller.clone()).await;

        scheduler.tick().await;
        assert_eq!(scheduler.state().current(), RED);

        let blue = image::RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 255]));
        blue.save(&input).unwrap();
        // Make sure the modification time moves even on coarse filesystems
        let later = SystemTime::now() + Duration::from_secs(60);
        std::fs::File::options()
            .write(true)
            .open(&input)
            .unwrap()
            .set_modified(later)
            .unwrap();

        scheduler.tick().await;
        assert_eq!(scheduler.state().current(), Color::new(0, 0, 255));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_timestamp_rewrite_is_noticed() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_red_green(dir.path());
        let controller = Arc::new(RecordingController::single_device(1));
        let (mut scheduler, _tx) = scheduler(config(&input, 1), controller.clone()).await;

        scheduler.tick().await;
        assert_eq!(scheduler.state().current(), RED);
        let before = std::fs::metadata(&input).unwrap();
        let stamp = before.modified().unwrap();

        for side in 3.. {
            image::RgbImage::from_pixel(side, side, image::Rgb([0, 0, 255]))
                .save(&input)
                .unwrap();
            if std::fs::metadata(&input).unwrap().len() != before.len() {
                break;
            }
        }
        std::fs::File::options()
            .write(true)
            .open(&input)
            .unwrap()
            .set_modified(stamp)
            .unwrap();

        scheduler.tick().await;
        assert_eq!(scheduler.state().current(), Color::new(0, 0, 255));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_fade() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_red_green(dir.path());
        let controller = Arc::new(RecordingController::single_device(1));
        let mut config = config(&input, 10);
        config.interval = Duration::from_secs(1);
        let (scheduler, tx) = scheduler(config, controller.clone()).await;

        let task = tokio::spawn(scheduler.run());
        // Frames go out at 0 s, 1 s, 2 s and 3 s
        tokio::time::sleep(Duration::from_millis(3500)).await;
        tx.send(true).unwrap();

        let state = task.await.unwrap();
        let frames = controller.pushed_colors(0);
        assert_eq!(frames.len(), 4);
        assert_eq!(frames.last(), Some(&Color::new(102, 0, 0)));
        assert_eq!(state.current(), Color::new(102, 0, 0));

        // Nothing is pushed once the task is gone
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(controller.pushed_colors(0).len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_pause() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_red_green(dir.path());
        let controller = Arc::new(RecordingController::single_device(1));
        let mut config = config(&input, 2);
        config.pause_after_fade = Duration::from_secs(3600);
        let (scheduler, tx) = scheduler(config, controller.clone()).await;

        let task = tokio::spawn(scheduler.run());
        tokio::time::sleep(Duration::from_secs(10)).await;
        tx.send(true).unwrap();

        let state = task.await.unwrap();
        assert_eq!(state.current(), RED);
        assert_eq!(controller.pushed_colors(0).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_update_applies_next_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_red_green(dir.path());
        let controller = Arc::new(RecordingController::single_device(1));
        let first = config(&input, 1);
        let (updates_tx, updates_rx) = watch::channel(first.clone());
        let (scheduler, _tx) = scheduler(first.clone(), controller.clone()).await;
        let mut scheduler = scheduler.with_config_updates(updates_rx);

        scheduler.tick().await;
        assert_eq!(scheduler.state().current(), RED);

        // Even an unchanged configuration drops the cached palette
        assert!(scheduler.state().palette().is_some());
        updates_tx.send(first.clone()).unwrap();
        scheduler.apply_config_update();
        assert!(scheduler.state().palette().is_none());

        let mut second = first;
        second.colors = vec![Color::new(1, 2, 3)];
        updates_tx.send(second).unwrap();

        scheduler.tick().await;
        assert_eq!(scheduler.config().colors, vec![Color::new(1, 2, 3)]);
        assert_eq!(scheduler.state().current(), Color::new(1, 2, 3));
    }
}
