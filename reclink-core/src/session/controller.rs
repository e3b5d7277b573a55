//! The session controller: validates host commands, drives the engine,
//! folds engine signals back into session state and reports events.
//!
//! The controller is single-threaded. Commands and signals are fed to it
//! one at a time from the worker inbox, so every handler runs to
//! completion before the next message is looked at.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::config::{STREAM_RETRY_INTERVAL, STREAM_RETRY_LIMIT, SessionConfig};
use super::state::{Lifecycle, OutputPhase, SessionState};
use crate::engine::{
    AudioDevice, AudioDeviceKind, EngineAdapter, EngineSignal, InitRequest, select_device,
};
use crate::error::{EngineError, OutputFailure};
use crate::message::{Command, ErrorKind, Event, Rect, Size};
use crate::reporter::EventReporter;
use crate::resolution::Resolution;
use crate::stats::StreamStatsSampler;

const INVALID_PARAMETERS: &str = "invalid parameters";
const FAILED_TO_START: &str = "failed to start";
const NOT_READY: &str = "session not ready";
const ALREADY_INITIALIZED: &str = "session already initialized";

// ── Output tracking ──────────────────────────────────────────────

/// Phase of one output plus the config it was started with.
#[derive(Debug, Default)]
struct OutputTracker {
    phase: OutputPhase,
    snapshot: Option<Arc<SessionConfig>>,
}

/// Which output a signal or command is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Recording,
    Streaming,
}

impl Output {
    fn error_kind(self) -> ErrorKind {
        match self {
            Self::Recording => ErrorKind::Recording,
            Self::Streaming => ErrorKind::Streaming,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Recording => "recording",
            Self::Streaming => "streaming",
        }
    }
}

// ── SessionController ────────────────────────────────────────────

pub struct SessionController {
    engine: Box<dyn EngineAdapter>,
    events: EventReporter,
    lifecycle: Lifecycle,
    recording: OutputTracker,
    streaming: OutputTracker,
    config: Arc<SessionConfig>,
    resolution: Option<Resolution>,
    stats: Option<StreamStatsSampler>,
    /// Set when a stream start also started a recording; the matching
    /// stream stop clears it and stops that recording.
    coupled: bool,
    last_error: Option<ErrorKind>,
    released: bool,
}

impl SessionController {
    /// `engine` must already have its event sink installed.
    pub fn new(
        engine: Box<dyn EngineAdapter>,
        events: EventReporter,
        record_when_streaming: bool,
    ) -> Self {
        Self {
            engine,
            events,
            lifecycle: Lifecycle::default(),
            recording: OutputTracker::default(),
            streaming: OutputTracker::default(),
            config: SessionConfig::new(record_when_streaming),
            resolution: None,
            stats: None,
            coupled: false,
            last_error: None,
            released: false,
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        SessionState::derive(self.lifecycle, self.recording.phase, self.streaming.phase)
    }

    /// Kind of the most recent failed transition, cleared by the next
    /// successful one.
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    pub fn recording_phase(&self) -> OutputPhase {
        self.recording.phase
    }

    pub fn streaming_phase(&self) -> OutputPhase {
        self.streaming.phase
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    pub fn config(&self) -> &Arc<SessionConfig> {
        &self.config
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    // ── Reporting ────────────────────────────────────────────────

    fn emit(&mut self, event: Event) {
        self.last_error = match &event {
            Event::ErrorOccurred { kind, .. } => Some(*kind),
            _ => None,
        };
        if self.events.report(event).is_err() {
            debug!("event dropped, reporter is gone");
        }
    }

    fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) {
        let message = message.into();
        warn!(%kind, %message, "reporting error");
        self.emit(Event::error(kind, message));
    }

    fn client_result(&mut self, what: &'static str, result: Result<(), EngineError>) {
        if let Err(e) = result {
            error!(operation = what, error = %e, "engine call failed");
            self.fail(ErrorKind::Client, e.to_string());
        }
    }

    // ── Commands ─────────────────────────────────────────────────

    pub fn handle_command(&mut self, command: Command) {
        debug!(?command, state = %self.state(), "command");

        if !matches!(command, Command::Init { .. }) && !self.lifecycle.is_ready() {
            self.fail(ErrorKind::Client, NOT_READY);
            return;
        }

        match command {
            Command::Init {
                config_path,
                title,
                screen_size,
                crop_rect,
            } => self.init(&config_path, title, screen_size, crop_rect),
            Command::ScaleVideo { size } => self.scale_video(size),
            Command::CropVideo { rect } => self.crop_video(rect),
            Command::UpdateVideoConfig {
                cursor,
                compatibility,
            } => {
                info!(cursor, compatibility, "update video config");
                let result = self.engine.update_video_config(cursor, compatibility);
                self.client_result("update_video_config", result);
            }
            Command::ResetAudioInput { device_desc, .. } => {
                self.reset_audio(AudioDeviceKind::Input, &device_desc)
            }
            Command::ResetAudioOutput { device_desc, .. } => {
                self.reset_audio(AudioDeviceKind::Output, &device_desc)
            }
            Command::DownmixMonoInput { enable } => {
                let result = self.engine.set_downmix_mono(AudioDeviceKind::Input, enable);
                self.client_result("set_downmix_mono", result);
            }
            Command::DownmixMonoOutput { enable } => {
                let result = self.engine.set_downmix_mono(AudioDeviceKind::Output, enable);
                self.client_result("set_downmix_mono", result);
            }
            Command::MuteAudioInput { mute } => {
                let result = self.engine.set_muted(AudioDeviceKind::Input, mute);
                self.client_result("set_muted", result);
            }
            Command::MuteAudioOutput { mute } => {
                let result = self.engine.set_muted(AudioDeviceKind::Output, mute);
                self.client_result("set_muted", result);
            }
            Command::StartRecording { output_path } => self.start_recording(&output_path),
            Command::StopRecording { force } => self.stop_recording(force),
            Command::StartStreaming { server, key } => self.start_streaming(&server, &key),
            Command::StopStreaming { force } => self.stop_streaming(force),
            Command::LogStreamStats => self.log_stream_stats(),
        }
    }

    fn init(&mut self, config_path: &Path, title: String, screen: Size, crop: Rect) {
        if !matches!(self.lifecycle, Lifecycle::Uninitialized) {
            self.fail(ErrorKind::Initializing, ALREADY_INITIALIZED);
            return;
        }
        if config_path.as_os_str().is_empty() || title.is_empty() || screen.is_empty() || crop.is_empty() {
            warn!(
                config = %config_path.display(),
                %title,
                %screen,
                %crop,
                "init parameters invalid"
            );
            self.fail(ErrorKind::Initializing, INVALID_PARAMETERS);
            return;
        }

        let resolution = match Resolution::plan(screen, crop) {
            Ok(r) => r,
            Err(e) => {
                self.fail(ErrorKind::Initializing, e.to_string());
                return;
            }
        };
        info!(%resolution, "final resolution");

        if let Err(e) = self.lifecycle.begin_init() {
            self.fail(ErrorKind::Initializing, e.to_string());
            return;
        }
        self.resolution = Some(resolution);

        let request = InitRequest {
            config_path: config_path.to_path_buf(),
            title,
            resolution,
            crop,
        };
        if let Err(e) = self.engine.initialize(&request) {
            // Cannot fail: begin_init just moved us to Initializing.
            let _ = self.lifecycle.fail_init();
            self.resolution = None;
            self.fail(ErrorKind::Initializing, e.to_string());
        }
    }

    fn scale_video(&mut self, size: Size) {
        if size.is_empty() {
            self.fail(ErrorKind::Client, INVALID_PARAMETERS);
            return;
        }
        let Some(current) = self.resolution else {
            self.fail(ErrorKind::Client, NOT_READY);
            return;
        };
        if current.original == size {
            debug!(%size, "scale unchanged");
            return;
        }
        self.relayout(current.with_original(size));
    }

    fn crop_video(&mut self, rect: Rect) {
        if rect.is_empty() {
            warn!(%rect, "source crop rect is empty");
            self.fail(ErrorKind::Client, INVALID_PARAMETERS);
            return;
        }
        let Some(current) = self.resolution else {
            self.fail(ErrorKind::Client, NOT_READY);
            return;
        };
        info!(%rect, "update source crop");
        let result = self.engine.crop_source(rect);
        if result.is_err() {
            self.client_result("crop_source", result);
            return;
        }
        if current.original != rect.size() {
            self.relayout(current.with_original(rect.size()));
        }
    }

    fn relayout(&mut self, resolution: Resolution) {
        let fit = resolution.fit();
        info!(
            original = %resolution.original,
            scale = fit.scale,
            x = fit.x,
            y = fit.y,
            "scale scene"
        );
        let result = self.engine.apply_layout(&resolution, fit);
        if result.is_ok() {
            self.resolution = Some(resolution);
        }
        self.client_result("apply_layout", result);
    }

    fn reset_audio(&mut self, kind: AudioDeviceKind, description: &str) {
        let devices = match self.engine.list_devices(kind) {
            Ok(d) => d,
            Err(e) => {
                self.client_result("list_devices", Err(e));
                return;
            }
        };
        let device = match select_device(&devices, description) {
            Some(d) => d.clone(),
            None => AudioDevice::system_default(kind),
        };
        info!(%kind, device = %device.name, id = %device.id, "reset audio device");
        let result = self.engine.set_audio_device(kind, &device);
        self.client_result("set_audio_device", result);
    }

    fn start_recording(&mut self, path: &Path) {
        if path.as_os_str().is_empty() {
            error!("record parameter invalid, empty output path");
            self.fail(ErrorKind::Recording, INVALID_PARAMETERS);
            return;
        }
        match self.recording.phase {
            OutputPhase::Starting | OutputPhase::Active => {
                debug!("recording already running");
                return;
            }
            OutputPhase::Stopping => {
                self.fail(ErrorKind::Recording, "recording is still stopping");
                return;
            }
            OutputPhase::Idle => {}
        }

        if self.config.output_path != path {
            info!(path = %path.display(), "record output file path");
            self.config = self.config.with_output_path(path);
        }
        if let Err(e) = self.recording.phase.begin_start() {
            self.fail(ErrorKind::Recording, e.to_string());
            return;
        }
        self.recording.snapshot = Some(Arc::clone(&self.config));

        if !self.engine.start_recording(path) {
            error!("record start failed");
            let _ = self.recording.phase.abort_start();
            self.recording.snapshot = None;
            self.fail(ErrorKind::Recording, FAILED_TO_START);
        }
    }

    fn stop_recording(&mut self, force: bool) {
        match self.recording.phase {
            OutputPhase::Idle => debug!("recording not running"),
            OutputPhase::Starting | OutputPhase::Active => {
                let _ = self.recording.phase.begin_stop();
                self.engine.stop_recording(force);
            }
            OutputPhase::Stopping if force => {
                info!("escalating recording stop");
                self.engine.stop_recording(true);
            }
            OutputPhase::Stopping => debug!("recording already stopping"),
        }
    }

    fn start_streaming(&mut self, server: &str, key: &str) {
        if server.is_empty() || key.is_empty() {
            error!(%server, "stream parameter invalid");
            self.fail(ErrorKind::Streaming, INVALID_PARAMETERS);
            return;
        }
        match self.streaming.phase {
            OutputPhase::Starting | OutputPhase::Active => {
                debug!("streaming already running");
                return;
            }
            OutputPhase::Stopping => {
                self.fail(ErrorKind::Streaming, "streaming is still stopping");
                return;
            }
            OutputPhase::Idle => {}
        }

        if self.config.server != server || self.config.key != key {
            info!(%server, "stream url");
            self.config = self.config.with_stream_target(server, key);
        }
        if let Err(e) = self.streaming.phase.begin_start() {
            self.fail(ErrorKind::Streaming, e.to_string());
            return;
        }
        self.streaming.snapshot = Some(Arc::clone(&self.config));

        if !self.engine.start_streaming(server, key) {
            error!("stream start failed");
            let _ = self.streaming.phase.abort_start();
            self.streaming.snapshot = None;
            self.fail(ErrorKind::Streaming, FAILED_TO_START);
            return;
        }
        debug!(
            retry_limit = STREAM_RETRY_LIMIT,
            retry_interval_secs = STREAM_RETRY_INTERVAL.as_secs(),
            "automatic reconnect disabled"
        );

        // Issued before the stream has confirmed it is live.
        if self.config.record_when_streaming {
            self.coupled = true;
            let path = self.config.output_path.clone();
            self.start_recording(&path);
        }

        self.stats = self.engine.stream_stats().map(StreamStatsSampler::start);
    }

    fn stop_streaming(&mut self, force: bool) {
        match self.streaming.phase {
            OutputPhase::Idle => debug!("streaming not running"),
            OutputPhase::Starting | OutputPhase::Active => {
                let _ = self.streaming.phase.begin_stop();
                self.engine.stop_streaming(force);
            }
            OutputPhase::Stopping if force => {
                info!("escalating streaming stop");
                self.engine.stop_streaming(true);
            }
            OutputPhase::Stopping => debug!("streaming already stopping"),
        }

        if self.config.record_when_streaming && self.coupled {
            self.coupled = false;
            self.stop_recording(force);
        }
    }

    fn log_stream_stats(&mut self) {
        let Some(sampler) = self.stats.as_mut() else {
            warn!("no stream has been started, no stats to log");
            return;
        };
        match self.engine.stream_stats() {
            Some(stats) => {
                let sample = sampler.sample(stats);
                info!(
                    kbps = sample.kbps,
                    frames = sample.frames,
                    dropped = sample.dropped,
                    "stream stats, {sample}"
                );
            }
            None => warn!("engine has no stream output"),
        }
    }

    // ── Signals ──────────────────────────────────────────────────

    pub fn handle_signal(&mut self, signal: EngineSignal) {
        debug!(?signal, state = %self.state(), "engine signal");
        match signal {
            EngineSignal::Initialized => match self.lifecycle.complete_init() {
                Ok(()) => {
                    info!("engine initialized");
                    self.emit(Event::Initialized);
                }
                Err(e) => warn!(error = %e, "ignoring initialized signal"),
            },
            EngineSignal::InitializeFailed { reason } => match self.lifecycle.fail_init() {
                Ok(()) => {
                    self.resolution = None;
                    self.fail(ErrorKind::Initializing, reason);
                }
                Err(e) => warn!(error = %e, %reason, "ignoring init failure signal"),
            },
            EngineSignal::RecordingStarted => self.output_started(Output::Recording),
            EngineSignal::StreamingStarted => self.output_started(Output::Streaming),
            EngineSignal::RecordingStopping => info!("recording stopping"),
            EngineSignal::StreamingStopping => info!("streaming stopping"),
            EngineSignal::RecordingStopped { code, last_error } => {
                self.output_stopped(Output::Recording, code, last_error)
            }
            EngineSignal::StreamingStopped { code, last_error } => {
                self.output_stopped(Output::Streaming, code, last_error)
            }
        }
    }

    fn tracker(&mut self, output: Output) -> &mut OutputTracker {
        match output {
            Output::Recording => &mut self.recording,
            Output::Streaming => &mut self.streaming,
        }
    }

    fn output_started(&mut self, output: Output) {
        if let Err(e) = self.tracker(output).phase.mark_active() {
            debug!(output = output.name(), error = %e, "ignoring started signal");
            return;
        }
        info!(output = output.name(), "output started");
        self.emit(match output {
            Output::Recording => Event::RecordingStarted,
            Output::Streaming => Event::StreamingStarted,
        });
    }

    fn output_stopped(&mut self, output: Output, code: i32, last_error: Option<String>) {
        let tracker = self.tracker(output);
        if let Err(e) = tracker.phase.finish_stop() {
            warn!(output = output.name(), code, error = %e, "ignoring stopped signal");
            return;
        }
        let snapshot = tracker.snapshot.take();

        let failure = match output {
            Output::Recording => OutputFailure::from_recording_code(code),
            Output::Streaming => OutputFailure::from_streaming_code(code),
        };
        if let Some(failure) = failure {
            error!(
                output = output.name(),
                code,
                last_error = last_error.as_deref().unwrap_or(""),
                "output stopped abnormally"
            );
            self.fail(output.error_kind(), failure.to_string());
            return;
        }

        info!(output = output.name(), "output finished");
        match output {
            Output::Recording => {
                let path = snapshot
                    .map(|cfg| cfg.output_path.clone())
                    .unwrap_or_else(|| self.config.output_path.clone());
                self.emit(Event::RecordingStopped { path });
            }
            Output::Streaming => self.emit(Event::StreamingStopped),
        }
    }

    // ── Shutdown ─────────────────────────────────────────────────

    /// Disconnect sequence: stop whatever is running without force, then
    /// release the engine. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.released {
            return;
        }
        info!(state = %self.state(), "shutting down session");
        if self.streaming.phase.is_running() {
            let _ = self.streaming.phase.begin_stop();
            self.engine.stop_streaming(false);
        }
        if self.recording.phase.is_running() {
            let _ = self.recording.phase.begin_stop();
            self.engine.stop_recording(false);
        }
        self.engine.release();
        self.lifecycle.release();
        self.released = true;
    }
}
