//! In-process engine that captures nothing.
//!
//! Every call is acknowledged and journaled, and the matching signals
//! are pushed straight into the sink. A [`LoopbackProbe`] shares the
//! engine's state so tests (and the worker's diagnostics) can script
//! failures and inspect what the controller asked for, even after the
//! engine itself was moved onto the worker thread.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use super::{
    AudioDevice, AudioDeviceKind, EngineAdapter, EngineEventSink, EngineSignal, InitRequest,
    StreamStats,
};
use crate::error::{EngineError, OUTPUT_SUCCESS};
use crate::message::Rect;
use crate::resolution::{Resolution, SourceFit};

pub const DEFAULT_BYTES_PER_TICK: u64 = 250_000;
pub const DEFAULT_FRAMES_PER_TICK: u32 = 30;

/// One call the controller made, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Initialize {
        title: String,
        resolution: Resolution,
    },
    StartRecording(PathBuf),
    StopRecording {
        force: bool,
    },
    StartStreaming {
        server: String,
        key: String,
    },
    StopStreaming {
        force: bool,
    },
    Release,
    StreamStats,
    ListDevices(AudioDeviceKind),
    SetAudioDevice {
        kind: AudioDeviceKind,
        id: String,
    },
    SetDownmixMono {
        kind: AudioDeviceKind,
        enable: bool,
    },
    SetMuted {
        kind: AudioDeviceKind,
        mute: bool,
    },
    UpdateVideoConfig {
        cursor: bool,
        compatibility: bool,
    },
    ApplyLayout {
        resolution: Resolution,
        fit: SourceFit,
    },
    CropSource(Rect),
}

// ── Shared state ─────────────────────────────────────────────────

struct Script {
    init_failure: Option<String>,
    refuse_recording: bool,
    refuse_streaming: bool,
    recording_stop_code: i32,
    streaming_stop_code: i32,
    device_failure: Option<String>,
    hold_signals: bool,
    bytes_per_tick: u64,
    frames_per_tick: u32,
    dropped_per_tick: u32,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            init_failure: None,
            refuse_recording: false,
            refuse_streaming: false,
            recording_stop_code: OUTPUT_SUCCESS,
            streaming_stop_code: OUTPUT_SUCCESS,
            device_failure: None,
            hold_signals: false,
            bytes_per_tick: DEFAULT_BYTES_PER_TICK,
            frames_per_tick: DEFAULT_FRAMES_PER_TICK,
            dropped_per_tick: 0,
        }
    }
}

#[derive(Default)]
struct Shared {
    script: Script,
    sink: Option<Arc<dyn EngineEventSink>>,
    journal: Vec<EngineCall>,
    held: VecDeque<EngineSignal>,
    initialized: bool,
    released: bool,
    recording: bool,
    streaming: bool,
    stats: StreamStats,
    devices: HashMap<AudioDeviceKind, Vec<AudioDevice>>,
    selected: HashMap<AudioDeviceKind, AudioDevice>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Queue or deliver `signals`. The lock is released before the sink runs.
fn emit(shared: &Mutex<Shared>, signals: Vec<EngineSignal>) {
    if signals.is_empty() {
        return;
    }
    let sink = {
        let mut state = lock(shared);
        if state.script.hold_signals {
            state.held.extend(signals);
            return;
        }
        state.sink.clone()
    };
    if let Some(sink) = sink {
        for signal in signals {
            sink.signal(signal);
        }
    }
}

fn unprompted_stop(recording: bool, code: i32) -> EngineSignal {
    let last_error = (code != OUTPUT_SUCCESS).then(|| format!("loopback code {code}"));
    if recording {
        EngineSignal::RecordingStopped { code, last_error }
    } else {
        EngineSignal::StreamingStopped { code, last_error }
    }
}

// ── LoopbackEngine ───────────────────────────────────────────────

pub struct LoopbackEngine {
    shared: Arc<Mutex<Shared>>,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// Engine whose stream counters advance by the given amounts on
    /// every stats query while streaming.
    pub fn with_stats_rate(bytes_per_tick: u64, frames_per_tick: u32) -> Self {
        let engine = Self::new();
        {
            let mut state = lock(&engine.shared);
            state.script.bytes_per_tick = bytes_per_tick;
            state.script.frames_per_tick = frames_per_tick;
        }
        engine
    }

    pub fn probe(&self) -> LoopbackProbe {
        LoopbackProbe {
            shared: Arc::clone(&self.shared),
        }
    }

    fn state(&self) -> MutexGuard<'_, Shared> {
        lock(&self.shared)
    }

    fn device_call(&self, call: EngineCall) -> Result<(), EngineError> {
        let mut state = self.state();
        state.journal.push(call);
        if !state.initialized {
            return Err(EngineError::NotInitialized);
        }
        match &state.script.device_failure {
            Some(reason) => Err(EngineError::Rejected(reason.clone())),
            None => Ok(()),
        }
    }
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineAdapter for LoopbackEngine {
    fn set_event_sink(&mut self, sink: Arc<dyn EngineEventSink>) {
        self.state().sink = Some(sink);
    }

    fn initialize(&mut self, request: &InitRequest) -> Result<(), EngineError> {
        let signal = {
            let mut state = self.state();
            state.journal.push(EngineCall::Initialize {
                title: request.title.clone(),
                resolution: request.resolution,
            });
            info!(
                title = %request.title,
                resolution = %request.resolution,
                config = %request.config_path.display(),
                "loopback engine initializing"
            );
            match state.script.init_failure.clone() {
                Some(reason) => EngineSignal::InitializeFailed { reason },
                None => {
                    state.initialized = true;
                    state.released = false;
                    EngineSignal::Initialized
                }
            }
        };
        emit(&self.shared, vec![signal]);
        Ok(())
    }

    fn start_recording(&mut self, path: &Path) -> bool {
        {
            let mut state = self.state();
            state.journal.push(EngineCall::StartRecording(path.to_path_buf()));
            if !state.initialized || state.script.refuse_recording || state.recording {
                return false;
            }
            state.recording = true;
        }
        debug!(path = %path.display(), "loopback recording started");
        emit(&self.shared, vec![EngineSignal::RecordingStarted]);
        true
    }

    fn stop_recording(&mut self, force: bool) {
        let code = {
            let mut state = self.state();
            state.journal.push(EngineCall::StopRecording { force });
            if !state.recording {
                return;
            }
            state.recording = false;
            state.script.recording_stop_code
        };
        let mut signals = Vec::with_capacity(2);
        if !force {
            signals.push(EngineSignal::RecordingStopping);
        }
        signals.push(EngineSignal::RecordingStopped {
            code,
            last_error: (code != OUTPUT_SUCCESS).then(|| format!("loopback code {code}")),
        });
        emit(&self.shared, signals);
    }

    fn start_streaming(&mut self, server: &str, key: &str) -> bool {
        {
            let mut state = self.state();
            state.journal.push(EngineCall::StartStreaming {
                server: server.to_string(),
                key: key.to_string(),
            });
            if !state.initialized || state.script.refuse_streaming || state.streaming {
                return false;
            }
            state.streaming = true;
        }
        debug!(%server, "loopback streaming started");
        emit(&self.shared, vec![EngineSignal::StreamingStarted]);
        true
    }

    fn stop_streaming(&mut self, force: bool) {
        let code = {
            let mut state = self.state();
            state.journal.push(EngineCall::StopStreaming { force });
            if !state.streaming {
                return;
            }
            state.streaming = false;
            state.script.streaming_stop_code
        };
        let mut signals = Vec::with_capacity(2);
        if !force {
            signals.push(EngineSignal::StreamingStopping);
        }
        signals.push(EngineSignal::StreamingStopped {
            code,
            last_error: (code != OUTPUT_SUCCESS).then(|| format!("loopback code {code}")),
        });
        emit(&self.shared, signals);
    }

    fn release(&mut self) {
        let mut state = self.state();
        state.journal.push(EngineCall::Release);
        if state.released {
            return;
        }
        state.released = true;
        state.initialized = false;
        state.recording = false;
        state.streaming = false;
        state.held.clear();
        info!("loopback engine released");
    }

    fn stream_stats(&self) -> Option<StreamStats> {
        let mut state = self.state();
        state.journal.push(EngineCall::StreamStats);
        if !state.initialized {
            return None;
        }
        if state.streaming {
            let (bytes, frames, dropped) = (
                state.script.bytes_per_tick,
                state.script.frames_per_tick,
                state.script.dropped_per_tick,
            );
            state.stats.total_bytes += bytes;
            state.stats.total_frames += frames;
            state.stats.dropped_frames += dropped;
        }
        Some(state.stats)
    }

    fn list_devices(&self, kind: AudioDeviceKind) -> Result<Vec<AudioDevice>, EngineError> {
        let mut state = self.state();
        state.journal.push(EngineCall::ListDevices(kind));
        if !state.initialized {
            return Err(EngineError::NotInitialized);
        }
        Ok(state.devices.get(&kind).cloned().unwrap_or_default())
    }

    fn set_audio_device(&mut self, kind: AudioDeviceKind, device: &AudioDevice) -> Result<(), EngineError> {
        self.device_call(EngineCall::SetAudioDevice {
            kind,
            id: device.id.clone(),
        })?;
        self.state().selected.insert(kind, device.clone());
        Ok(())
    }

    fn set_downmix_mono(&mut self, kind: AudioDeviceKind, enable: bool) -> Result<(), EngineError> {
        self.device_call(EngineCall::SetDownmixMono { kind, enable })
    }

    fn set_muted(&mut self, kind: AudioDeviceKind, mute: bool) -> Result<(), EngineError> {
        self.device_call(EngineCall::SetMuted { kind, mute })
    }

    fn update_video_config(&mut self, cursor: bool, compatibility: bool) -> Result<(), EngineError> {
        self.device_call(EngineCall::UpdateVideoConfig {
            cursor,
            compatibility,
        })
    }

    fn apply_layout(&mut self, resolution: &Resolution, fit: SourceFit) -> Result<(), EngineError> {
        self.device_call(EngineCall::ApplyLayout {
            resolution: *resolution,
            fit,
        })
    }

    fn crop_source(&mut self, rect: Rect) -> Result<(), EngineError> {
        self.device_call(EngineCall::CropSource(rect))
    }
}

// ── LoopbackProbe ────────────────────────────────────────────────

/// Scripting and inspection handle for a [`LoopbackEngine`].
#[derive(Clone)]
pub struct LoopbackProbe {
    shared: Arc<Mutex<Shared>>,
}

impl LoopbackProbe {
    fn state(&self) -> MutexGuard<'_, Shared> {
        lock(&self.shared)
    }

    /// Make the next `initialize` report failure with `reason`.
    pub fn fail_initialize(&self, reason: Option<&str>) {
        self.state().script.init_failure = reason.map(str::to_string);
    }

    pub fn refuse_recording(&self, refuse: bool) {
        self.state().script.refuse_recording = refuse;
    }

    pub fn refuse_streaming(&self, refuse: bool) {
        self.state().script.refuse_streaming = refuse;
    }

    pub fn set_recording_stop_code(&self, code: i32) {
        self.state().script.recording_stop_code = code;
    }

    pub fn set_streaming_stop_code(&self, code: i32) {
        self.state().script.streaming_stop_code = code;
    }

    /// Make every device/video call fail with `reason`.
    pub fn fail_device_calls(&self, reason: Option<&str>) {
        self.state().script.device_failure = reason.map(str::to_string);
    }

    pub fn set_devices(&self, kind: AudioDeviceKind, devices: Vec<AudioDevice>) {
        self.state().devices.insert(kind, devices);
    }

    pub fn set_dropped_per_tick(&self, dropped: u32) {
        self.state().script.dropped_per_tick = dropped;
    }

    /// Queue signals instead of delivering them until [`flush_signals`]
    /// is called.
    ///
    /// [`flush_signals`]: Self::flush_signals
    pub fn hold_signals(&self, hold: bool) {
        self.state().script.hold_signals = hold;
    }

    /// Deliver every held signal in order. Returns how many were sent.
    pub fn flush_signals(&self) -> usize {
        let (signals, sink) = {
            let mut state = self.state();
            (std::mem::take(&mut state.held), state.sink.clone())
        };
        let count = signals.len();
        if let Some(sink) = sink {
            for signal in signals {
                sink.signal(signal);
            }
        }
        count
    }

    /// End a running recording from the engine side with `code`, as a
    /// full disk or a lost device would. Nothing is journaled.
    pub fn drop_recording(&self, code: i32) -> bool {
        {
            let mut state = self.state();
            if !state.recording {
                return false;
            }
            state.recording = false;
        }
        emit(&self.shared, vec![unprompted_stop(true, code)]);
        true
    }

    /// End a running stream from the engine side with `code`, as a
    /// dropped server connection would.
    pub fn drop_streaming(&self, code: i32) -> bool {
        {
            let mut state = self.state();
            if !state.streaming {
                return false;
            }
            state.streaming = false;
        }
        emit(&self.shared, vec![unprompted_stop(false, code)]);
        true
    }

    pub fn journal(&self) -> Vec<EngineCall> {
        self.state().journal.clone()
    }

    /// Number of journaled calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.state().journal.iter().filter(|c| predicate(c)).count()
    }

    pub fn selected_device(&self, kind: AudioDeviceKind) -> Option<AudioDevice> {
        self.state().selected.get(&kind).cloned()
    }

    pub fn is_recording(&self) -> bool {
        self.state().recording
    }

    pub fn is_streaming(&self) -> bool {
        self.state().streaming
    }

    pub fn is_released(&self) -> bool {
        self.state().released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OUTPUT_NO_SPACE;
    use crate::message::Size;

    #[derive(Default)]
    struct Collect(Mutex<Vec<EngineSignal>>);

    impl EngineEventSink for Collect {
        fn signal(&self, signal: EngineSignal) {
            self.0.lock().unwrap().push(signal);
        }
    }

    impl Collect {
        fn take(&self) -> Vec<EngineSignal> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    fn request() -> InitRequest {
        InitRequest {
            config_path: PathBuf::from("/tmp/cfg"),
            title: "Lesson".into(),
            resolution: Resolution::plan(Size::new(1920, 1080), Rect::new(0, 0, 1920, 1080)).unwrap(),
            crop: Rect::new(0, 0, 1920, 1080),
        }
    }

    fn ready_engine() -> (LoopbackEngine, Arc<Collect>) {
        let sink = Arc::new(Collect::default());
        let mut engine = LoopbackEngine::new();
        engine.set_event_sink(sink.clone());
        engine.initialize(&request()).unwrap();
        assert_eq!(sink.take(), vec![EngineSignal::Initialized]);
        (engine, sink)
    }

    #[test]
    fn scripted_init_failure() {
        let sink = Arc::new(Collect::default());
        let mut engine = LoopbackEngine::new();
        engine.set_event_sink(sink.clone());
        engine.probe().fail_initialize(Some("no capture window"));
        engine.initialize(&request()).unwrap();
        assert_eq!(
            sink.take(),
            vec![EngineSignal::InitializeFailed {
                reason: "no capture window".into()
            }]
        );
        assert!(!engine.start_recording(Path::new("/tmp/a.mp4")));
    }

    #[test]
    fn recording_cycle_emits_signals() {
        let (mut engine, sink) = ready_engine();
        assert!(engine.start_recording(Path::new("/tmp/a.mp4")));
        engine.stop_recording(false);
        assert_eq!(
            sink.take(),
            vec![
                EngineSignal::RecordingStarted,
                EngineSignal::RecordingStopping,
                EngineSignal::RecordingStopped {
                    code: OUTPUT_SUCCESS,
                    last_error: None
                },
            ]
        );
    }

    #[test]
    fn stop_code_is_scripted() {
        let (mut engine, sink) = ready_engine();
        engine.probe().set_recording_stop_code(OUTPUT_NO_SPACE);
        engine.start_recording(Path::new("/tmp/a.mp4"));
        engine.stop_recording(true);
        let signals = sink.take();
        assert!(matches!(
            signals.last(),
            Some(EngineSignal::RecordingStopped { code, last_error: Some(_) }) if *code == OUTPUT_NO_SPACE
        ));
    }

    #[test]
    fn stop_without_active_output_is_silent() {
        let (mut engine, sink) = ready_engine();
        engine.stop_streaming(false);
        assert!(sink.take().is_empty());
    }

    #[test]
    fn held_signals_flush_in_order() {
        let (mut engine, sink) = ready_engine();
        let probe = engine.probe();
        probe.hold_signals(true);
        engine.start_streaming("rtmp://x", "k");
        engine.start_recording(Path::new("/tmp/a.mp4"));
        assert!(sink.take().is_empty());
        assert_eq!(probe.flush_signals(), 2);
        assert_eq!(
            sink.take(),
            vec![EngineSignal::StreamingStarted, EngineSignal::RecordingStarted]
        );
    }

    #[test]
    fn stats_advance_only_while_streaming() {
        let (mut engine, _sink) = ready_engine();
        assert_eq!(engine.stream_stats(), Some(StreamStats::default()));
        engine.start_streaming("rtmp://x", "k");
        engine.probe().set_dropped_per_tick(2);
        let first = engine.stream_stats().unwrap();
        let second = engine.stream_stats().unwrap();
        assert_eq!(first.total_bytes, DEFAULT_BYTES_PER_TICK);
        assert_eq!(second.total_frames, 2 * DEFAULT_FRAMES_PER_TICK);
        assert_eq!(second.dropped_frames, 4);
    }

    #[test]
    fn release_is_idempotent_but_journaled() {
        let (mut engine, _sink) = ready_engine();
        engine.release();
        engine.release();
        let probe = engine.probe();
        assert!(probe.is_released());
        assert_eq!(probe.count(|c| matches!(c, EngineCall::Release)), 2);
        assert_eq!(engine.stream_stats(), None);
    }

    #[test]
    fn device_calls_need_initialize() {
        let mut engine = LoopbackEngine::new();
        assert_eq!(
            engine.set_muted(AudioDeviceKind::Input, true),
            Err(EngineError::NotInitialized)
        );
    }

    #[test]
    fn device_failure_is_scripted() {
        let (mut engine, _sink) = ready_engine();
        engine.probe().fail_device_calls(Some("device busy"));
        assert_eq!(
            engine.update_video_config(true, false),
            Err(EngineError::Rejected("device busy".into()))
        );
    }

    #[test]
    fn dropped_stream_signals_without_a_stop_call() {
        let (mut engine, sink) = ready_engine();
        let probe = engine.probe();
        assert!(!probe.drop_streaming(OUTPUT_NO_SPACE));

        engine.start_streaming("rtmp://x", "k");
        sink.take();
        assert!(probe.drop_streaming(-5));
        assert_eq!(
            sink.take(),
            vec![EngineSignal::StreamingStopped {
                code: -5,
                last_error: Some("loopback code -5".into())
            }]
        );
        assert!(!probe.is_streaming());
        assert_eq!(probe.count(|c| matches!(c, EngineCall::StopStreaming { .. })), 0);

        engine.start_recording(Path::new("/tmp/a.mp4"));
        sink.take();
        assert!(probe.drop_recording(OUTPUT_NO_SPACE));
        assert!(matches!(
            sink.take().as_slice(),
            [EngineSignal::RecordingStopped { code: OUTPUT_NO_SPACE, .. }]
        ));
    }
}
