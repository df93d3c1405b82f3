//! Protocol bridge: smooths selected biometric channels and encodes them
//! as MIDI 2.0 packets for downstream synthesis voices.
//!
//! Smoothing lives here rather than in the aggregator: the synthesis
//! voices reading these packets are sensitive to stepwise jumps, while
//! the mapper and UI want instantaneous values.
//!
//! [`ProtocolBridge::process`] is meant to be driven from the audio thread
//! once per buffer. It never blocks, allocates or logs. It does nothing unless
//! the bridge is started, a sink is registered and a state source is
//! attached; all three are re-checked on every tick.

pub mod ump;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BioResult, ConfigError};
use crate::mapper::normalize;
use crate::state::{BiometricState, SharedState};

pub use ump::{controllers, quantize_u16, quantize_u32, MessageClass, ProtocolMessage, Status};

/// Bounds for both smoothing factors.
pub const MAX_SMOOTHING: f64 = 0.99;

// ── Channels ────────────────────────────────────────────────

/// A biometric quantity the bridge can stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BioChannel {
    HeartRate,
    Hrv,
    BreathingRate,
    BreathingPhase,
    Gsr,
    EegAlpha,
    EegBeta,
    EegTheta,
    Focus,
    Relaxation,
    Coherence,
}

impl BioChannel {
    /// Raw reading in the channel's natural unit.
    pub fn read(self, state: &BiometricState) -> f64 {
        match self {
            BioChannel::HeartRate => state.heart_rate,
            BioChannel::Hrv => state.hrv,
            BioChannel::BreathingRate => state.breathing_rate,
            BioChannel::BreathingPhase => {
                if state.inhaling { 1.0 } else { 0.0 }
            }
            BioChannel::Gsr => state.stress_index,
            BioChannel::EegAlpha => state.alpha,
            BioChannel::EegBeta => state.beta,
            BioChannel::EegTheta => state.theta,
            BioChannel::Focus => state.focus,
            BioChannel::Relaxation => state.relaxation,
            BioChannel::Coherence => state.coherence,
        }
    }
}

/// Which of the two smoothing factors a channel uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingRate {
    #[default]
    Slow,
    Fast,
}

/// One outbound controller stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelMapping {
    pub source: BioChannel,
    pub controller: u8,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Raw value mapped to 0.
    pub min: f64,
    /// Raw value mapped to 1.
    pub max: f64,
    #[serde(default)]
    pub rate: SmoothingRate,
}

fn enabled_by_default() -> bool {
    true
}

impl ChannelMapping {
    pub const fn new(source: BioChannel, controller: u8, min: f64, max: f64, rate: SmoothingRate) -> Self {
        ChannelMapping {
            source,
            controller,
            enabled: true,
            min,
            max,
            rate,
        }
    }
}

// ── Configuration ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    pub group: u8,
    /// Channel carrying the per-channel controller messages.
    pub control_channel: u8,
    /// Channel carrying the per-note (breath voice) messages.
    pub voice_channel: u8,
    /// Factor for channels where smoothness matters more than latency.
    pub slow_smoothing: f64,
    /// Factor for latency-sensitive channels.
    pub fast_smoothing: f64,
    /// Emit breath-synchronized note on/off and poly pressure.
    pub breath_voice: bool,
    pub breath_note: u8,
    pub channels: Vec<ChannelMapping>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        use controllers::bio;
        use SmoothingRate::{Fast, Slow};

        BridgeConfig {
            group: 0,
            control_channel: 0,
            voice_channel: 1,
            slow_smoothing: 0.9,
            fast_smoothing: 0.5,
            breath_voice: true,
            breath_note: 60,
            channels: vec![
                ChannelMapping::new(BioChannel::HeartRate, bio::HEART_RATE, 40.0, 180.0, Fast),
                ChannelMapping::new(BioChannel::Hrv, bio::HRV_COHERENCE, 0.0, 150.0, Slow),
                ChannelMapping::new(BioChannel::BreathingRate, bio::BREATHING_RATE, 0.0, 30.0, Slow),
                ChannelMapping::new(BioChannel::BreathingPhase, bio::BREATHING_PHASE, 0.0, 1.0, Fast),
                ChannelMapping::new(BioChannel::Gsr, bio::GSR, 0.0, 1.0, Slow),
                ChannelMapping::new(BioChannel::EegAlpha, bio::EEG_ALPHA, 0.0, 1.0, Slow),
                ChannelMapping::new(BioChannel::EegBeta, bio::EEG_BETA, 0.0, 1.0, Slow),
                ChannelMapping::new(BioChannel::EegTheta, bio::EEG_THETA, 0.0, 1.0, Slow),
                ChannelMapping::new(BioChannel::Focus, bio::FOCUS, 0.0, 1.0, Fast),
            ],
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> BioResult<()> {
        for (name, value) in [("slow_smoothing", self.slow_smoothing), ("fast_smoothing", self.fast_smoothing)] {
            if !(0.0..=MAX_SMOOTHING).contains(&value) {
                return Err(ConfigError::SmoothingFactor { name, value }.into());
            }
        }
        for (name, value) in [("control_channel", self.control_channel), ("voice_channel", self.voice_channel)] {
            if value > 15 {
                return Err(ConfigError::Channel { name, value }.into());
            }
        }
        if self.group > 15 {
            return Err(ConfigError::Group { value: self.group }.into());
        }

        let mut seen = [false; 128];
        for ch in &self.channels {
            if !(ch.min < ch.max) {
                return Err(ConfigError::InvertedRange {
                    channel: format!("{:?}", ch.source),
                    min: ch.min,
                    max: ch.max,
                }
                .into());
            }
            let slot = &mut seen[(ch.controller & 0x7F) as usize];
            if *slot {
                return Err(ConfigError::DuplicateController { controller: ch.controller }.into());
            }
            *slot = true;
        }
        Ok(())
    }

    fn factor(&self, rate: SmoothingRate) -> f64 {
        let f = match rate {
            SmoothingRate::Slow => self.slow_smoothing,
            SmoothingRate::Fast => self.fast_smoothing,
        };
        if f.is_nan() { 0.0 } else { f.clamp(0.0, MAX_SMOOTHING) }
    }
}

// ── Sink ────────────────────────────────────────────────────

/// Consumer of encoded packets, invoked once per message from `process()`.
///
/// Implementations must not block; they run on the real-time thread.
pub trait MessageSink: Send {
    fn send(&mut self, message: &ProtocolMessage);
}

impl<F> MessageSink for F
where
    F: FnMut(&ProtocolMessage) + Send,
{
    fn send(&mut self, message: &ProtocolMessage) {
        self(message)
    }
}

// ── Bridge ──────────────────────────────────────────────────

/// One-pole smoother, seeded with the first value it sees.
#[derive(Debug, Clone, Copy, Default)]
struct Smoother {
    value: f64,
    primed: bool,
}

impl Smoother {
    #[inline]
    fn step(&mut self, raw: f64, factor: f64) -> f64 {
        if self.primed {
            self.value = self.value * factor + raw * (1.0 - factor);
        } else {
            self.value = raw;
            self.primed = true;
        }
        self.value
    }
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Ticks that encoded at least the controller streams.
    pub ticks: u64,
    pub messages: u64,
    /// Ticks that found every precondition met but no readable state.
    pub skipped: u64,
}

pub struct ProtocolBridge {
    config: BridgeConfig,
    smoothers: Vec<Smoother>,
    coherence: Smoother,
    running: bool,
    sink: Option<Box<dyn MessageSink>>,
    source: Option<SharedState>,
    last_state: Option<BiometricState>,
    note_active: bool,
    stats: BridgeStats,
}

impl Default for ProtocolBridge {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

impl std::fmt::Debug for ProtocolBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolBridge")
            .field("running", &self.running)
            .field("has_sink", &self.sink.is_some())
            .field("has_source", &self.source.is_some())
            .field("note_active", &self.note_active)
            .field("stats", &self.stats)
            .finish()
    }
}

impl ProtocolBridge {
    pub fn new(config: BridgeConfig) -> Self {
        let smoothers = vec![Smoother::default(); config.channels.len()];
        ProtocolBridge {
            config,
            smoothers,
            coherence: Smoother::default(),
            running: false,
            sink: None,
            source: None,
            last_state: None,
            note_active: false,
            stats: BridgeStats::default(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Swap configuration. Smoothing history restarts.
    pub fn set_config(&mut self, config: BridgeConfig) {
        self.release_note();
        self.smoothers = vec![Smoother::default(); config.channels.len()];
        self.coherence = Smoother::default();
        self.config = config;
    }

    pub fn start(&mut self) {
        self.running = true;
        debug!("protocol bridge started");
    }

    /// Stop encoding. A sounding breath note is released first.
    pub fn stop(&mut self) {
        self.release_note();
        self.running = false;
        debug!("protocol bridge stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_sink(&mut self, sink: impl MessageSink + 'static) {
        self.sink = Some(Box::new(sink));
        debug!("protocol bridge sink registered");
    }

    /// Drop the sink, releasing a sounding breath note through it first.
    pub fn clear_sink(&mut self) {
        self.release_note();
        self.sink = None;
        debug!("protocol bridge sink cleared");
    }

    pub fn attach_source(&mut self, source: SharedState) {
        self.source = Some(source);
        debug!("protocol bridge state source attached");
    }

    pub fn detach_source(&mut self) {
        self.source = None;
        self.last_state = None;
        debug!("protocol bridge state source detached");
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Latest smoothed, normalized value for `source`, if it has been encoded.
    pub fn smoothed(&self, source: BioChannel) -> Option<f64> {
        self.config
            .channels
            .iter()
            .zip(&self.smoothers)
            .find(|(ch, s)| ch.source == source && s.primed)
            .map(|(_, s)| s.value)
    }

    /// Send note-off for the breath note under the current config.
    fn release_note(&mut self) {
        if !self.note_active {
            return;
        }
        if let Some(sink) = self.sink.as_mut() {
            let cfg = &self.config;
            sink.send(&ProtocolMessage::note_off(cfg.group, cfg.voice_channel, cfg.breath_note, 0));
            self.stats.messages += 1;
        }
        self.note_active = false;
    }

    /// Encode one tick. Returns the number of messages delivered.
    pub fn process(&mut self) -> usize {
        if !self.running {
            return 0;
        }
        let Some(sink) = self.sink.as_mut() else {
            return 0;
        };
        let Some(source) = self.source.as_ref() else {
            return 0;
        };

        // A writer mid-publish means the previous snapshot is still the
        // newest complete state.
        let state = match source.try_snapshot() {
            Some(s) => {
                self.last_state = Some(s);
                s
            }
            None => match self.last_state {
                Some(s) => s,
                None => {
                    self.stats.skipped += 1;
                    return 0;
                }
            },
        };

        let cfg = &self.config;
        let mut sent = 0usize;

        for (mapping, smoother) in cfg.channels.iter().zip(self.smoothers.iter_mut()) {
            if !mapping.enabled {
                continue;
            }
            let raw = normalize(mapping.source.read(&state), mapping.min, mapping.max);
            let value = smoother.step(raw, cfg.factor(mapping.rate));
            sink.send(&ProtocolMessage::control_change_normalized(
                cfg.group,
                cfg.control_channel,
                mapping.controller,
                value,
            ));
            sent += 1;
        }

        if cfg.breath_voice {
            let coherence = self.coherence.step(normalize(state.coherence, 0.0, 1.0), cfg.factor(SmoothingRate::Slow));

            if state.inhaling && !self.note_active {
                sink.send(&ProtocolMessage::note_on(
                    cfg.group,
                    cfg.voice_channel,
                    cfg.breath_note,
                    quantize_u16(state.breathing_depth),
                ));
                self.note_active = true;
                sent += 1;
            } else if !state.inhaling && self.note_active {
                sink.send(&ProtocolMessage::note_off(cfg.group, cfg.voice_channel, cfg.breath_note, 0));
                self.note_active = false;
                sent += 1;
            }

            if self.note_active {
                sink.send(&ProtocolMessage::poly_pressure(
                    cfg.group,
                    cfg.voice_channel,
                    cfg.breath_note,
                    quantize_u32(coherence),
                ));
                sent += 1;
            }
        }

        self.stats.ticks += 1;
        self.stats.messages += sent as u64;
        sent
    }
}
