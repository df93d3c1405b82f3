//! Universal MIDI Packet encoding for MIDI 2.0 channel-voice messages.
//!
//! A channel-voice packet is two 32-bit words:
//!
//! ```text
//! word 0: [class:4][group:4][status:4][channel:4][index:8][extra:8]
//! word 1: [payload:32]
//! ```
//!
//! `index` is the controller or note number; `extra` is the note attribute
//! type (or zero for controllers). Encoding never fails: fields are masked
//! to their width and normalized values are clamped before quantization.

use serde::{Deserialize, Serialize};

use crate::sensors::clamp01;

/// UMP message type nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageClass {
    Utility = 0x0,
    SystemRealTime = 0x1,
    Midi1ChannelVoice = 0x2,
    Data64 = 0x3,
    Midi2ChannelVoice = 0x4,
    Data128 = 0x5,
    FlexData = 0xD,
    Stream = 0xF,
}

impl MessageClass {
    pub fn from_nibble(n: u8) -> Option<Self> {
        Some(match n & 0xF {
            0x0 => MessageClass::Utility,
            0x1 => MessageClass::SystemRealTime,
            0x2 => MessageClass::Midi1ChannelVoice,
            0x3 => MessageClass::Data64,
            0x4 => MessageClass::Midi2ChannelVoice,
            0x5 => MessageClass::Data128,
            0xD => MessageClass::FlexData,
            0xF => MessageClass::Stream,
            _ => return None,
        })
    }
}

/// MIDI 2.0 channel-voice opcode (upper nibble of the status byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Status {
    RegisteredPerNoteController = 0x0,
    AssignablePerNoteController = 0x1,
    RegisteredController = 0x2,
    AssignableController = 0x3,
    RelativeRegisteredController = 0x4,
    RelativeAssignableController = 0x5,
    PerNotePitchBend = 0x6,
    NoteOff = 0x8,
    NoteOn = 0x9,
    PolyPressure = 0xA,
    ControlChange = 0xB,
    ProgramChange = 0xC,
    ChannelPressure = 0xD,
    PitchBend = 0xE,
    PerNoteManagement = 0xF,
}

impl Status {
    pub fn from_nibble(n: u8) -> Option<Self> {
        Some(match n & 0xF {
            0x0 => Status::RegisteredPerNoteController,
            0x1 => Status::AssignablePerNoteController,
            0x2 => Status::RegisteredController,
            0x3 => Status::AssignableController,
            0x4 => Status::RelativeRegisteredController,
            0x5 => Status::RelativeAssignableController,
            0x6 => Status::PerNotePitchBend,
            0x8 => Status::NoteOff,
            0x9 => Status::NoteOn,
            0xA => Status::PolyPressure,
            0xB => Status::ControlChange,
            0xC => Status::ProgramChange,
            0xD => Status::ChannelPressure,
            0xE => Status::PitchBend,
            0xF => Status::PerNoteManagement,
            _ => return None,
        })
    }

    /// True for messages addressed to a single note rather than the channel.
    pub fn is_per_note(self) -> bool {
        matches!(
            self,
            Status::RegisteredPerNoteController
                | Status::AssignablePerNoteController
                | Status::PerNotePitchBend
                | Status::NoteOff
                | Status::NoteOn
                | Status::PolyPressure
                | Status::PerNoteManagement
        )
    }
}

/// Controller numbers.
pub mod controllers {
    /// Bio-reactive assignments in the undefined 102–119 range.
    pub mod bio {
        pub const HEART_RATE: u8 = 102;
        pub const HRV_COHERENCE: u8 = 103;
        pub const BREATHING_RATE: u8 = 104;
        pub const BREATHING_PHASE: u8 = 105;
        pub const GSR: u8 = 106;
        pub const EEG_ALPHA: u8 = 109;
        pub const EEG_BETA: u8 = 110;
        pub const EEG_THETA: u8 = 111;
        pub const FOCUS: u8 = 112;
    }
}

// ── Quantization ────────────────────────────────────────────

/// Clamp to [0, 1] and scale to the full 32-bit range.
#[inline]
pub fn quantize_u32(normalized: f64) -> u32 {
    (clamp01(normalized) * u32::MAX as f64).round() as u32
}

#[inline]
pub fn dequantize_u32(word: u32) -> f64 {
    word as f64 / u32::MAX as f64
}

/// Clamp to [0, 1] and scale to 16 bits (note velocity).
#[inline]
pub fn quantize_u16(normalized: f64) -> u16 {
    (clamp01(normalized) * u16::MAX as f64).round() as u16
}

// ── Packet ──────────────────────────────────────────────────

/// One outbound packet. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    class: MessageClass,
    group: u8,
    status: Status,
    channel: u8,
    index: u8,
    extra: u8,
    payload: u32,
}

impl ProtocolMessage {
    fn channel_voice(group: u8, status: Status, channel: u8, index: u8, extra: u8, payload: u32) -> Self {
        ProtocolMessage {
            class: MessageClass::Midi2ChannelVoice,
            group: group & 0xF,
            status,
            channel: channel & 0xF,
            index,
            extra,
            payload,
        }
    }

    pub fn control_change(group: u8, channel: u8, controller: u8, value: u32) -> Self {
        Self::channel_voice(group, Status::ControlChange, channel, controller & 0x7F, 0, value)
    }

    /// Control change from a normalized value.
    pub fn control_change_normalized(group: u8, channel: u8, controller: u8, value: f64) -> Self {
        Self::control_change(group, channel, controller, quantize_u32(value))
    }

    pub fn note_on(group: u8, channel: u8, note: u8, velocity: u16) -> Self {
        Self::note_on_with_attribute(group, channel, note, velocity, 0, 0)
    }

    pub fn note_on_with_attribute(
        group: u8,
        channel: u8,
        note: u8,
        velocity: u16,
        attribute_type: u8,
        attribute_data: u16,
    ) -> Self {
        let payload = ((velocity as u32) << 16) | attribute_data as u32;
        Self::channel_voice(group, Status::NoteOn, channel, note & 0x7F, attribute_type, payload)
    }

    pub fn note_off(group: u8, channel: u8, note: u8, velocity: u16) -> Self {
        let payload = (velocity as u32) << 16;
        Self::channel_voice(group, Status::NoteOff, channel, note & 0x7F, 0, payload)
    }

    pub fn poly_pressure(group: u8, channel: u8, note: u8, value: u32) -> Self {
        Self::channel_voice(group, Status::PolyPressure, channel, note & 0x7F, 0, value)
    }

    pub fn per_note_pitch_bend(group: u8, channel: u8, note: u8, value: u32) -> Self {
        Self::channel_voice(group, Status::PerNotePitchBend, channel, note & 0x7F, 0, value)
    }

    pub fn channel_pressure(group: u8, channel: u8, value: u32) -> Self {
        Self::channel_voice(group, Status::ChannelPressure, channel, 0, 0, value)
    }

    pub fn pitch_bend(group: u8, channel: u8, value: u32) -> Self {
        Self::channel_voice(group, Status::PitchBend, channel, 0, 0, value)
    }

    pub fn class(&self) -> MessageClass {
        self.class
    }

    pub fn group(&self) -> u8 {
        self.group
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Controller or note number.
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Note attribute type; zero for controllers.
    pub fn extra(&self) -> u8 {
        self.extra
    }

    pub fn payload(&self) -> u32 {
        self.payload
    }

    /// 16-bit velocity of a note message.
    pub fn velocity(&self) -> u16 {
        (self.payload >> 16) as u16
    }

    /// Payload as a normalized value in [0, 1].
    pub fn normalized(&self) -> f64 {
        dequantize_u32(self.payload)
    }

    /// The two wire words.
    pub fn words(&self) -> [u32; 2] {
        let word0 = ((self.class as u32) << 28)
            | ((self.group as u32 & 0xF) << 24)
            | ((self.status as u32) << 20)
            | ((self.channel as u32 & 0xF) << 16)
            | ((self.index as u32) << 8)
            | self.extra as u32;
        [word0, self.payload]
    }

    /// Decode a MIDI 2.0 channel-voice packet. Returns `None` for any other
    /// message class or an unassigned opcode.
    pub fn from_words(words: [u32; 2]) -> Option<Self> {
        let w0 = words[0];
        let class = MessageClass::from_nibble((w0 >> 28) as u8)?;
        if class != MessageClass::Midi2ChannelVoice {
            return None;
        }
        Some(ProtocolMessage {
            class,
            group: ((w0 >> 24) & 0xF) as u8,
            status: Status::from_nibble(((w0 >> 20) & 0xF) as u8)?,
            channel: ((w0 >> 16) & 0xF) as u8,
            index: ((w0 >> 8) & 0xFF) as u8,
            extra: (w0 & 0xFF) as u8,
            payload: words[1],
        })
    }

    /// Down-convert to MIDI 1.0 bytes for legacy sinks. Values lose
    /// resolution (32 → 7 or 14 bits). Returns `None` for messages with no
    /// MIDI 1.0 equivalent.
    pub fn to_midi1_bytes(&self) -> Option<Vec<u8>> {
        let status = |s: u8| (s << 4) | self.channel;
        let seven = (self.payload >> 25) as u8;
        let bytes = match self.status {
            Status::ControlChange => vec![status(0xB), self.index & 0x7F, seven],
            Status::PolyPressure => vec![status(0xA), self.index & 0x7F, seven],
            Status::ChannelPressure => vec![status(0xD), seven],
            Status::NoteOn => {
                // velocity 0 would read as note-off in MIDI 1.0
                let v = ((self.velocity() >> 9) as u8).max(1);
                vec![status(0x9), self.index & 0x7F, v]
            }
            Status::NoteOff => vec![status(0x8), self.index & 0x7F, (self.velocity() >> 9) as u8],
            Status::PitchBend => {
                let fourteen = self.payload >> 18;
                vec![status(0xE), (fourteen & 0x7F) as u8, ((fourteen >> 7) & 0x7F) as u8]
            }
            _ => return None,
        };
        Some(bytes)
    }
}
