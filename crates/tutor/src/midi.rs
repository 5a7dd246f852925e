use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use nimbus_domain::RawInput;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::queue::InputSender;

const CONTROL_CHANGE: u8 = 0xB0;
const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;
/// System real-time "continue"; the pad sends it to ask for melody mode.
const CONTINUE: u8 = 0xFB;
const CRUSH_CC: u8 = 81;
const MELODY_CCS: [u8; 3] = [49, 51, 63];
const MELODY_CC_VALUE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadMessage {
    Strike,
    Note(u8),
    MelodyCue,
}

/// Maps a raw MIDI message from the pad controller onto a game message.
pub fn decode(message: &[u8]) -> Option<PadMessage> {
    let status = *message.first()?;
    if status == CONTINUE {
        return Some(PadMessage::MelodyCue);
    }
    let (data1, data2) = (*message.get(1)?, *message.get(2)?);
    match status & 0xF0 {
        CONTROL_CHANGE if data1 == CRUSH_CC && data2 >= 64 => Some(PadMessage::Strike),
        CONTROL_CHANGE if MELODY_CCS.contains(&data1) && data2 == MELODY_CC_VALUE => {
            Some(PadMessage::Note(data1))
        }
        NOTE_ON if data2 > 0 && MELODY_CCS.contains(&data1) => Some(PadMessage::Note(data1)),
        NOTE_ON if data2 > 0 => Some(PadMessage::Strike),
        _ => None,
    }
}

impl PadMessage {
    pub fn into_input(self) -> Option<RawInput> {
        match self {
            PadMessage::Strike => Some(RawInput::strike()),
            PadMessage::Note(note) => Some(RawInput::note(note)),
            PadMessage::MelodyCue => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MidiDevice {
    pub name: String,
}

pub struct MidiManager;

impl MidiManager {
    pub fn list_inputs() -> Result<Vec<MidiDevice>> {
        let input = MidiInput::new("nimbus")?;
        Ok(input
            .ports()
            .iter()
            .map(|port| MidiDevice {
                name: input.port_name(port).unwrap_or_else(|_| "Unknown".into()),
            })
            .collect())
    }

    pub fn list_outputs() -> Result<Vec<MidiDevice>> {
        let output = MidiOutput::new("nimbus")?;
        Ok(output
            .ports()
            .iter()
            .map(|port| MidiDevice {
                name: output.port_name(port).unwrap_or_else(|_| "Unknown".into()),
            })
            .collect())
    }

    /// Connects the first input port whose name contains `hint`.
    ///
    /// Strikes and notes go to `sender`; a melody cue raises `melody_cue`.
    pub fn connect_input(
        hint: &str,
        sender: InputSender,
        melody_cue: Arc<AtomicBool>,
    ) -> Result<MidiInputConnection<InputSender>> {
        let mut input = MidiInput::new("nimbus-in")?;
        input.ignore(Ignore::None);
        let port = input
            .ports()
            .into_iter()
            .find(|port| {
                input
                    .port_name(port)
                    .map(|name| name.contains(hint))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("no midi input matching {hint:?}"))?;
        info!(port = %input.port_name(&port).unwrap_or_default(), "connecting midi input");
        input
            .connect(
                &port,
                "nimbus-pads",
                move |_stamp, message, sender| match decode(message) {
                    Some(PadMessage::MelodyCue) => melody_cue.store(true, Ordering::Release),
                    Some(pad) => {
                        if let Some(raw) = pad.into_input() {
                            sender.send(raw);
                        }
                    }
                    None => {}
                },
                sender,
            )
            .map_err(|err| anyhow!("midi connect error: {err:?}"))
    }
}

/// Note-on/off output used for playback and strike feedback.
pub struct MidiNoteOut {
    connection: MidiOutputConnection,
    channel: u8,
    velocity: u8,
}

impl MidiNoteOut {
    pub fn connect(hint: &str, channel: u8, velocity: u8) -> Result<Self> {
        let output = MidiOutput::new("nimbus-out")?;
        let port = output
            .ports()
            .into_iter()
            .find(|port| {
                output
                    .port_name(port)
                    .map(|name| name.contains(hint))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("no midi output matching {hint:?}"))?;
        let connection = output
            .connect(&port, "nimbus-notes")
            .map_err(|err| anyhow!("midi connect error: {err:?}"))?;
        Ok(Self {
            connection,
            channel: channel & 0x0F,
            velocity: velocity.min(127),
        })
    }

    pub fn note_on(&mut self, note: u8) -> Result<()> {
        debug!(note, "note on");
        self.connection
            .send(&[NOTE_ON | self.channel, note & 0x7F, self.velocity])?;
        Ok(())
    }

    pub fn note_off(&mut self, note: u8) -> Result<()> {
        self.connection
            .send(&[NOTE_OFF | self.channel, note & 0x7F, 0])?;
        Ok(())
    }
}
