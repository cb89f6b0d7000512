//! The global MIDI-controller-to-parameter mapping table, the MIDI-learn state machine, and the
//! dispatcher that turns raw CC/pitch-bend/program-change bytes into parameter writes and
//! postponed feedback events. Grounded in `effects.c`'s `ProcessMidi`, `UpdateValueFromMidi`,
//! `effects_midi_learn`, `effects_midi_map`, and `effects_midi_unmap`.

use parking_lot::Mutex;

use crate::port::{PortHints, SymbolId};
use crate::postponed::{PostponedEvent, PostponedQueue};
use crate::transport::TransportState;

pub const MAX_MIDI_CC_ASSIGN: usize = 256;

/// Pitch-bend is reported through the same dispatch path as a CC, tagged with this sentinel
/// controller number. Kept as an explicit named constant (design note (b)) rather than an
/// in-band magic literal, since real MIDI controllers only span `0..=127`.
pub const PITCHBEND_SENTINEL: u8 = 131;

/// `effect_id` value meaning "this slot is the end of the list" — iteration stops here.
pub const NULL_SENTINEL: i32 = -1;
/// `effect_id` value meaning "this slot used to be mapped but was unmapped" — skip, don't stop.
pub const UNUSED_SENTINEL: i32 = -2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CcSlot {
    pub effect_id: i32,
    pub channel: u8,
    pub controller: u8,
    pub min: f32,
    pub max: f32,
    pub symbol: SymbolId,
    /// Index into the owning instance's control-port vector.
    pub port_index: usize,
}

impl Default for CcSlot {
    fn default() -> Self {
        Self {
            effect_id: NULL_SENTINEL,
            channel: 0,
            controller: 0,
            min: 0.0,
            max: 1.0,
            symbol: 0,
            port_index: 0,
        }
    }
}

/// The global, fixed-size CC slot array plus the MIDI-learn pointer. Owned by [`crate::host::Host`].
pub struct MidiMappings {
    slots: Mutex<Vec<CcSlot>>,
    /// Index into `slots` currently armed for learn, or `None`. Kept as a separate field, not
    /// folded into `slots`'s lock, so a learn check from the RT MIDI dispatcher never contends
    /// with a concurrent `midi_map`/`midi_unmap` call any longer than necessary.
    learn: Mutex<Option<usize>>,
}

impl MidiMappings {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(vec![CcSlot::default(); MAX_MIDI_CC_ASSIGN]),
            learn: Mutex::new(None),
        }
    }

    /// Finds a free slot (tombstoned or past the end-of-list sentinel) and installs `slot`,
    /// returning its index, or `None` if the table is full.
    fn take_free_slot(slots: &mut [CcSlot], slot: CcSlot) -> Option<usize> {
        for (i, existing) in slots.iter_mut().enumerate() {
            if existing.effect_id == NULL_SENTINEL || existing.effect_id == UNUSED_SENTINEL {
                *existing = slot;
                return Some(i);
            }
        }
        None
    }

    /// `midi_map`: installs or updates a mapping for `(instance, symbol)`.
    pub fn map(&self, slot: CcSlot) -> Result<usize, crate::error::HostError> {
        let mut slots = self.slots.lock();
        if let Some(existing) = slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.effect_id == slot.effect_id && s.symbol == slot.symbol)
        {
            *existing.1 = slot;
            return Ok(existing.0);
        }
        Self::take_free_slot(&mut slots, slot).ok_or(crate::error::HostError::AssignmentListFull)
    }

    /// `midi_unmap`: tombstones (never compacts — design note (c)) the slot matching
    /// `(instance, symbol)`.
    pub fn unmap(&self, instance: i32, symbol: SymbolId) -> Result<(), crate::error::HostError> {
        let mut slots = self.slots.lock();
        let found = slots
            .iter_mut()
            .find(|s| s.effect_id == instance && s.symbol == symbol);
        match found {
            Some(s) => {
                s.effect_id = UNUSED_SENTINEL;
                Ok(())
            }
            None => Err(crate::error::HostError::AssignmentInvalidOp),
        }
    }

    /// `midi_learn`: arms learn mode for `(instance, symbol)`. If already mapped, clears the
    /// channel/controller first (a "re-learn") so a stale binding isn't matched while waiting.
    pub fn learn(
        &self,
        instance: i32,
        symbol: SymbolId,
        port_index: usize,
        min: f32,
        max: f32,
    ) -> Result<(), crate::error::HostError> {
        let mut slots = self.slots.lock();
        let idx = if let Some((i, existing)) = slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.effect_id == instance && s.symbol == symbol)
        {
            existing.channel = 0;
            existing.controller = 0;
            existing.min = min;
            existing.max = max;
            existing.port_index = port_index;
            i
        } else {
            let slot = CcSlot {
                effect_id: instance,
                channel: 0,
                controller: 0,
                min,
                max,
                symbol,
                port_index,
            };
            Self::take_free_slot(&mut slots, slot).ok_or(crate::error::HostError::AssignmentListFull)?
        };
        drop(slots);
        *self.learn.lock() = Some(idx);
        Ok(())
    }

    /// Clears any CC slots owned by `instance` (tombstone, not shift) and clears the learn
    /// pointer if it points to this instance. Used by `remove(instance)`.
    pub fn clear_instance(&self, instance: i32) {
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            if slot.effect_id == instance {
                slot.effect_id = UNUSED_SENTINEL;
            }
        }
        drop(slots);

        let mut learn = self.learn.lock();
        if let Some(idx) = *learn {
            let slots = self.slots.lock();
            if slots[idx].effect_id != instance {
                return;
            }
        }
        *learn = None;
    }

    /// Clears every slot and the learn pointer. Used by `remove(ALL)`.
    pub fn clear_all(&self) {
        let mut slots = self.slots.lock();
        slots.iter_mut().for_each(|s| *s = CcSlot::default());
        *self.learn.lock() = None;
    }

    /// A point-in-time copy of the slot table, used by the protocol layer's `cc_map` listing and
    /// by tests; never used from the RT dispatcher itself (which locks the live table directly).
    pub fn slots_snapshot(&self) -> Vec<CcSlot> {
        self.slots.lock().clone()
    }

    fn find_match(slots: &[CcSlot], channel: u8, controller: u8) -> Option<usize> {
        for (i, slot) in slots.iter().enumerate() {
            if slot.effect_id == NULL_SENTINEL {
                return None;
            }
            if slot.effect_id == UNUSED_SENTINEL {
                continue;
            }
            if slot.channel == channel && slot.controller == controller {
                return Some(i);
            }
        }
        None
    }
}

impl Default for MidiMappings {
    fn default() -> Self {
        Self::new()
    }
}

/// `D`/`M` pair selected by whether the event was a high-resolution pitch-bend or a 7-bit CC.
fn resolution(highres: bool) -> (i32, i32) {
    if highres {
        (8192, 16383)
    } else {
        (64, 127)
    }
}

/// Outcome of `update_from_midi`, carrying side effects the caller (the dispatcher) must apply to
/// shared state (transport, bypass) outside of the port write itself.
pub struct UpdateOutcome {
    pub value: f32,
    pub bypass_changed: Option<bool>,
    pub transport_toggled: Option<bool>,
    /// `Some(new_bpb)` when this CC is mapped to the global instance's `:bpb` port, so the caller
    /// can push the computed value into `TransportState::set_bpb` alongside the port write.
    pub bpb_changed: Option<f64>,
    /// `Some(new_bpm)`, mirroring `bpb_changed` for the global instance's `:bpm` port.
    pub bpm_changed: Option<f64>,
}

/// Computes the value a CC/pitch-bend event maps to, and reports any transport/bypass side
/// effects. Does not write the value into the port buffer — the caller does that, since the
/// buffer lives on the instance, not on the slot.
#[allow(clippy::too_many_arguments)]
pub fn update_from_midi(
    slot: &CcSlot,
    port_hints: PortHints,
    is_bypass_symbol: bool,
    has_designated_enabled: bool,
    is_rolling_symbol: bool,
    is_bpb_symbol: bool,
    is_bpm_symbol: bool,
    raw_value: i32,
    highres: bool,
) -> UpdateOutcome {
    let (d, m) = resolution(highres);

    if is_bypass_symbol {
        let bypassed = raw_value < d;
        return UpdateOutcome {
            value: if bypassed { 1.0 } else { 0.0 },
            bypass_changed: Some(bypassed),
            transport_toggled: None,
            bpb_changed: None,
            bpm_changed: None,
        };
    }
    let _ = has_designated_enabled; // the enabled-port write itself happens at the call site

    if port_hints.contains(PortHints::TRIGGER) {
        return UpdateOutcome {
            value: slot.max,
            bypass_changed: None,
            transport_toggled: None,
            bpb_changed: None,
            bpm_changed: None,
        };
    }

    if port_hints.contains(PortHints::TOGGLE) {
        let on = raw_value >= d;
        let value = if on { slot.max } else { slot.min };
        let transport_toggled = if is_rolling_symbol { Some(on) } else { None };
        return UpdateOutcome {
            value,
            bypass_changed: None,
            transport_toggled,
            bpb_changed: None,
            bpm_changed: None,
        };
    }

    let u = (raw_value as f32 / m as f32).clamp(0.0, 1.0);
    let mut value = if u <= 0.0 {
        slot.min
    } else if u >= 1.0 {
        slot.max
    } else if port_hints.contains(PortHints::LOGARITHMIC) {
        let min = if slot.min <= 0.0 { f32::EPSILON } else { slot.min };
        min * (slot.max / min).powf(u)
    } else {
        slot.min + (slot.max - slot.min) * u
    };
    if port_hints.contains(PortHints::INTEGER) {
        value = value.round();
    }

    UpdateOutcome {
        value,
        bypass_changed: None,
        transport_toggled: None,
        bpb_changed: if is_bpb_symbol { Some(value as f64) } else { None },
        bpm_changed: if is_bpm_symbol { Some(value as f64) } else { None },
    }
}

/// Parsed form of one incoming MIDI event, produced by the audio-server adapter from raw bytes.
#[derive(Debug, Clone, Copy)]
pub enum MidiInputEvent {
    ProgramChange { channel: u8, program: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    PitchBend { channel: u8, value: u16 },
}

/// The global MIDI dispatcher. Called once per incoming event from the RT MIDI input
/// callback. `program_listen_channel` is `None` for "listen on any channel".
#[allow(clippy::too_many_arguments)]
pub fn dispatch(
    mappings: &MidiMappings,
    postponed: &PostponedQueue,
    transport: &TransportState,
    program_listen_channel: Option<u8>,
    event: MidiInputEvent,
    mut on_param_set: impl FnMut(i32, usize, i32, bool, f32, f32),
    mut on_learned: impl FnMut(i32, SymbolId, usize, u8, u8, i32, bool, f32, f32),
) -> bool {
    match event {
        MidiInputEvent::ProgramChange { channel, program } => {
            if program_listen_channel.is_none() || program_listen_channel == Some(channel) {
                postponed.push(PostponedEvent::ProgramListen {
                    channel,
                    value: program,
                });
                return true;
            }
            false
        }
        MidiInputEvent::ControlChange {
            channel,
            controller,
            value,
        } => dispatch_cc(
            mappings,
            postponed,
            transport,
            channel,
            controller,
            value as i32,
            false,
            &mut on_param_set,
            &mut on_learned,
        ),
        MidiInputEvent::PitchBend { channel, value } => dispatch_cc(
            mappings,
            postponed,
            transport,
            channel,
            PITCHBEND_SENTINEL,
            value as i32,
            true,
            &mut on_param_set,
            &mut on_learned,
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch_cc(
    mappings: &MidiMappings,
    postponed: &PostponedQueue,
    transport: &TransportState,
    channel: u8,
    controller: u8,
    raw_value: i32,
    highres: bool,
    on_param_set: &mut impl FnMut(i32, usize, i32, bool, f32, f32),
    on_learned: &mut impl FnMut(i32, SymbolId, usize, u8, u8, i32, bool, f32, f32),
) -> bool {
    let slots = mappings.slots.lock();
    if let Some(idx) = MidiMappings::find_match(&slots, channel, controller) {
        let slot = slots[idx];
        drop(slots);

        // Port hints aren't known to this module; callers that need trigger/toggle/logarithmic
        // semantics call `update_from_midi` directly with the instance's port metadata. The
        // dispatcher's job here is purely the slot lookup and event bookkeeping, so we report the
        // match back to the caller instead of inlining `update_from_midi` (kept in
        // `instance_table`/`host` where port hints are available). `on_param_set` receives the
        // raw value/resolution (so the caller picks the right `D`/`M` pair) plus the mapping's
        // own `min`/`max` (which may be a subrange of the port's full range).
        on_param_set(slot.effect_id, slot.port_index, raw_value, highres, slot.min, slot.max);
        let _ = transport;
        return true;
    }
    drop(slots);

    let mut learn = mappings.learn.lock();
    if let Some(idx) = *learn {
        let mut slots = mappings.slots.lock();
        let slot = &mut slots[idx];
        slot.channel = channel;
        slot.controller = controller;
        let bound = *slot;
        drop(slots);
        *learn = None;
        drop(learn);

        // The bound value for the line that announces this mapping is computed by the caller
        // via `update_from_midi` (it alone knows the port's hints), then posted from there —
        // `postponed` is threaded through for the `ProgramListen` branch above, not used here.
        let _ = postponed;
        on_learned(
            bound.effect_id,
            bound.symbol,
            bound.port_index,
            channel,
            controller,
            raw_value,
            highres,
            bound.min,
            bound.max,
        );
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_from_midi_linear_mapping() {
        let slot = CcSlot {
            min: 0.0,
            max: 10.0,
            ..Default::default()
        };
        let out = update_from_midi(&slot, PortHints::empty(), false, false, false, false, false, 127, false);
        assert!((out.value - 10.0).abs() < 1e-4);

        let out = update_from_midi(&slot, PortHints::empty(), false, false, false, false, false, 0, false);
        assert_eq!(out.value, 0.0);
    }

    #[test]
    fn update_from_midi_toggle_at_divide_line() {
        let slot = CcSlot {
            min: 0.0,
            max: 1.0,
            ..Default::default()
        };
        let just_below = update_from_midi(&slot, PortHints::TOGGLE, false, false, false, false, false, 63, false);
        assert_eq!(just_below.value, 0.0);
        let at_line = update_from_midi(&slot, PortHints::TOGGLE, false, false, false, false, false, 64, false);
        assert_eq!(at_line.value, 1.0);
    }

    #[test]
    fn update_from_midi_bypass_symbol() {
        let slot = CcSlot::default();
        let out = update_from_midi(&slot, PortHints::empty(), true, true, false, false, false, 127, false);
        assert_eq!(out.bypass_changed, Some(false));
        let out = update_from_midi(&slot, PortHints::empty(), true, true, false, false, false, 0, false);
        assert_eq!(out.bypass_changed, Some(true));
    }

    #[test]
    fn update_from_midi_bpb_symbol_reports_transport_scalar() {
        let slot = CcSlot {
            min: 1.0,
            max: 32.0,
            ..Default::default()
        };
        let out = update_from_midi(&slot, PortHints::empty(), false, false, false, true, false, 127, false);
        assert_eq!(out.bpb_changed, Some(32.0));
        assert_eq!(out.bpm_changed, None);
    }

    #[test]
    fn map_then_unmap_tombstones_without_compacting() {
        let mappings = MidiMappings::new();
        let idx = mappings
            .map(CcSlot {
                effect_id: 2,
                channel: 3,
                controller: 7,
                symbol: 9,
                min: 0.0,
                max: 1.0,
                port_index: 0,
            })
            .unwrap();
        mappings.unmap(2, 9).unwrap();
        assert_eq!(mappings.slots.lock()[idx].effect_id, UNUSED_SENTINEL);
    }

    #[test]
    fn learn_arms_and_binds_on_next_cc() {
        let mappings = MidiMappings::new();
        mappings.learn(2, 9, 0, 0.0, 1.0).unwrap();
        let postponed = PostponedQueue::new();
        let transport = TransportState::new();

        let mut learned = None;
        let dispatched = dispatch(
            &mappings,
            &postponed,
            &transport,
            None,
            MidiInputEvent::ControlChange {
                channel: 3,
                controller: 7,
                value: 64,
            },
            |_, _, _, _, _, _| {},
            |inst, sym, _port_index, ch, cc, raw, highres, min, max| {
                learned = Some((inst, sym, ch, cc, raw, highres, min, max))
            },
        );
        assert!(dispatched);
        assert_eq!(learned, Some((2, 9, 3, 7, 64, false, 0.0, 1.0)));
    }
}
