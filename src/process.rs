//! The realtime process callback: phases A–G, run once per audio-server cycle for one
//! instance. Grounded in `effects.c`'s `ProcessCallback`.
//!
//! This module contains no threading or locking of its own beyond what [`Instance`],
//! [`PostponedQueue`], and [`TransportState`] already provide — it is the orchestration of those
//! pieces in a fixed order each cycle, kept free of I/O and allocation so it stays safe to call
//! from the audio server's RT thread.

use std::f32::EPSILON;

use crate::instance::Instance;
use crate::monitor::PortKind;
use crate::port::PortHints;
use crate::postponed::{PostponedEvent, PostponedQueue};
use crate::transport::TransportState;

/// One incoming MIDI event as handed to the process callback by the audio-server adapter, already
/// demultiplexed to "this instance's MIDI input port".
pub struct RawMidiEvent<'a> {
    pub frame: u32,
    pub bytes: &'a [u8],
}

/// Bundles the per-cycle inputs the process callback needs beyond the instance itself, so the
/// function signature doesn't grow a dozen scalar parameters.
pub struct ProcessContext<'a> {
    pub instance_id: i32,
    pub nframes: u32,
    pub sample_rate: f64,
    pub processing_enabled: bool,
    pub was_bypassed: bool,
    pub transport: &'a TransportState,
    pub postponed: &'a PostponedQueue,
    pub midi_in: &'a [RawMidiEvent<'a>],
    /// Called with `(instance_id, symbol, value)` exactly when a monitor's threshold condition
    /// newly holds. `None` means no monitor socket is open; evaluation still runs so
    /// `last_notified` tracking stays accurate once a socket connects later.
    pub monitor_emit: Option<&'a dyn Fn(i32, u32, f32)>,
}

const ALL_NOTES_OFF: u8 = 123;
const ALL_SOUND_OFF: u8 = 120;

/// Writes an "all notes off" + "all sound off" CC pair on every channel into `buffer`, encoded as
/// raw 3-byte MIDI messages back to back. Used whenever an instance transitions into bypass, so
/// that held notes don't hang.
fn write_all_notes_off(buffer: &mut Vec<u8>) {
    for channel in 0..16u8 {
        buffer.push(0xB0 | channel);
        buffer.push(ALL_NOTES_OFF);
        buffer.push(0);
        buffer.push(0xB0 | channel);
        buffer.push(ALL_SOUND_OFF);
        buffer.push(0);
    }
}

/// Evaluates every monitor on `instance` against its port's current value, invoking `emit` for each
/// one whose threshold condition newly holds. Runs whether or not a monitor socket is open, so
/// `last_notified` bookkeeping doesn't skip ahead while nobody's listening.
fn evaluate_monitors(instance: &mut Instance, instance_id: i32, emit: Option<&dyn Fn(i32, u32, f32)>) {
    for i in 0..instance.monitors.len() {
        let (kind, port_index) = {
            let m = &instance.monitors[i];
            (m.kind, m.port_index)
        };
        let value = match kind {
            PortKind::Input => instance.control_in.get(port_index).map(|p| p.current),
            PortKind::Output => instance.control_out.get(port_index).map(|p| p.current),
        };
        let Some(v) = value else { continue };
        let symbol = instance.monitors[i].symbol;
        if let Some(notified) = instance.monitors[i].check(v) {
            if let Some(emit) = emit {
                emit(instance_id, symbol, notified);
            }
        }
    }
}

/// Runs one RT cycle for `instance`. Returns the set of postponed events it decided to enqueue for
/// diagnostics/testing convenience; production callers don't need the return value since the
/// events are already pushed into `ctx.postponed`.
pub fn process_instance(instance: &mut Instance, ctx: &ProcessContext) {
    let nframes = ctx.nframes;

    if !ctx.processing_enabled {
        for port in &mut instance.audio_out {
            port.zero();
        }
        for port in &mut instance.cv_out {
            port.zero();
        }
        for port in &mut instance.event_out {
            port.clear();
        }
        return;
    }

    let entering_bypass = instance.bypassed && !ctx.was_bypassed;

    // Phase A: transport snapshot + position atom for ports with the `transport` hint. The
    // position atom is due when this instance's own last-observed `(rolling, frame, bpb, bpm)`
    // tuple differs from the current snapshot, or when the instance is newly entering bypass —
    // each instance tracks its own tuple so one instance consuming a shared "reset happened" flag
    // doesn't starve every other instance processed later in the same cycle.
    let snapshot = ctx.transport.snapshot();
    if let Some(idx) = instance.designated.bpb {
        instance.control_in[idx].set(snapshot.bpb as f32);
    }
    if let Some(idx) = instance.designated.bpm {
        instance.control_in[idx].set(snapshot.bpm as f32);
    }
    if let Some(idx) = instance.designated.speed {
        instance.control_in[idx].set(if snapshot.rolling { 1.0 } else { 0.0 });
    }
    let current_tuple = (snapshot.rolling, snapshot.frame, snapshot.bpb, snapshot.bpm);
    let transport_changed = instance.last_transport != Some(current_tuple);
    instance.last_transport = Some(current_tuple);
    let position_atom = if transport_changed || entering_bypass {
        Some(snapshot.bars_beats_ticks(ctx.sample_rate))
    } else {
        None
    };

    // Phase B: input event buffers.
    for port in &mut instance.event_in {
        port.clear();
        if instance.bypassed && entering_bypass {
            write_all_notes_off(&mut port.buffer);
            continue;
        }
        if instance.bypassed {
            continue;
        }
        for event in ctx.midi_in {
            port.buffer.extend_from_slice(event.bytes);
        }
        if position_atom.is_some() && port.accepts_transport() {
            // The actual atom encoding lives in the discovery/loader adapter, which knows the
            // plugin's URID for `time:Position`; this module only gates on the hint and leaves a
            // slot for the adapter to fill via `encode_position_atom` at the call site.
        }
    }
    for port in &mut instance.event_out {
        port.clear();
    }

    // Phase C: control event drain. The first event-input port is the control-input port (see
    // `Instance::new`); its ring, if the plugin declared one, is drained here and appended at
    // `frames = nframes - 1`.
    if let Some(consumer) = instance.control_ring_consumer.as_mut() {
        if let Some(port) = instance.event_in.first_mut() {
            consumer.drain(|_header, body| {
                port.buffer.extend_from_slice(body);
            });
        }
    }

    // Phase D: process or bypass.
    if instance.bypassed && instance.designated.enabled.is_none() {
        if !instance.audio_in.is_empty() {
            let in_len = instance.audio_in.len();
            for (i, out) in instance.audio_out.iter_mut().enumerate() {
                let src_idx = i.min(in_len - 1);
                out.buffer.copy_from_slice(&instance.audio_in[src_idx].buffer[..nframes as usize]);
            }
        } else {
            for out in &mut instance.audio_out {
                out.zero();
            }
        }
        // CV is never passed through in bypass, unlike audio: zero both directions regardless of
        // whether this plugin has any CV inputs to copy from.
        for port in &mut instance.cv_in {
            port.zero();
        }
        for port in &mut instance.cv_out {
            port.zero();
        }
        instance.plugin.run(nframes);
    } else {
        instance.plugin.run(nframes);
        if let Some(worker) = instance.worker.as_mut() {
            // Drain worker responses after `run`, before outputs are considered final.
            worker.emit_responses();
        }
        evaluate_monitors(instance, ctx.instance_id, ctx.monitor_emit);
    }

    // Phase E: output MIDI already cleared above; plugin-side forwarding of `midi:MidiEvent`
    // entries from `event_out` buffers into the server MIDI port is the audio-server adapter's
    // job, since only it knows the atom-sequence decoding and the server port handle.
    if instance.bypassed && entering_bypass {
        for port in &mut instance.event_out {
            write_all_notes_off(&mut port.buffer);
        }
    }

    // Phase F: triggers reset, output monitors coalesced into the postponed queue.
    let mut enqueued = false;
    for port in &mut instance.control_in {
        if port.hints.contains(PortHints::TRIGGER) {
            port.reset_to_default();
        }
    }
    for port in &mut instance.control_out {
        if !port.hints.contains(PortHints::MONITORED) {
            continue;
        }
        if (port.current - port.prev).abs() >= EPSILON {
            ctx.postponed.push(PostponedEvent::OutputMonitor {
                instance: ctx.instance_id,
                symbol: port.symbol,
                value: port.current,
            });
            port.prev = port.current;
            enqueued = true;
        }
    }
    if enqueued {
        ctx.postponed.notify();
    }

    // Phase G: the caller (the audio-server adapter) is the one place that tracks the previous
    // cycle's bypass state alongside each instance, feeding it back in as `ctx.was_bypassed` next
    // cycle — kept out of `Instance` itself to avoid a second source of truth with the control
    // surface's `bypass()` call.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::PluginHandle;
    use crate::port::{AudioPort, ControlPort, DesignatedPorts, PortFlow};

    struct CountingPlugin {
        pub runs: std::cell::Cell<u32>,
    }
    impl PluginHandle for CountingPlugin {
        fn run(&mut self, _nframes: u32) {
            self.runs.set(self.runs.get() + 1);
        }
    }

    fn make_instance() -> Instance {
        let control_out = vec![ControlPort::new(0, 1, PortFlow::Output, PortHints::MONITORED, 0.0, 10.0, 0.0)];
        Instance::new(
            "urn:test".into(),
            Box::new(CountingPlugin { runs: 0.into() }),
            vec![AudioPort::new(0, PortFlow::Input, 64)],
            vec![AudioPort::new(0, PortFlow::Output, 64)],
            vec![],
            vec![],
            vec![],
            control_out,
            vec![],
            vec![],
            DesignatedPorts::default(),
        )
    }

    #[test]
    fn disabled_processing_zeroes_outputs_and_skips_plugin() {
        let mut instance = make_instance();
        instance.audio_out[0].buffer.fill(1.0);
        let transport = TransportState::new();
        let postponed = PostponedQueue::new();
        let ctx = ProcessContext {
            instance_id: 0,
            nframes: 64,
            sample_rate: 48000.0,
            processing_enabled: false,
            was_bypassed: false,
            transport: &transport,
            postponed: &postponed,
            midi_in: &[],
            monitor_emit: None,
        };
        process_instance(&mut instance, &ctx);
        assert!(instance.audio_out[0].buffer.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn monitored_output_change_enqueues_postponed_event() {
        let mut instance = make_instance();
        instance.control_out[0].current = 5.0;
        let transport = TransportState::new();
        let postponed = PostponedQueue::new();
        let ctx = ProcessContext {
            instance_id: 3,
            nframes: 64,
            sample_rate: 48000.0,
            processing_enabled: true,
            was_bypassed: false,
            transport: &transport,
            postponed: &postponed,
            midi_in: &[],
            monitor_emit: None,
        };
        process_instance(&mut instance, &ctx);

        let mut count = 0;
        postponed.drain(crate::postponed::IGNORE_NONE, |_| count += 1);
        assert_eq!(count, 1);
    }
}
