//! A single plugin instance: its ports, its worker (if the plugin declares one), its bypass and
//! preset bookkeeping, and the designated-port indices the process callback needs on every cycle.
//! Grounded in `effects.c`'s `InstanceContainer` struct.

use std::collections::HashMap;
use std::sync::Arc;

use crate::monitor::Monitor;
use crate::port::{AudioPort, ControlPort, DesignatedPorts, EventPort, SymbolId};
use crate::ring::{event_ring, EventRingConsumer, EventRingProducer};
use crate::worker::{PluginWorker, Worker};

/// Loader-independent handle to an instantiated plugin. `discovery.rs`'s `livi`-backed adapter is
/// the only place that knows how to produce one; everything downstream of instantiation (process,
/// MIDI dispatch, control surface) only depends on this trait, per the capability-set design note.
pub trait PluginHandle: Send + Sync {
    /// Runs the plugin's `run()` for `nframes` samples. Audio/control/event port buffers have
    /// already been wired up by the process callback before this is called.
    fn run(&mut self, nframes: u32);

    /// `true` if this plugin declared an LV2 Worker interface.
    fn has_worker(&self) -> bool {
        false
    }
}

pub struct Instance {
    pub uri: String,
    pub plugin: Box<dyn PluginHandle>,
    pub audio_in: Vec<AudioPort>,
    pub audio_out: Vec<AudioPort>,
    /// CV ports, kept in their own vectors (not merged into `audio_in`/`audio_out`) so the process
    /// callback's bypass paths can zero them independently of audio per the port-type model's
    /// audio/control/cv/event distinction, even though the buffer shape is identical to audio.
    pub cv_in: Vec<AudioPort>,
    pub cv_out: Vec<AudioPort>,
    pub control_in: Vec<ControlPort>,
    pub control_out: Vec<ControlPort>,
    pub event_in: Vec<EventPort>,
    pub event_out: Vec<EventPort>,
    pub designated: DesignatedPorts,
    pub symbol_to_control_in: Vec<(SymbolId, usize)>,
    pub symbol_to_control_out: Vec<(SymbolId, usize)>,
    /// `(rolling, frame, bpb, bpm)` observed by this instance's last process cycle, compared
    /// against the current snapshot each cycle to decide whether a `time:Position` atom is due.
    /// `None` before the first cycle, which always counts as "changed".
    pub last_transport: Option<(bool, u64, f64, f64)>,
    pub bypassed: bool,
    pub worker: Option<Worker>,
    pub active_preset: Option<String>,
    /// watch list, populated by `monitor_parameter` and evaluated once per RT cycle.
    pub monitors: Vec<Monitor>,
    /// Preset URIs known at instantiation; `preset_load` replays the stored values
    /// listed here through the same write path as `set_parameter`.
    pub presets: Vec<String>,
    /// Control-input port values captured by `preset_save`, keyed by preset URI. `preset_load`
    /// replays these through the same write path as `set_parameter`.
    pub preset_values: HashMap<String, Vec<(SymbolId, f32)>>,
    /// Writable properties known at instantiation, `(label, property URID)`, addressed by label
    /// from `set_property`.
    pub properties: Vec<(String, u32)>,
    /// The control-thread → RT event ring for this instance's control-input port, present only
    /// when the plugin declared one. `set_property` writes a `patch:Set` atom record here;
    /// `process.rs` Phase C drains it into the control-input event buffer each cycle.
    pub control_ring: Option<EventRingProducer>,
    pub control_ring_consumer: Option<EventRingConsumer>,
}

impl Instance {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        uri: String,
        plugin: Box<dyn PluginHandle>,
        audio_in: Vec<AudioPort>,
        audio_out: Vec<AudioPort>,
        cv_in: Vec<AudioPort>,
        cv_out: Vec<AudioPort>,
        control_in: Vec<ControlPort>,
        control_out: Vec<ControlPort>,
        event_in: Vec<EventPort>,
        event_out: Vec<EventPort>,
        designated: DesignatedPorts,
    ) -> Self {
        let symbol_to_control_in = control_in.iter().enumerate().map(|(i, p)| (p.symbol, i)).collect();
        let symbol_to_control_out = control_out.iter().enumerate().map(|(i, p)| (p.symbol, i)).collect();
        // Only the first event-input port is treated as the control-input port the ring buffer
        // feeds; a plugin with no event input ports gets no ring at all rather than an unused
        // allocation.
        let (control_ring, control_ring_consumer) = match event_in.first() {
            Some(port) => {
                let capacity = port.buffer.capacity().max(4096);
                let (producer, consumer) = event_ring(capacity, capacity);
                (Some(producer), Some(consumer))
            }
            None => (None, None),
        };
        Self {
            uri,
            plugin,
            audio_in,
            audio_out,
            cv_in,
            cv_out,
            control_in,
            control_out,
            event_in,
            event_out,
            designated,
            symbol_to_control_in,
            symbol_to_control_out,
            last_transport: None,
            bypassed: false,
            worker: None,
            active_preset: None,
            monitors: Vec::new(),
            presets: Vec::new(),
            preset_values: HashMap::new(),
            properties: Vec::new(),
            control_ring,
            control_ring_consumer,
        }
    }

    /// Attaches a worker thread for this instance, used when the plugin declares the LV2 Worker
    /// extension. Called by `discovery.rs` once instantiation succeeds.
    pub fn attach_worker(&mut self, instance_id: i32, iface: Arc<dyn PluginWorker>, ring_capacity: usize) {
        self.worker = Some(Worker::spawn(instance_id, iface, ring_capacity));
    }

    pub fn control_in_index(&self, symbol: SymbolId) -> Option<usize> {
        self.symbol_to_control_in
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, idx)| *idx)
    }

    pub fn control_out_index(&self, symbol: SymbolId) -> Option<usize> {
        self.symbol_to_control_out
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, idx)| *idx)
    }

    /// Writes a control-input port's value, recording `prev` for the change-detection step that
    /// feeds the feedback queue.
    pub fn set_control_in(&mut self, port_index: usize, value: f32) {
        if let Some(port) = self.control_in.get_mut(port_index) {
            port.set(value);
        }
    }

    pub fn reset_all_to_default(&mut self) {
        for port in &mut self.control_in {
            port.reset_to_default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{PortFlow, PortHints};

    struct NoopPlugin;
    impl PluginHandle for NoopPlugin {
        fn run(&mut self, _nframes: u32) {}
    }

    fn make_instance() -> Instance {
        let control_in = vec![ControlPort::new(0, 42, PortFlow::Input, PortHints::empty(), 0.0, 1.0, 0.5)];
        Instance::new(
            "urn:test".into(),
            Box::new(NoopPlugin),
            vec![],
            vec![],
            vec![],
            vec![],
            control_in,
            vec![],
            vec![],
            vec![],
            DesignatedPorts::default(),
        )
    }

    #[test]
    fn control_in_index_resolves_by_symbol() {
        let instance = make_instance();
        assert_eq!(instance.control_in_index(42), Some(0));
        assert_eq!(instance.control_in_index(99), None);
    }

    #[test]
    fn set_control_in_clamps_and_tracks_prev() {
        let mut instance = make_instance();
        instance.set_control_in(0, 2.0);
        assert_eq!(instance.control_in[0].current, 1.0);
        assert_eq!(instance.control_in[0].prev, 0.5);
    }
}
