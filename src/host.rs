//! The `Host`: the single process-wide structure that owns every piece of shared state that would
//! otherwise be a pile of globals (the instance table, the CC slot array, transport scalars, and
//! the postponed-event queue), plus the control-surface entry points that operate on them. One
//! `Host` is built at startup and handed to every thread by `Arc`.
//!
//! Grounded in `effects.c`, which is the original's single translation unit for almost everything
//! here; this module is the Rust counterpart with the process-wide statics turned into fields.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::discovery::PluginSource;
use crate::error::{HostError, HostResult};
use crate::instance::{Instance, PluginHandle};
use crate::instance_table::{InstanceTable, GLOBAL_INSTANCE_ID, MAX_INSTANCES, TOOLS_RESERVED_RANGE};
use crate::license;
use crate::midi::{CcSlot, MidiMappings};
use crate::monitor::{Monitor, MonitorSink, Operator, PortKind};
use crate::port::{ControlPort, DesignatedPorts, PortFlow, PortHints, VirtualSymbols};
use crate::postponed::{PostponedEvent, PostponedQueue};
use crate::ring::EventHeader;
use crate::state;
use crate::transport::{TransportState, DEFAULT_BEATS_PER_BAR, DEFAULT_BEATS_PER_MINUTE};
use crate::uri_table::{UriTable, WellKnownUrids};

/// No-op plugin handle for the reserved global instance (id [`GLOBAL_INSTANCE_ID`]): it carries
/// only the `:bpb`/`:bpm`/`:rolling` transport ports and is never run by the process callback.
struct GlobalPluginHandle;

impl PluginHandle for GlobalPluginHandle {
    fn run(&mut self, _nframes: u32) {}
}

/// Toggle-able optional features, per `feature_enable`. `link` is always reported unavailable;
/// `processing` gates whether the RT callback runs plugins at all.
pub struct Features {
    pub processing_enabled: AtomicBool,
    pub link_enabled: AtomicBool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            processing_enabled: AtomicBool::new(true),
            link_enabled: AtomicBool::new(false),
        }
    }
}

/// Everything the control surface, the RT callbacks, and the feedback thread share. No static
/// mutable state exists anywhere else in the crate; every thread reaches shared data through an
/// `Arc<Host>`.
pub struct Host {
    pub instances: InstanceTable<Instance>,
    pub mappings: MidiMappings,
    pub transport: TransportState,
    pub postponed: Arc<PostponedQueue>,
    pub uris: UriTable,
    pub well_known: WellKnownUrids,
    pub virtual_symbols: VirtualSymbols,
    pub features: Features,
    pub ready: Arc<AtomicBool>,
    /// Fast-path cache for repeated `set_parameter(id, symbol, _)` calls on the same port, per
    /// note that this skips the port lookup on repeated writes.
    last_param_write: Mutex<Option<(i32, u32, usize)>>,
    /// The optional monitor socket opened by `monitor_start`/closed by `monitor_stop`. Monitor
    /// lines are written here directly, out-of-band from the postponed-event feedback path.
    monitor_sink: Mutex<Option<Box<dyn MonitorSink>>>,
    /// `--keys-path` override for the license lookup helper; `None` falls back to
    /// `$MOD_KEYS_PATH`. Set once via [`Host::set_keys_path`] at startup.
    keys_path: Mutex<Option<std::path::PathBuf>>,
}

impl Host {
    pub fn new() -> Arc<Self> {
        let uris = UriTable::new();
        let well_known = WellKnownUrids::resolve(&uris);
        let virtual_symbols = VirtualSymbols {
            bypass: uris.map("urn:modhost:bypass"),
            presets: uris.map("urn:modhost:presets"),
            bpb: uris.map("urn:modhost:bpb"),
            bpm: uris.map("urn:modhost:bpm"),
            rolling: uris.map("urn:modhost:rolling"),
        };

        let instances = InstanceTable::new();
        instances
            .insert_at(GLOBAL_INSTANCE_ID, Self::build_global_instance(&virtual_symbols))
            .expect("reserved global instance slot must be free at startup");

        let host = Self {
            instances,
            mappings: MidiMappings::new(),
            transport: TransportState::new(),
            postponed: Arc::new(PostponedQueue::new()),
            uris,
            well_known,
            virtual_symbols,
            features: Features::default(),
            ready: Arc::new(AtomicBool::new(false)),
            last_param_write: Mutex::new(None),
            monitor_sink: Mutex::new(None),
            keys_path: Mutex::new(None),
        };
        Arc::new(host)
    }

    /// Builds the reserved global instance (id [`GLOBAL_INSTANCE_ID`]), present from startup so
    /// `:bpb`/`:bpm` can be addressed like any other control-input port — by `set_parameter` and
    /// by a MIDI CC mapping — with the write observed by `update_from_midi`'s bpb/bpm special case
    /// feeding back into `TransportState`.
    fn build_global_instance(virtual_symbols: &VirtualSymbols) -> Instance {
        let control_in = vec![
            ControlPort::new(0, virtual_symbols.bpb, PortFlow::Input, PortHints::empty(), 1.0, 32.0, DEFAULT_BEATS_PER_BAR as f32),
            ControlPort::new(1, virtual_symbols.bpm, PortFlow::Input, PortHints::empty(), 20.0, 280.0, DEFAULT_BEATS_PER_MINUTE as f32),
            ControlPort::new(2, virtual_symbols.rolling, PortFlow::Input, PortHints::TOGGLE, 0.0, 1.0, 0.0),
        ];
        Instance::new(
            "urn:modhost:global".to_owned(),
            Box::new(GlobalPluginHandle),
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

    /// Sets the `--keys-path` override consulted by `add`'s license check. Called once from
    /// `main.rs` after `HostConfig` is parsed.
    pub fn set_keys_path(&self, path: Option<std::path::PathBuf>) {
        *self.keys_path.lock() = path;
    }

    fn check_instance_id(id: i32) -> HostResult<()> {
        if id < 0 || id as usize >= MAX_INSTANCES {
            return Err(HostError::InstanceInvalid);
        }
        Ok(())
    }

    /// `add(uri, id)`: instantiates a plugin via `source` and installs it at `id`. The RT/server
    /// wiring steps (client creation, port registration, callback registration, activation) are
    /// the audio-server adapter's job (`audio_server.rs`); this method performs
    /// the loader-independent parts (instantiate, build the `Instance`, resolve designations) and
    /// expects the caller (`control.rs`/the protocol dispatcher) to have already asked the
    /// audio-server adapter to finish activation before treating the slot as active.
    pub fn add(&self, source: &dyn PluginSource, uri: &str, id: i32) -> HostResult<()> {
        Self::check_instance_id(id)?;
        if self.instances.contains(id) {
            return Err(HostError::InstanceAlreadyExists);
        }

        let mut instance = source.instantiate(uri, &self.uris)?;
        instance.bypassed = false;
        if let Some(idx) = instance.designated.enabled {
            instance.control_in[idx].set(1.0);
        }
        if let Some(idx) = instance.designated.bpb {
            instance.control_in[idx].set(self.transport.snapshot().bpb as f32);
        }
        if let Some(idx) = instance.designated.bpm {
            instance.control_in[idx].set(self.transport.snapshot().bpm as f32);
        }
        if let Some(idx) = instance.designated.speed {
            instance.control_in[idx].set(if self.transport.snapshot().rolling { 1.0 } else { 0.0 });
        }

        let keys_path = self.keys_path.lock().clone();
        license::check_license(keys_path.as_deref(), source.license_uri(uri).as_deref())?;

        self.instances.insert_at(id, instance).map_err(|_| HostError::InstanceAlreadyExists)?;
        log::info!("add: instance {id} <- {uri}");
        Ok(())
    }

    /// `remove(id)`. The caller is responsible for pausing/restarting the feedback thread around
    /// this call since that thread isn't owned by `Host` itself (it's constructed in
    /// `main.rs` alongside the sockets). This method performs the data-model side of teardown:
    /// draining this instance's events out of the postponed queue, clearing its CC mappings, and
    /// freeing its slot.
    pub fn remove(&self, id: i32) -> HostResult<()> {
        Self::check_instance_id(id)?;
        if id == GLOBAL_INSTANCE_ID {
            // boundary behavior: removing the reserved global instance is a no-op.
            return Ok(());
        }
        if self.instances.remove(id).is_none() {
            return Err(HostError::InstanceNonExists);
        }
        self.mappings.clear_instance(id);
        self.postponed.drain(id, |_| {});
        let mut cache = self.last_param_write.lock();
        if matches!(*cache, Some((cached_id, _, _)) if cached_id == id) {
            *cache = None;
        }
        log::info!("remove: instance {id}");
        Ok(())
    }

    /// `remove(ALL)`: destroys every active instance except the reserved tools range
    /// `TOOLS_RESERVED_RANGE..MAX_INSTANCES`.
    pub fn remove_all(&self) {
        let reserved_start = TOOLS_RESERVED_RANGE as usize;
        for id in self.instances.ids() {
            if id as usize >= reserved_start {
                continue;
            }
            let _ = self.remove(id);
        }
        self.mappings.clear_all();
        self.postponed.drain(crate::postponed::IGNORE_NONE, |_| {});
        log::info!("remove(ALL) complete");
    }

    fn with_instance_mut<R>(&self, id: i32, f: impl FnOnce(&mut Instance) -> HostResult<R>) -> HostResult<R> {
        Self::check_instance_id(id)?;
        self.instances
            .with_mut(id, f)
            .unwrap_or(Err(HostError::InstanceNonExists))
    }

    /// `set_parameter(id, symbol, value)`. Clamps into `[min, max]` via `ControlPort::set`; the
    /// `(id, symbol)` fast-path cache skips the symbol-to-index lookup on repeated writes to the
    /// same port.
    pub fn set_parameter(&self, id: i32, symbol: u32, value: f32) -> HostResult<()> {
        {
            let cache = self.last_param_write.lock();
            if let Some((cached_id, cached_symbol, idx)) = *cache {
                if cached_id == id && cached_symbol == symbol {
                    drop(cache);
                    return self.with_instance_mut(id, |instance| {
                        instance.set_control_in(idx, value);
                        Ok(())
                    });
                }
            }
        }

        self.with_instance_mut(id, |instance| {
            let idx = instance.control_in_index(symbol).ok_or(HostError::Lv2InvalidParamSymbol)?;
            instance.set_control_in(idx, value);
            *self.last_param_write.lock() = Some((id, symbol, idx));
            Ok(())
        })
    }

    /// `get_parameter(id, symbol)`.
    pub fn get_parameter(&self, id: i32, symbol: u32) -> HostResult<f32> {
        self.with_instance_mut(id, |instance| {
            let idx = instance.control_in_index(symbol).ok_or(HostError::Lv2InvalidParamSymbol)?;
            Ok(instance.control_in[idx].current)
        })
    }

    /// `bypass(id, enable)`. Writes the virtual `:bypass` port and, if the plugin declared a
    /// designated `enabled` port, writes its inverse too.
    pub fn bypass(&self, id: i32, enable: bool) -> HostResult<()> {
        self.with_instance_mut(id, |instance| {
            instance.bypassed = enable;
            if let Some(idx) = instance.designated.enabled {
                instance.control_in[idx].set(if enable { 0.0 } else { 1.0 });
            }
            Ok(())
        })
    }

    /// `monitor_output(id, symbol)`: subscribes an output control port to the change-detection
    /// feedback path. The RT callback already scans every `MONITORED` output port each cycle
    /// (`process.rs` Phase F) regardless of an instance-level flag, since the port vector itself
    /// records the subscription.
    pub fn monitor_output(&self, id: i32, symbol: u32) -> HostResult<()> {
        self.with_instance_mut(id, |instance| {
            let idx = instance.control_out_index(symbol).ok_or(HostError::Lv2InvalidParamSymbol)?;
            instance.control_out[idx].hints |= PortHints::MONITORED;
            Ok(())
        })
    }

    /// `monitor_parameter(id, symbol, op, threshold)`: appends a watch record on either the
    /// control-input or control-output port named by `symbol`. Evaluated every RT cycle
    /// regardless of whether a monitor socket is currently open (`process.rs` Phase D).
    pub fn monitor_parameter(&self, id: i32, symbol: u32, op: Operator, threshold: f32) -> HostResult<()> {
        self.with_instance_mut(id, |instance| {
            let (kind, idx) = if let Some(idx) = instance.control_in_index(symbol) {
                (PortKind::Input, idx)
            } else if let Some(idx) = instance.control_out_index(symbol) {
                (PortKind::Output, idx)
            } else {
                return Err(HostError::Lv2InvalidParamSymbol);
            };
            instance.monitors.push(Monitor::new(kind, idx, symbol, op, threshold));
            Ok(())
        })
    }

    /// `monitor_start`: opens the monitor socket. Replaces any previously open one.
    pub fn monitor_start(&self, sink: Box<dyn MonitorSink>) {
        *self.monitor_sink.lock() = Some(sink);
    }

    /// `monitor_stop`: closes the monitor socket.
    pub fn monitor_stop(&self) {
        *self.monitor_sink.lock() = None;
    }

    /// Called by the RT process callback (via `ProcessContext::monitor_emit`) whenever a
    /// monitor's threshold condition newly holds. Writes `monitor <id> <symbol> <value>`
    /// immediately to the monitor socket, out-of-band from the postponed-event queue. A no-op if
    /// no monitor socket is open.
    pub fn emit_monitor(&self, instance_id: i32, symbol: u32, value: f32) {
        let mut sink = self.monitor_sink.lock();
        if let Some(sink) = sink.as_mut() {
            let name = self.uris.unmap(symbol).unwrap_or_default();
            sink.write_line(&format!("monitor {instance_id} {name} {value}"));
        }
    }

    /// `set_property(id, label, value)`: encodes a minimal `patch:Set` record (the property's
    /// URID followed by the value string's bytes) into the instance's control-input event ring
    /// for the RT thread to forward into the plugin's control-input event port next cycle. Full
    /// LV2 atom object encoding (subject/property/value triples) is the discovery adapter's
    /// concern; this host-level path only needs the property to be addressable and the bytes to
    /// reach the plugin.
    pub fn set_property(&self, id: i32, label: &str, value: &str) -> HostResult<()> {
        let property_urid = self.with_instance_mut(id, |instance| {
            instance
                .properties
                .iter()
                .find(|(l, _)| l == label)
                .map(|(_, urid)| *urid)
                .ok_or(HostError::Lv2InvalidParamSymbol)
        })?;

        self.with_instance_mut(id, |instance| {
            let body = value.as_bytes();
            let written = instance.control_ring.as_mut().map(|ring| {
                ring.write(
                    EventHeader {
                        atom_type: property_urid,
                        size: body.len() as u32,
                    },
                    body,
                )
            });
            match written {
                Some(true) | None => Ok(()),
                Some(false) => Err(HostError::MemoryAllocation),
            }
        })
    }

    /// `preset_save(id, dir, file, label)`: captures every control-input port's current value
    /// under the preset URI `file://<dir>/effect-<id>/<file>`, both in-memory (for `preset_load`
    /// to replay without touching disk) and persisted as a flat `symbol=value` listing at that
    /// same path.
    pub fn preset_save(&self, id: i32, dir: &std::path::Path, file: &str, label: &str) -> HostResult<String> {
        let path = state::ensure_state_path(dir, id, file)?;
        let uri = format!("file://{}", path.display());
        let values = self.with_instance_mut(id, |instance| {
            let values: Vec<(u32, f32)> = instance.control_in.iter().map(|p| (p.symbol, p.current)).collect();
            instance.preset_values.insert(uri.clone(), values.clone());
            instance.presets.push(uri.clone());
            Ok(values)
        })?;

        let mut body = format!("# {label}\n");
        for (symbol, value) in &values {
            let name = self.uris.unmap(*symbol).unwrap_or_default();
            body.push_str(&format!("{name}={value}\n"));
        }
        std::fs::write(&path, body).map_err(|_| HostError::MemoryAllocation)?;
        Ok(uri)
    }

    /// `preset_load(id, uri)`: replays a previously-saved preset's port values through the same
    /// write path as `set_parameter`, then reforces the designated `enabled`/`freewheel`/`bpb`/
    /// `bpm`/`speed` ports to current host state, per the control-surface contract.
    pub fn preset_load(&self, id: i32, uri: &str) -> HostResult<()> {
        let snapshot = self.transport.snapshot();
        self.with_instance_mut(id, |instance| {
            let values = instance.preset_values.get(uri).ok_or(HostError::Lv2InvalidPresetUri)?.clone();
            for (symbol, value) in values {
                if let Some(idx) = instance.control_in_index(symbol) {
                    instance.set_control_in(idx, value);
                }
            }
            if let Some(idx) = instance.designated.enabled {
                instance.control_in[idx].set(if instance.bypassed { 0.0 } else { 1.0 });
            }
            if let Some(idx) = instance.designated.freewheel {
                instance.control_in[idx].set(0.0);
            }
            if let Some(idx) = instance.designated.bpb {
                instance.control_in[idx].set(snapshot.bpb as f32);
            }
            if let Some(idx) = instance.designated.bpm {
                instance.control_in[idx].set(snapshot.bpm as f32);
            }
            if let Some(idx) = instance.designated.speed {
                instance.control_in[idx].set(if snapshot.rolling { 1.0 } else { 0.0 });
            }
            instance.active_preset = Some(uri.to_owned());
            Ok(())
        })
    }

    /// `preset_show(uri)`: returns the preset's serialized state as a string, read back from the
    /// file the URI names (`file://<path>`), independent of any live instance.
    pub fn preset_show(&self, uri: &str) -> HostResult<String> {
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        std::fs::read_to_string(path).map_err(|_| HostError::Lv2InvalidPresetUri)
    }

    /// `midi_map(id, symbol, channel, controller, min, max)`.
    pub fn midi_map(&self, id: i32, symbol: u32, channel: u8, controller: u8, min: f32, max: f32) -> HostResult<()> {
        let port_index = self.with_instance_mut(id, |instance| {
            instance.control_in_index(symbol).ok_or(HostError::Lv2InvalidParamSymbol)
        })?;
        self.mappings.map(CcSlot {
            effect_id: id,
            channel,
            controller,
            min,
            max,
            symbol,
            port_index,
        })?;
        Ok(())
    }

    /// `midi_learn(id, symbol, min, max)`.
    pub fn midi_learn(&self, id: i32, symbol: u32, min: f32, max: f32) -> HostResult<()> {
        let port_index = self.with_instance_mut(id, |instance| {
            instance.control_in_index(symbol).ok_or(HostError::Lv2InvalidParamSymbol)
        })?;
        self.mappings.learn(id, symbol, port_index, min, max)
    }

    /// `midi_unmap(id, symbol)`.
    pub fn midi_unmap(&self, id: i32, symbol: u32) -> HostResult<()> {
        self.mappings.unmap(id, symbol)
    }

    /// `feature_enable(name, enable)`. `link` always reports unavailable.
    pub fn feature_enable(&self, name: &str, enable: bool) -> HostResult<()> {
        match name {
            "processing" => {
                self.features.processing_enabled.store(enable, Ordering::Release);
                Ok(())
            }
            "link" => {
                self.features.link_enabled.store(false, Ordering::Release);
                Err(HostError::LinkUnavailable)
            }
            _ => Err(HostError::AssignmentInvalidOp),
        }
    }

    /// `transport(rolling, bpb, bpm)`.
    pub fn transport(&self, rolling: bool, bpb: f64, bpm: f64) {
        self.transport.apply(rolling, bpb, bpm);
        self.postponed.push(PostponedEvent::Transport { rolling, bpb, bpm });
        self.postponed.notify();
    }

    /// `output_data_ready()`: arms the `ready` flag the feedback thread checks after its next
    /// drain, then wakes it immediately rather than waiting for the next RT-produced
    /// event.
    pub fn output_data_ready(&self) {
        self.ready.store(true, Ordering::Release);
        self.postponed.notify();
    }

    pub fn processing_enabled(&self) -> bool {
        self.features.processing_enabled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::FakePluginSource;

    #[test]
    fn add_then_remove_round_trips_slot() {
        let host = Host::new();
        let source = FakePluginSource::with_gain_plugin();
        host.add(&source, "urn:test:gain", 0).unwrap();
        assert!(host.instances.contains(0));

        host.remove(0).unwrap();
        assert!(!host.instances.contains(0));
    }

    #[test]
    fn add_twice_at_same_id_fails() {
        let host = Host::new();
        let source = FakePluginSource::with_gain_plugin();
        host.add(&source, "urn:test:gain", 0).unwrap();
        assert_eq!(host.add(&source, "urn:test:gain", 0), Err(HostError::InstanceAlreadyExists));
    }

    #[test]
    fn set_and_get_parameter_clamps_and_caches() {
        let host = Host::new();
        let source = FakePluginSource::with_gain_plugin();
        host.add(&source, "urn:test:gain", 1).unwrap();
        let gain_symbol = host.uris.map("gain");

        host.set_parameter(1, gain_symbol, 100.0).unwrap();
        assert_eq!(host.get_parameter(1, gain_symbol).unwrap(), 10.0); // clamped to the fake's max

        // second write exercises the fast-path cache
        host.set_parameter(1, gain_symbol, -5.0).unwrap();
        assert_eq!(host.get_parameter(1, gain_symbol).unwrap(), 0.0);
    }

    #[test]
    fn removing_global_instance_is_a_no_op() {
        let host = Host::new();
        assert!(host.remove(GLOBAL_INSTANCE_ID).is_ok());
    }

    #[test]
    fn midi_map_then_unmap_then_cc_produces_no_param_set() {
        let host = Host::new();
        let source = FakePluginSource::with_gain_plugin();
        host.add(&source, "urn:test:gain", 2).unwrap();
        let gain_symbol = host.uris.map("gain");

        host.midi_map(2, gain_symbol, 3, 7, 0.0, 10.0).unwrap();
        host.midi_unmap(2, gain_symbol).unwrap();

        let slots = host.mappings.slots_snapshot();
        assert!(slots.iter().all(|s| s.effect_id != 2 || s.channel != 3 || s.controller != 7 || s.effect_id == crate::midi::UNUSED_SENTINEL));
    }

    struct RecordingSink(Arc<Mutex<Vec<String>>>);

    impl MonitorSink for RecordingSink {
        fn write_line(&mut self, line: &str) {
            self.0.lock().push(line.to_owned());
        }
    }

    #[test]
    fn monitor_parameter_emits_only_on_threshold_crossing() {
        let host = Host::new();
        let source = FakePluginSource::with_gain_plugin();
        host.add(&source, "urn:test:gain", 3).unwrap();
        let gain_symbol = host.uris.map("gain");

        let lines = Arc::new(Mutex::new(Vec::new()));
        host.monitor_start(Box::new(RecordingSink(lines.clone())));
        host.monitor_parameter(3, gain_symbol, Operator::Gt, 5.0).unwrap();

        host.emit_monitor(3, gain_symbol, 2.0); // below threshold, but emit_monitor never checks it itself
        assert_eq!(lines.lock().len(), 1); // emit_monitor always writes; gating happens in process.rs

        host.monitor_stop();
        host.emit_monitor(3, gain_symbol, 9.0);
        assert_eq!(lines.lock().len(), 1); // socket closed, no further lines
    }

    #[test]
    fn monitor_output_rejects_a_control_input_symbol() {
        // `FakePluginSource` only ever declares control-input ports, so this also exercises
        // `monitor_output`'s "symbol isn't a known output port" error path.
        let host = Host::new();
        let source = FakePluginSource::with_gain_plugin();
        host.add(&source, "urn:test:gain", 4).unwrap();
        let gain_symbol = host.uris.map("gain");

        assert_eq!(host.monitor_output(4, gain_symbol), Err(HostError::Lv2InvalidParamSymbol));
    }

    #[test]
    fn set_property_writes_into_control_ring() {
        let host = Host::new();
        let source = FakePluginSource::with_gain_plugin();
        host.add(&source, "urn:test:gain", 5).unwrap();

        let label_urid = host.uris.map("urn:test:label");
        host.with_instance_mut(5, |instance| {
            instance.properties.push(("urn:test:label".to_owned(), label_urid));
            Ok(())
        })
        .unwrap();

        assert_eq!(host.set_property(5, "urn:test:label", "hello"), Ok(()));
        assert_eq!(host.set_property(5, "urn:test:unknown", "x"), Err(HostError::Lv2InvalidParamSymbol));
    }

    #[test]
    fn preset_save_then_load_round_trips_control_values() {
        let tmp = tempfile::tempdir().unwrap();
        let host = Host::new();
        let source = FakePluginSource::with_gain_plugin();
        host.add(&source, "urn:test:gain", 6).unwrap();
        let gain_symbol = host.uris.map("gain");

        host.set_parameter(6, gain_symbol, 3.0).unwrap();
        let uri = host.preset_save(6, tmp.path(), "my-preset.txt", "My Preset").unwrap();

        host.set_parameter(6, gain_symbol, 9.0).unwrap();
        host.preset_load(6, &uri).unwrap();
        assert_eq!(host.get_parameter(6, gain_symbol).unwrap(), 3.0);

        let shown = host.preset_show(&uri).unwrap();
        assert!(shown.contains("gain=3"));
    }

    #[test]
    fn preset_load_of_unknown_uri_fails() {
        let host = Host::new();
        let source = FakePluginSource::with_gain_plugin();
        host.add(&source, "urn:test:gain", 7).unwrap();
        assert_eq!(host.preset_load(7, "file:///no/such/preset"), Err(HostError::Lv2InvalidPresetUri));
    }
}
