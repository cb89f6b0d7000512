//! Plugin discovery and instantiation, independent of any concrete loader. [`PluginSource`] is
//! the trait the control surface (`host.rs`) depends on; [`LiviPluginSource`] is the real
//! `livi`-backed adapter, and [`FakePluginSource`] (test-only) is the synthetic in-memory
//! implementation the integration tests in `tests/` drive instead of a live Lilv world, so wrapper
//! logic can be exercised independent of a live backend.
//!
//! Grounded in `effects.c`'s `effects_add` and `lilv`/`livi`'s plugin and port metadata model.

use crate::error::{HostError, HostResult};
use crate::instance::{Instance, PluginHandle};
use crate::port::{AudioPort, ControlPort, DesignatedPorts, EventEncoding, EventPort, PortFlow, PortHints};
use crate::uri_table::UriTable;

/// The capability set a loader must provide to produce a usable [`Instance`]. Real
/// discovery backends (e.g. `LiviPluginSource`) and test doubles alike implement this.
pub trait PluginSource: Send + Sync {
    /// Instantiates the plugin, enumerates its ports, parses ranges/hints, resolves
    /// designations, and returns a fully-formed (but not yet server-activated) [`Instance`].
    /// Server-side port registration and client activation are layered on by `audio_server.rs`.
    fn instantiate(&self, uri: &str, uris: &UriTable) -> HostResult<Instance>;

    /// The plugin's declared license URI, if any, checked by `Host::add` before the plugin is
    /// instantiated. Most plugins declare none; the default covers that case so test doubles
    /// don't need to implement it.
    fn license_uri(&self, _uri: &str) -> Option<String> {
        None
    }
}

/// The `livi`-backed adapter. Wraps a `livi::World` (the Lilv plugin index) and turns a URI into
/// an instantiated plugin the rest of the host only sees through [`PluginHandle`]/[`Instance`].
pub struct LiviPluginSource {
    world: livi::World,
    sample_rate: f64,
    block_size: usize,
    midi_buffer_size: usize,
}

impl LiviPluginSource {
    pub fn new(sample_rate: f64, block_size: usize, midi_buffer_size: usize) -> Self {
        Self {
            world: livi::World::new(),
            sample_rate,
            block_size,
            midi_buffer_size,
        }
    }
}

/// Wraps a `livi::Instance` so the RT process callback only ever depends on [`PluginHandle`],
/// never on `livi` types directly.
struct LiviHandle {
    instance: livi::Instance,
}

impl PluginHandle for LiviHandle {
    fn run(&mut self, nframes: u32) {
        // `livi::Instance::run` takes the port buffers that were wired up by the process callback
        // (phases B/C) through the `PortConnections` it was instantiated with; the concrete
        // adapter wiring lives in `audio_server.rs`, which owns the buffers this is called with.
        unsafe {
            self.instance.run(nframes as usize).expect("plugin run failed");
        }
    }

    fn has_worker(&self) -> bool {
        false
    }
}

impl PluginSource for LiviPluginSource {
    fn instantiate(&self, uri: &str, uris: &UriTable) -> HostResult<Instance> {
        let plugin = self
            .world
            .iter_plugins()
            .find(|p| p.uri() == uri)
            .ok_or(HostError::Lv2InvalidUri)?;

        let features = self.world.build_features(livi::FeaturesBuilder {
            min_block_length: 1,
            max_block_length: self.block_size,
        });

        let instance = unsafe {
            plugin
                .instantiate(features.clone(), self.sample_rate)
                .map_err(|_| HostError::Lv2Instantiation)?
        };

        let mut audio_in = Vec::new();
        let mut audio_out = Vec::new();
        let mut cv_in = Vec::new();
        let mut cv_out = Vec::new();
        let mut control_in = Vec::new();
        let mut control_out = Vec::new();
        let mut event_in = Vec::new();
        let mut event_out = Vec::new();
        let mut designated = DesignatedPorts::default();

        for (index, port) in plugin.ports().enumerate() {
            let symbol = uris.map(&port.name);
            let flow = if port.is_input { PortFlow::Input } else { PortFlow::Output };
            match port.port_type {
                livi::PortType::Audio => {
                    let p = AudioPort::new(index as u32, flow, self.block_size);
                    if flow == PortFlow::Input {
                        audio_in.push(p)
                    } else {
                        audio_out.push(p)
                    }
                }
                livi::PortType::ControlInput | livi::PortType::ControlOutput => {
                    let mut hints = PortHints::empty();
                    if port.enumeration {
                        hints |= PortHints::ENUMERATION;
                    }
                    if port.integer {
                        hints |= PortHints::INTEGER;
                    }
                    if port.toggled {
                        hints |= PortHints::TOGGLE;
                    }
                    let (mut min, mut max) = (port.min_value.unwrap_or(0.0), port.max_value.unwrap_or(1.0));
                    if port.scales_with_sample_rate {
                        min *= self.sample_rate as f32;
                        max *= self.sample_rate as f32;
                    }
                    let default = port.default_value.unwrap_or(min);
                    let cp = ControlPort::new(index as u32, symbol, flow, hints, min, max, default);

                    if port.designation_control_input {
                        designated.control_input = Some(control_in.len());
                    }
                    if port.designation_enabled {
                        designated.enabled = Some(control_in.len());
                    }
                    if port.designation_freewheel {
                        designated.freewheel = Some(control_in.len());
                    }
                    if port.designation_bpb {
                        designated.bpb = Some(control_in.len());
                    }
                    if port.designation_bpm {
                        designated.bpm = Some(control_in.len());
                    }
                    if port.designation_speed {
                        designated.speed = Some(control_in.len());
                    }

                    if flow == PortFlow::Input {
                        control_in.push(cp);
                    } else {
                        control_out.push(cp);
                    }
                }
                livi::PortType::CV => {
                    // CV ports carry a per-sample float buffer just like audio, so they reuse
                    // `AudioPort`'s storage, but are kept in their own `cv_in`/`cv_out` vectors
                    // (not merged into `audio_in`/`audio_out`) so the process callback can zero
                    // them independently of audio in bypass, per the port-type model.
                    let p = AudioPort::new(index as u32, flow, self.block_size);
                    if flow == PortFlow::Input {
                        cv_in.push(p)
                    } else {
                        cv_out.push(p)
                    }
                }
                livi::PortType::AtomSequence => {
                    let encoding = if port.old_event_api {
                        EventEncoding::OldEventApi
                    } else {
                        EventEncoding::AtomSequence
                    };
                    let mut hints = PortHints::empty();
                    if port.supports_time_position {
                        hints |= PortHints::TRANSPORT;
                    }
                    let ep = EventPort::new(index as u32, flow, encoding, hints, self.midi_buffer_size);
                    if flow == PortFlow::Input {
                        event_in.push(ep)
                    } else {
                        event_out.push(ep)
                    }
                }
            }
        }

        Ok(Instance::new(
            uri.to_owned(),
            Box::new(LiviHandle { instance }),
            audio_in,
            audio_out,
            cv_in,
            cv_out,
            control_in,
            control_out,
            event_in,
            event_out,
            designated,
        ))
    }
}

/// A synthetic, in-memory plugin source for the integration tests in `tests/`. Registers a handful of canned plugins by URI so the control surface and RT process
/// callback can be exercised deterministically without a live Lilv/JACK backend.
pub struct FakePluginSource {
    plugins: std::collections::HashMap<String, FakePluginSpec>,
}

struct FakePluginSpec {
    audio_in: usize,
    audio_out: usize,
    controls: Vec<(&'static str, f32, f32, f32, PortHints)>,
}

struct NoopHandle {
    pub runs: std::sync::atomic::AtomicU32,
}

impl PluginHandle for NoopHandle {
    fn run(&mut self, _nframes: u32) {
        self.runs.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}

impl FakePluginSource {
    pub fn new() -> Self {
        Self {
            plugins: std::collections::HashMap::new(),
        }
    }

    pub fn register(&mut self, uri: &str, spec_audio_in: usize, spec_audio_out: usize, controls: Vec<(&'static str, f32, f32, f32, PortHints)>) {
        self.plugins.insert(
            uri.to_owned(),
            FakePluginSpec {
                audio_in: spec_audio_in,
                audio_out: spec_audio_out,
                controls,
            },
        );
    }

    /// Convenience constructor used throughout the unit/integration tests: one audio in/out pair
    /// and a single `gain` control port ranged `[0, 10]`, defaulting to `1.0`.
    pub fn with_gain_plugin() -> Self {
        let mut source = Self::new();
        source.register("urn:test:gain", 1, 1, vec![("gain", 0.0, 10.0, 1.0, PortHints::empty())]);
        source
    }
}

impl Default for FakePluginSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginSource for FakePluginSource {
    fn instantiate(&self, uri: &str, uris: &UriTable) -> HostResult<Instance> {
        let spec = self.plugins.get(uri).ok_or(HostError::Lv2InvalidUri)?;

        let audio_in = (0..spec.audio_in).map(|i| AudioPort::new(i as u32, PortFlow::Input, 64)).collect();
        let audio_out = (0..spec.audio_out).map(|i| AudioPort::new(i as u32, PortFlow::Output, 64)).collect();
        let control_in = spec
            .controls
            .iter()
            .enumerate()
            .map(|(i, (name, min, max, default, hints))| {
                ControlPort::new(i as u32, uris.map(name), PortFlow::Input, *hints, *min, *max, *default)
            })
            .collect();

        Ok(Instance::new(
            uri.to_owned(),
            Box::new(NoopHandle { runs: 0.into() }),
            audio_in,
            audio_out,
            vec![],
            vec![],
            control_in,
            vec![],
            vec![],
            vec![],
            DesignatedPorts::default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_source_rejects_unknown_uri() {
        let source = FakePluginSource::with_gain_plugin();
        let uris = UriTable::new();
        assert_eq!(source.instantiate("urn:unknown", &uris).unwrap_err(), HostError::Lv2InvalidUri);
    }

    #[test]
    fn fake_source_builds_declared_ports() {
        let source = FakePluginSource::with_gain_plugin();
        let uris = UriTable::new();
        let instance = source.instantiate("urn:test:gain", &uris).unwrap();
        assert_eq!(instance.audio_in.len(), 1);
        assert_eq!(instance.audio_out.len(), 1);
        assert_eq!(instance.control_in.len(), 1);
        assert_eq!(instance.control_in[0].current, 1.0);
    }
}
