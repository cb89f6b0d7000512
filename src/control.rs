//! The command table: parses the tokens `protocol.rs` hands it and dispatches to [`Host`] (and,
//! for instantiation/teardown, the audio-server adapter), formatting each outcome as the wire
//! response `protocol::Response` expects. Grounded in `mod-host.c`'s `effects_*` command
//! dispatch switch, kept as a single struct implementing `protocol::CommandHandler` rather than
//! a hand-rolled switch, since Rust's `match` already gives the same shape with less repetition.

use std::collections::HashMap;
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio_server::InstanceClient;
use crate::discovery::PluginSource;
use crate::error::HostError;
use crate::host::Host;
use crate::monitor::Operator;
use crate::protocol::{CommandHandler, Response};

/// Sentinel instance id meaning "every active instance", accepted by `remove`. Distinct from
/// [`crate::instance_table::GLOBAL_INSTANCE_ID`], which names one specific reserved slot.
pub const REMOVE_ALL: i32 = -1;

/// Owns the live per-instance JACK wiring alongside the loader-independent [`Host`], and
/// implements the full command table the control socket accepts.
pub struct ModHostControl {
    host: Arc<Host>,
    source: Arc<dyn PluginSource>,
    // `jack::Client` isn't `Sync`; wrapping it guarantees `ModHostControl` is regardless, since
    // every command that touches it (`connect`/`disconnect`) runs on whichever control-connection
    // thread happens to handle that line.
    jack_client: Mutex<jack::Client>,
    clients: Mutex<HashMap<i32, InstanceClient>>,
    state_dir: PathBuf,
}

impl ModHostControl {
    pub fn new(host: Arc<Host>, source: Arc<dyn PluginSource>, jack_client: jack::Client, state_dir: PathBuf) -> Self {
        Self {
            host,
            source,
            jack_client: Mutex::new(jack_client),
            clients: Mutex::new(HashMap::new()),
            state_dir,
        }
    }

    /// `add(uri, id)`: instantiates the plugin (`Host::add`) then asks the audio-server adapter
    /// to register ports and activate the client, unwinding the instance on either failure so no
    /// active slot is left without a running client.
    fn add(&self, uri: &str, id: i32) -> Result<(), HostError> {
        self.host.add(self.source.as_ref(), uri, id)?;
        match InstanceClient::open(self.host.clone(), id) {
            Ok(client) => {
                self.clients.lock().insert(id, client);
                Ok(())
            }
            Err(err) => {
                let _ = self.host.remove(id);
                Err(err)
            }
        }
    }

    fn remove_one(&self, id: i32) -> Result<(), HostError> {
        self.host.remove(id)?;
        if let Some(client) = self.clients.lock().remove(&id) {
            let _ = client.close();
        }
        Ok(())
    }

    fn remove(&self, id: i32) -> Result<(), HostError> {
        if id == REMOVE_ALL {
            self.host.remove_all();
            let mut clients = self.clients.lock();
            for (_, client) in clients.drain() {
                let _ = client.close();
            }
            Ok(())
        } else {
            self.remove_one(id)
        }
    }

    fn connect(&self, a: &str, b: &str) -> Result<(), HostError> {
        // Tolerate reversed order: try as given, then swapped, matching the control-surface
        // contract's "tolerate reversed order for connect".
        let client = self.jack_client.lock();
        if client.connect_ports_by_name(a, b).is_ok() {
            return Ok(());
        }
        client.connect_ports_by_name(b, a).map_err(|_| HostError::JackPortConnection)
    }

    fn disconnect(&self, a: &str, b: &str) -> Result<(), HostError> {
        let client = self.jack_client.lock();
        if client.disconnect_ports_by_name(a, b).is_ok() {
            return Ok(());
        }
        client.disconnect_ports_by_name(b, a).map_err(|_| HostError::JackPortDisconnection)
    }

    fn dispatch(&self, tokens: &[String]) -> Response {
        match tokens[0].as_str() {
            "add" if tokens.len() == 3 => match tokens[2].parse::<i32>() {
                Ok(id) => match self.add(&tokens[1], id) {
                    Ok(()) => Response::ok(),
                    Err(err) => Response::err(err.code()),
                },
                Err(_) => Response::err(HostError::InstanceInvalid.code()),
            },
            "remove" if tokens.len() == 2 => match tokens[1].parse::<i32>() {
                Ok(id) => match self.remove(id) {
                    Ok(()) => Response::ok(),
                    Err(err) => Response::err(err.code()),
                },
                Err(_) => Response::err(HostError::InstanceInvalid.code()),
            },
            "connect" if tokens.len() == 3 => match self.connect(&tokens[1], &tokens[2]) {
                Ok(()) => Response::ok(),
                Err(err) => Response::err(err.code()),
            },
            "disconnect" if tokens.len() == 3 => match self.disconnect(&tokens[1], &tokens[2]) {
                Ok(()) => Response::ok(),
                Err(err) => Response::err(err.code()),
            },
            "bypass" if tokens.len() == 3 => match (tokens[1].parse::<i32>(), tokens[2].parse::<i32>()) {
                (Ok(id), Ok(flag)) => match self.host.bypass(id, flag != 0) {
                    Ok(()) => Response::ok(),
                    Err(err) => Response::err(err.code()),
                },
                _ => Response::err(HostError::InstanceInvalid.code()),
            },
            "param_set" if tokens.len() == 4 => match (tokens[1].parse::<i32>(), tokens[3].parse::<f32>()) {
                (Ok(id), Ok(value)) => {
                    let symbol = self.host.uris.map(&tokens[2]);
                    match self.host.set_parameter(id, symbol, value) {
                        Ok(()) => Response::ok(),
                        Err(err) => Response::err(err.code()),
                    }
                }
                _ => Response::err(HostError::InstanceInvalid.code()),
            },
            "param_get" if tokens.len() == 3 => match tokens[1].parse::<i32>() {
                Ok(id) => {
                    let symbol = self.host.uris.map(&tokens[2]);
                    match self.host.get_parameter(id, symbol) {
                        Ok(value) => Response::ok_value(format!("{value:.4}")),
                        Err(err) => Response::err(err.code()),
                    }
                }
                Err(_) => Response::err(HostError::InstanceInvalid.code()),
            },
            "param_monitor" if tokens.len() == 5 => {
                match (tokens[1].parse::<i32>(), Operator::parse(&tokens[3]), tokens[4].parse::<f32>()) {
                    (Ok(id), Some(op), Ok(threshold)) => {
                        let symbol = self.host.uris.map(&tokens[2]);
                        match self.host.monitor_parameter(id, symbol, op, threshold) {
                            Ok(()) => Response::ok(),
                            Err(err) => Response::err(err.code()),
                        }
                    }
                    _ => Response::err(HostError::AssignmentInvalidOp.code()),
                }
            }
            "monitor_output" if tokens.len() == 3 => match tokens[1].parse::<i32>() {
                Ok(id) => {
                    let symbol = self.host.uris.map(&tokens[2]);
                    match self.host.monitor_output(id, symbol) {
                        Ok(()) => Response::ok(),
                        Err(err) => Response::err(err.code()),
                    }
                }
                Err(_) => Response::err(HostError::InstanceInvalid.code()),
            },
            "preset_load" if tokens.len() == 3 => match tokens[1].parse::<i32>() {
                Ok(id) => match self.host.preset_load(id, &tokens[2]) {
                    Ok(()) => Response::ok(),
                    Err(err) => Response::err(err.code()),
                },
                Err(_) => Response::err(HostError::InstanceInvalid.code()),
            },
            "preset_save" if tokens.len() == 5 => match tokens[1].parse::<i32>() {
                Ok(id) => {
                    let dir = self.state_dir.join(&tokens[3]);
                    match self.host.preset_save(id, &dir, &tokens[4], &tokens[2]) {
                        Ok(uri) => Response::ok_value(uri),
                        Err(err) => Response::err(err.code()),
                    }
                }
                Err(_) => Response::err(HostError::InstanceInvalid.code()),
            },
            "preset_show" if tokens.len() == 2 => match self.host.preset_show(&tokens[1]) {
                Ok(text) => Response::ok_value(text.replace('\n', "\\n")),
                Err(err) => Response::err(err.code()),
            },
            "midi_learn" if tokens.len() == 5 => {
                match (tokens[1].parse::<i32>(), tokens[3].parse::<f32>(), tokens[4].parse::<f32>()) {
                    (Ok(id), Ok(min), Ok(max)) => {
                        let symbol = self.host.uris.map(&tokens[2]);
                        match self.host.midi_learn(id, symbol, min, max) {
                            Ok(()) => Response::ok(),
                            Err(err) => Response::err(err.code()),
                        }
                    }
                    _ => Response::err(HostError::InstanceInvalid.code()),
                }
            }
            "midi_map" if tokens.len() == 7 => match (
                tokens[1].parse::<i32>(),
                tokens[3].parse::<u8>(),
                tokens[4].parse::<u8>(),
                tokens[5].parse::<f32>(),
                tokens[6].parse::<f32>(),
            ) {
                (Ok(id), Ok(channel), Ok(controller), Ok(min), Ok(max)) => {
                    let symbol = self.host.uris.map(&tokens[2]);
                    match self.host.midi_map(id, symbol, channel, controller, min, max) {
                        Ok(()) => Response::ok(),
                        Err(err) => Response::err(err.code()),
                    }
                }
                _ => Response::err(HostError::InstanceInvalid.code()),
            },
            "midi_unmap" if tokens.len() == 3 => match tokens[1].parse::<i32>() {
                Ok(id) => {
                    let symbol = self.host.uris.map(&tokens[2]);
                    match self.host.midi_unmap(id, symbol) {
                        Ok(()) => Response::ok(),
                        Err(err) => Response::err(err.code()),
                    }
                }
                Err(_) => Response::err(HostError::InstanceInvalid.code()),
            },
            "cc_map" => Response::err(HostError::ControlChainUnavailable.code()),
            "cc_unmap" => Response::err(HostError::ControlChainUnavailable.code()),
            "feature_enable" if tokens.len() == 3 => match tokens[2].parse::<i32>() {
                Ok(flag) => match self.host.feature_enable(&tokens[1], flag != 0) {
                    Ok(()) => Response::ok(),
                    Err(err) => Response::err(err.code()),
                },
                Err(_) => Response::err(HostError::AssignmentInvalidOp.code()),
            },
            "transport" if tokens.len() == 4 => {
                match (tokens[1].parse::<i32>(), tokens[2].parse::<f64>(), tokens[3].parse::<f64>()) {
                    (Ok(rolling), Ok(bpb), Ok(bpm)) => {
                        self.host.transport(rolling != 0, bpb, bpm);
                        Response::ok()
                    }
                    _ => Response::err(HostError::AssignmentInvalidOp.code()),
                }
            }
            "output_data_ready" if tokens.len() == 1 => {
                self.host.output_data_ready();
                Response::ok()
            }
            "monitor_start" if tokens.len() == 3 => match tokens[2].parse::<u16>() {
                Ok(port) => match TcpStream::connect((tokens[1].as_str(), port)) {
                    Ok(stream) => {
                        self.host.monitor_start(Box::new(stream));
                        Response::ok()
                    }
                    Err(_) => Response::err(HostError::MonitorConnectionFailed.code()),
                },
                Err(_) => Response::err(HostError::AssignmentInvalidOp.code()),
            },
            "monitor_stop" if tokens.len() == 1 => {
                self.host.monitor_stop();
                Response::ok()
            }
            _ => Response::err(-1),
        }
    }
}

impl CommandHandler for ModHostControl {
    fn handle(&self, tokens: &[String]) -> Option<Response> {
        Some(self.dispatch(tokens))
    }
}
