//! The feedback thread: waits on the postponed-event semaphore, drains the queue, and formats each
//! surviving event as an ASCII line written to the external feedback socket. Grounded in
//! `effects.c`'s feedback thread loop and `socket.c`'s `FEEDBACK_FD` line writer.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::host::Host;
use crate::postponed::{PostponedEvent, IGNORE_NONE};

/// How long the feedback thread waits on its semaphore before checking the `ready`/stop flags
/// again, matching the original's one-second poll.
const WAIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Resolves `event`'s interned symbol id(s) back to their textual port names via `uris`, the same
/// way `Host::emit_monitor` resolves symbols for the monitor socket, so the wire protocol never
/// leaks raw `u32` ids to a feedback client.
fn format_line(uris: &crate::uri_table::UriTable, event: PostponedEvent) -> String {
    match event {
        PostponedEvent::ParamSet { instance, symbol, value } => {
            let name = uris.unmap(symbol).unwrap_or_default();
            format!("param_set {instance} {name} {value}")
        }
        PostponedEvent::OutputMonitor { instance, symbol, value } => {
            let name = uris.unmap(symbol).unwrap_or_default();
            format!("output_set {instance} {name} {value}")
        }
        PostponedEvent::MidiMap {
            instance,
            symbol,
            channel,
            controller,
            value,
            min,
            max,
        } => {
            let name = uris.unmap(symbol).unwrap_or_default();
            format!("midi_mapped {instance} {name} {channel} {controller} {value} {min} {max}")
        }
        PostponedEvent::ProgramListen { channel: _, value } => format!("midi_program {value}"),
        PostponedEvent::Transport { rolling, bpb, bpm } => {
            format!("transport {} {bpb} {bpm}", rolling as u8)
        }
    }
}

/// A sink the feedback thread writes lines to. `TcpStream` satisfies this directly; tests use an
/// in-memory `Vec<u8>`.
pub trait FeedbackSink: Send {
    fn write_line(&mut self, line: &str);
}

impl<W: Write + Send> FeedbackSink for W {
    fn write_line(&mut self, line: &str) {
        let _ = writeln!(self, "{line}");
    }
}

pub struct FeedbackThread {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FeedbackThread {
    /// Spawns the feedback thread against `host`'s postponed queue and `ready` flag. `sink` is
    /// constructed lazily by the caller on each (re)start so that `remove(ALL)`'s pause/restart
    /// cycle can hand back the same open connection without this module needing to know about
    /// sockets directly. `host` is also the source of the `UriTable` every line's symbol id is
    /// resolved against before being written out.
    pub fn spawn(host: Arc<Host>, mut sink: Box<dyn FeedbackSink>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let queue = host.postponed.clone();
        let ready = host.ready.clone();

        let thread = std::thread::Builder::new()
            .name("mod-feedback".into())
            .spawn(move || {
                log::info!("feedback thread starting");
                loop {
                    if thread_stop.load(Ordering::Acquire) {
                        break;
                    }
                    match queue.wake_rx.recv_timeout(WAIT_TIMEOUT) {
                        Ok(()) | Err(crossbeam::channel::RecvTimeoutError::Timeout) => {}
                        Err(crossbeam::channel::RecvTimeoutError::Disconnected) => break,
                    }
                    if thread_stop.load(Ordering::Acquire) {
                        break;
                    }

                    let mut emitted = 0u32;
                    queue.drain(IGNORE_NONE, |event| {
                        sink.write_line(&format_line(&host.uris, event));
                        emitted += 1;
                    });
                    log::debug!("feedback drain emitted {emitted} lines");

                    if ready.swap(false, Ordering::AcqRel) {
                        sink.write_line("data_finish");
                    }
                }
                log::info!("feedback thread stopping");
            })
            .expect("failed to spawn feedback thread");

        Self {
            stop,
            thread: Some(thread),
        }
    }

    /// Stops and joins the thread. Callers construct a fresh [`FeedbackThread`] afterwards
    /// to restart it, since the join consumes this one.
    pub fn stop_and_join(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for FeedbackThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct VecSink(Arc<Mutex<Vec<String>>>);
    impl FeedbackSink for VecSink {
        fn write_line(&mut self, line: &str) {
            self.0.lock().unwrap().push(line.to_owned());
        }
    }

    #[test]
    fn drains_and_formats_a_param_set_line() {
        let host = Host::new();
        let symbol = host.uris.map("gain");
        let lines = Arc::new(Mutex::new(Vec::new()));

        let feedback = FeedbackThread::spawn(host.clone(), Box::new(VecSink(lines.clone())));

        host.postponed.push(PostponedEvent::ParamSet {
            instance: 1,
            symbol,
            value: 0.75,
        });
        host.postponed.notify();

        let mut attempts = 0;
        while lines.lock().unwrap().is_empty() && attempts < 200 {
            std::thread::sleep(Duration::from_millis(5));
            attempts += 1;
        }

        feedback.stop_and_join();
        assert_eq!(lines.lock().unwrap().as_slice(), &["param_set 1 gain 0.75".to_string()]);
    }
}
