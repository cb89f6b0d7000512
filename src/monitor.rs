//! Parameter monitors: per-instance watch list evaluated every RT cycle, emitting an
//! immediate out-of-band line to a separate monitor socket (never through the postponed queue)
//! the first time a threshold condition becomes true after the value actually changed. The
//! monitor socket itself is a client connection this host dials out to the `<host> <port>` named
//! by the `monitor_start` control command (`control.rs`), not a listener — `Host::monitor_start`/
//! `monitor_stop` only hold the resulting stream, the dial itself happens at the call site.
//! Grounded in `effects.c`'s `effects_monitor_parameter`/`CheckMonitor` and `monitor.c`'s dial-out
//! socket.

use crate::port::SymbolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Operator {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Ge),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Le),
            "==" => Some(Operator::Eq),
            "!=" => Some(Operator::Ne),
            _ => None,
        }
    }

    pub fn apply(self, v: f32, threshold: f32) -> bool {
        match self {
            Operator::Gt => v > threshold,
            Operator::Ge => v >= threshold,
            Operator::Lt => v < threshold,
            Operator::Le => v <= threshold,
            Operator::Eq => (v - threshold).abs() < f32::EPSILON,
            Operator::Ne => (v - threshold).abs() >= f32::EPSILON,
        }
    }
}

/// Which one of an instance's two control-port vectors a monitor watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy)]
pub struct Monitor {
    pub kind: PortKind,
    pub port_index: usize,
    pub symbol: SymbolId,
    pub op: Operator,
    pub threshold: f32,
    pub last_notified: f32,
}

impl Monitor {
    pub fn new(kind: PortKind, port_index: usize, symbol: SymbolId, op: Operator, threshold: f32) -> Self {
        Self {
            kind,
            port_index,
            symbol,
            op,
            threshold,
            last_notified: f32::NAN,
        }
    }

    /// Evaluates against the port's current value `v`. Returns `Some(v)` (and the caller should
    /// emit a `monitor <id> <symbol> <value>` line) exactly when the condition is true *and* `v`
    /// has moved by at least `FLT_EPSILON` since the last notification.
    pub fn check(&mut self, v: f32) -> Option<f32> {
        let changed = (v - self.last_notified).abs() >= f32::EPSILON || self.last_notified.is_nan();
        if self.op.apply(v, self.threshold) && changed {
            self.last_notified = v;
            Some(v)
        } else {
            None
        }
    }
}

/// A sink the monitor evaluation writes lines to, mirroring `feedback::FeedbackSink` but kept as
/// its own trait since the monitor socket has an independent lifecycle (`monitor_start`/
/// `monitor_stop`) from the feedback connection.
pub trait MonitorSink: Send {
    fn write_line(&mut self, line: &str);
}

impl<W: std::io::Write + Send> MonitorSink for W {
    fn write_line(&mut self, line: &str) {
        let _ = writeln!(self, "{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_once_per_threshold_crossing() {
        let mut m = Monitor::new(PortKind::Output, 0, 1, Operator::Gt, 5.0);
        assert_eq!(m.check(3.0), None);
        assert_eq!(m.check(6.0), Some(6.0));
        assert_eq!(m.check(6.0), None); // same value, already notified
        assert_eq!(m.check(7.0), Some(7.0));
    }

    #[test]
    fn equality_uses_epsilon() {
        let mut m = Monitor::new(PortKind::Input, 0, 1, Operator::Eq, 1.0);
        assert_eq!(m.check(1.0), Some(1.0));
    }
}
