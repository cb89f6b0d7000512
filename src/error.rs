//! The host's error taxonomy. Every control-surface entry point returns `Result<T, HostError>`;
//! the protocol layer (`protocol.rs`) formats the `Err` side as `resp <tag>` using [`HostError::code`].
//!
//! The tag values and their meanings mirror `effects.h`'s error enum one-for-one, extended with a
//! handful of tags for functionality this host adds (licensing, monitor sockets, assignment-list
//! bookkeeping).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostError {
    InstanceInvalid,
    InstanceAlreadyExists,
    InstanceNonExists,
    InstanceUnlicensed,
    Lv2InvalidUri,
    Lv2Instantiation,
    Lv2InvalidParamSymbol,
    Lv2InvalidPresetUri,
    Lv2CantLoadState,
    JackClientCreation,
    JackClientActivation,
    JackClientDeactivation,
    JackPortRegister,
    JackPortConnection,
    JackPortDisconnection,
    MemoryAllocation,
    AssignmentListFull,
    AssignmentInvalidOp,
    LinkUnavailable,
    ControlChainUnavailable,
    MonitorConnectionFailed,
}

impl HostError {
    /// The negative wire code sent back over the control socket, matching the original
    /// implementation's numbering exactly for the tags that existed there.
    pub const fn code(self) -> i32 {
        match self {
            HostError::InstanceInvalid => -1,
            HostError::InstanceAlreadyExists => -2,
            HostError::InstanceNonExists => -3,
            HostError::InstanceUnlicensed => -4,
            HostError::Lv2InvalidUri => -101,
            HostError::Lv2Instantiation => -102,
            HostError::Lv2InvalidParamSymbol => -103,
            HostError::Lv2InvalidPresetUri => -104,
            HostError::Lv2CantLoadState => -105,
            HostError::JackClientCreation => -201,
            HostError::JackClientActivation => -202,
            HostError::JackClientDeactivation => -203,
            HostError::JackPortRegister => -204,
            HostError::JackPortConnection => -205,
            HostError::JackPortDisconnection => -206,
            HostError::MemoryAllocation => -301,
            HostError::AssignmentListFull => -401,
            HostError::AssignmentInvalidOp => -402,
            HostError::LinkUnavailable => -501,
            HostError::ControlChainUnavailable => -502,
            HostError::MonitorConnectionFailed => -503,
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            HostError::InstanceInvalid => "instance id out of range",
            HostError::InstanceAlreadyExists => "instance slot already in use",
            HostError::InstanceNonExists => "no such instance",
            HostError::InstanceUnlicensed => "no license found for this plugin",
            HostError::Lv2InvalidUri => "plugin URI not discoverable",
            HostError::Lv2Instantiation => "plugin refused to instantiate",
            HostError::Lv2InvalidParamSymbol => "no such port or property",
            HostError::Lv2InvalidPresetUri => "preset URI unknown or unloadable",
            HostError::Lv2CantLoadState => "state deserialization failed",
            HostError::JackClientCreation => "audio server client creation failed",
            HostError::JackClientActivation => "audio server client activation failed",
            HostError::JackClientDeactivation => "audio server client deactivation failed",
            HostError::JackPortRegister => "audio server port registration failed",
            HostError::JackPortConnection => "audio server port connection failed",
            HostError::JackPortDisconnection => "audio server port disconnection failed",
            HostError::MemoryAllocation => "out of memory",
            HostError::AssignmentListFull => "MIDI CC assignment list is full",
            HostError::AssignmentInvalidOp => "unknown monitor operator or unmap target",
            HostError::LinkUnavailable => "Link support is not available",
            HostError::ControlChainUnavailable => "Control Chain support is not available",
            HostError::MonitorConnectionFailed => "could not connect to the monitor collector",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for HostError {}

pub type HostResult<T> = Result<T, HostError>;
