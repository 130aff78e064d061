use crate::transport::GattStatus;
use crate::types::{ReportRole, SessionState};
use std::fmt;

/// Errors reported by a transport binding when a request cannot be submitted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("link is not established")]
    NotConnected,

    #[error("unknown attribute handle 0x{0:04x}")]
    UnknownHandle(u16),

    #[error("request rejected by the BLE stack: {0}")]
    Request(String),
}

/// Errors that can occur when interacting with a glove.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GloveError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("no connected glove for that hand")]
    Disconnected,

    #[error("operation not allowed while session is {0}")]
    InvalidState(SessionState),

    #[error("peripheral exposes no {0} report")]
    ReportUnavailable(ReportRole),

    #[error("{operation} failed with GATT status {status}")]
    GattStatus {
        operation: &'static str,
        status: GattStatus,
    },

    #[error("Timeout waiting for data")]
    Timeout,

    #[error("Event stream stopped")]
    StreamStopped,
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &GloveError) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}
