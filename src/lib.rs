//! # glove-hid - BLE HID driver for motion-capture gloves
//!
//! Decodes the sensor reports a glove streams over the BLE HID profile.
//! Provides:
//! - Report classification and fixed-point decoding (quaternion, acceleration,
//!   compass, finger flex)
//! - Glove identification from the HID report map, handedness from the
//!   feature report
//! - A per-glove session state machine driven by transport events
//! - Orientation math (Euler angles, gravity, linear acceleration)
//! - C FFI for integration with C/C++/Unity consumers
//!
//! The BLE stack itself is not part of this crate: a binding implements
//! [`GattTransport`] and feeds [`GattEvent`]s into [`GloveSession::handle_event`].
//!
//! ## Quick Start
//! ```no_run
//! use glove_hid::{GloveEvent, GloveSession, PassThroughFusion, SessionConfig};
//! # fn transport() -> Box<dyn glove_hid::GattTransport + Send> { unimplemented!() }
//! # fn next_event() -> glove_hid::GattEvent { unimplemented!() }
//!
//! let (mut session, events) = GloveSession::new(
//!     "glove-0",
//!     transport(),
//!     Box::new(PassThroughFusion),
//!     SessionConfig::from_env(),
//! );
//! session.connect().unwrap();
//!
//! loop {
//!     session.handle_event(next_event());
//!     while let Some(event) = events.try_recv() {
//!         if let GloveEvent::Changed(data) = event {
//!             println!("quat: {:?} fingers: {:?}", data.quaternion, data.fingers);
//!         }
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod ffi;
pub mod fusion;
pub mod identity;
pub mod math;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod stream;
pub mod transport;
pub mod types;

pub use config::{RoleAssignment, SessionConfig};
pub use error::{GloveError, TransportError};
pub use fusion::{PassThroughFusion, SensorFusion};
pub use math::{gravity, linear_acceleration, to_euler};
pub use registry::{GloveRegistry, SharedSession};
pub use session::{GloveSession, SensorState};
pub use stream::{GloveEvent, GloveStream};
pub use transport::{Characteristic, Descriptor, GattEvent, GattStatus, GattTransport, LinkState, Service};
pub use types::*;

/// Result type alias for glove-hid operations.
pub type Result<T> = std::result::Result<T, GloveError>;
