use crate::error::TransportError;
use std::fmt;
use uuid::Uuid;

/// GATT transport a glove session issues requests through.
///
/// Every call only submits a request; completions come back later as
/// [`GattEvent`]s passed to [`crate::GloveSession::handle_event`]. An `Err`
/// means the request could not be submitted at all.
///
/// Bindings must deliver the events of one peripheral one at a time.
pub trait GattTransport {
    /// Open the link to the peripheral.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Release the link. Called exactly once, when the session ends.
    fn close(&mut self);

    fn discover_services(&mut self) -> Result<(), TransportError>;

    fn read(&mut self, characteristic: u16) -> Result<(), TransportError>;

    fn write(&mut self, characteristic: u16, value: &[u8]) -> Result<(), TransportError>;

    fn write_descriptor(&mut self, descriptor: u16, value: &[u8]) -> Result<(), TransportError>;

    /// Enable or disable local delivery of notifications for a characteristic.
    fn set_notify(&mut self, characteristic: u16, enabled: bool) -> Result<(), TransportError>;
}

/// Status code attached to a GATT completion (0 = success).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GattStatus(pub u8);

impl GattStatus {
    pub const SUCCESS: GattStatus = GattStatus(0x00);
    pub const READ_NOT_PERMITTED: GattStatus = GattStatus(0x02);
    pub const FAILURE: GattStatus = GattStatus(0x85);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Display for GattStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Link state reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

bitflags::bitflags! {
    /// GATT characteristic properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CharProperties: u8 {
        const BROADCAST         = 0x01;
        const READ              = 0x02;
        const WRITE_NO_RESPONSE = 0x04;
        const WRITE             = 0x08;
        const NOTIFY            = 0x10;
        const INDICATE          = 0x20;
    }
}

/// A discovered GATT descriptor. `value` is set when the binding read it
/// during discovery (e.g. HID Report Reference).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub uuid: Uuid,
    pub handle: u16,
    pub value: Option<Vec<u8>>,
}

/// A discovered GATT characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub handle: u16,
    pub properties: CharProperties,
    pub descriptors: Vec<Descriptor>,
}

impl Characteristic {
    pub fn descriptor(&self, uuid: Uuid) -> Option<&Descriptor> {
        self.descriptors.iter().find(|d| d.uuid == uuid)
    }
}

/// A discovered GATT service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub uuid: Uuid,
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    pub fn characteristic(&self, uuid: Uuid) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

/// Transport-originated events consumed by a glove session.
#[derive(Debug, Clone, PartialEq)]
pub enum GattEvent {
    ConnectionStateChanged {
        status: GattStatus,
        state: LinkState,
    },
    ServicesDiscovered {
        status: GattStatus,
        services: Vec<Service>,
    },
    CharacteristicRead {
        handle: u16,
        status: GattStatus,
        value: Vec<u8>,
    },
    /// Notification of a new characteristic value.
    CharacteristicChanged { handle: u16, value: Vec<u8> },
}
