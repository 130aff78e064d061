use std::fmt;

/// Orientation quaternion as decoded from a glove report or returned by fusion.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    pub const fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation.
    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Components in `[w, x, y, z]` order, the layout the fusion collaborator expects.
    pub fn to_array(self) -> [f32; 4] {
        [self.w, self.x, self.y, self.z]
    }
}

impl From<[f32; 4]> for Quaternion {
    fn from(a: [f32; 4]) -> Self {
        Self::new(a[0], a[1], a[2], a[3])
    }
}

/// Three-component vector used for acceleration, compass, gravity and Euler angles.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Project a radian-valued vector (e.g. Euler angles) to degrees.
    pub fn to_degrees(self) -> Self {
        Self::new(self.x.to_degrees(), self.y.to_degrees(), self.z.to_degrees())
    }
}

impl From<[f32; 3]> for Vector3 {
    fn from(a: [f32; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }
}

impl std::ops::Sub for Vector3 {
    type Output = Vector3;

    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Which hand the glove is worn on.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Handedness {
    Left = 0,
    Right = 1,
    /// The feature report has not been read yet.
    #[default]
    Unknown = 2,
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handedness::Left => f.write_str("left"),
            Handedness::Right => f.write_str("right"),
            Handedness::Unknown => f.write_str("unknown"),
        }
    }
}

/// Role a HID report characteristic plays in the glove protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReportRole {
    /// Input report carrying quaternion, acceleration and finger flex.
    Motion,
    /// Input report carrying the magnetometer vector.
    Compass,
    /// Feature report carrying the flags byte (handedness, calibration).
    Feature,
    /// Output report driving the vibration motor.
    Rumble,
}

impl fmt::Display for ReportRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportRole::Motion => "motion",
            ReportRole::Compass => "compass",
            ReportRole::Feature => "feature",
            ReportRole::Rumble => "rumble",
        };
        f.write_str(name)
    }
}

/// Lifecycle of a [`crate::GloveSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// Link is up, waiting for service discovery.
    Discovering,
    /// Reports subscribed, waiting for the report map read.
    Identifying,
    Ready,
    /// The peripheral is not a glove. Terminal.
    Rejected,
    /// Closed by the consumer or by a transport failure. Terminal.
    Closed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Rejected | SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

bitflags::bitflags! {
    /// Flags byte stored in the first byte of the glove's feature report.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[repr(C)]
    pub struct GloveFlags: u8 {
        /// Clear = left hand, set = right hand.
        const HANDEDNESS  = 1 << 0;
        const CAL_GYRO    = 1 << 1;
        const CAL_ACCEL   = 1 << 2;
        const CAL_FINGERS = 1 << 3;
    }
}

/// Quaternion and acceleration decoded from one motion report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub quaternion: Quaternion,
    pub acceleration: Vector3,
}

/// Snapshot of a glove, emitted with every processed motion report.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GloveData {
    /// Number of motion reports processed so far in this session.
    pub packet_number: u32,
    pub handedness: Handedness,
    pub quaternion: Quaternion,
    /// Acceleration in g.
    pub acceleration: Vector3,
    /// Euler angles [roll, pitch, yaw] in radians.
    pub euler: Vector3,
    /// Finger flex [0..1], thumb first; -1.0 where no data is available.
    pub fingers: [f32; 5],
}

impl Default for GloveData {
    fn default() -> Self {
        Self {
            packet_number: 0,
            handedness: Handedness::Unknown,
            quaternion: Quaternion::default(),
            acceleration: Vector3::zero(),
            euler: Vector3::zero(),
            fingers: [crate::protocol::FINGER_INVALID; 5],
        }
    }
}
