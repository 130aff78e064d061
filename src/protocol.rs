use crate::types::{GloveFlags, MotionSample, Quaternion, ReportRole, Vector3};
use uuid::Uuid;

// -- Bluetooth SIG 16-bit UUIDs --
pub const HID_SERVICE: Uuid = sig_uuid(0x1812);
pub const HID_INFORMATION: Uuid = sig_uuid(0x2A4A);
pub const HID_REPORT_MAP: Uuid = sig_uuid(0x2A4B);
pub const HID_CONTROL_POINT: Uuid = sig_uuid(0x2A4C);
pub const HID_REPORT: Uuid = sig_uuid(0x2A4D);
pub const CLIENT_CHARACTERISTIC_CONFIG: Uuid = sig_uuid(0x2902);
pub const REPORT_REFERENCE: Uuid = sig_uuid(0x2908);

/// CCCD value that turns notifications on.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// Expand a 16-bit SIG UUID on the Bluetooth base UUID
/// `0000xxxx-0000-1000-8000-00805f9b34fb`.
pub const fn sig_uuid(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_0080_5f9b_34fb)
}

// -- Fixed-point divisors --
pub const QUAT_DIVISOR: f32 = 16384.0;
pub const ACCEL_DIVISOR: f32 = 16384.0;
pub const COMPASS_DIVISOR: f32 = 32.0;
pub const FINGER_DIVISOR: f32 = 255.0;

// -- Report geometry --
pub const QUAT_OFFSET: usize = 0;
pub const ACCEL_OFFSET: usize = 8;
pub const COMPASS_OFFSET: usize = 0;
pub const FINGER_OFFSET: usize = 14;
pub const FINGER_COUNT: usize = 5;

/// Finger value reported when the index is out of range or no data is present.
pub const FINGER_INVALID: f32 = -1.0;

// -- HID Report Reference report types --
pub const REPORT_TYPE_INPUT: u8 = 0x01;
pub const REPORT_TYPE_OUTPUT: u8 = 0x02;
pub const REPORT_TYPE_FEATURE: u8 = 0x03;

// -- Report ids used by the glove firmware --
pub const MOTION_REPORT_ID: u8 = 1;
pub const COMPASS_REPORT_ID: u8 = 2;

fn read_i16(buf: &[u8], offset: usize) -> Option<i16> {
    let bytes = buf.get(offset..offset.checked_add(2)?)?;
    Some(i16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Decode a quaternion [w, x, y, z] stored as 4x int16 LE starting at `offset`.
///
/// Returns `None` when the buffer is too short.
pub fn decode_quaternion(buf: &[u8], offset: usize) -> Option<Quaternion> {
    let w = read_i16(buf, offset)? as f32 / QUAT_DIVISOR;
    let x = read_i16(buf, offset + 2)? as f32 / QUAT_DIVISOR;
    let y = read_i16(buf, offset + 4)? as f32 / QUAT_DIVISOR;
    let z = read_i16(buf, offset + 6)? as f32 / QUAT_DIVISOR;
    Some(Quaternion::new(w, x, y, z))
}

/// Decode a vector stored as 3x int16 LE starting at `offset`, scaled by `divisor`.
pub fn decode_vector(buf: &[u8], offset: usize, divisor: f32) -> Option<Vector3> {
    let x = read_i16(buf, offset)? as f32 / divisor;
    let y = read_i16(buf, offset + 2)? as f32 / divisor;
    let z = read_i16(buf, offset + 4)? as f32 / divisor;
    Some(Vector3::new(x, y, z))
}

/// Decode a finger flex value (uint8 / 255). Returns [`FINGER_INVALID`] when
/// the byte is missing.
pub fn decode_finger(buf: &[u8], offset: usize) -> f32 {
    match buf.get(offset) {
        Some(&raw) => raw as f32 / FINGER_DIVISOR,
        None => FINGER_INVALID,
    }
}

/// Decode the quaternion and acceleration of a motion report.
///
/// Motion report layout:
/// - `[0..8]`: quaternion [w, x, y, z] as 4x int16 LE (scaled by 2^-14)
/// - `[8..14]`: acceleration [x, y, z] as 3x int16 LE (scaled by 2^-14, in g)
/// - `[14..19]`: finger flex as 5x uint8 (scaled by 1/255), wire order thumb..pinky
///   for a right hand, pinky..thumb for a left hand
pub fn decode_motion(buf: &[u8]) -> Option<MotionSample> {
    Some(MotionSample {
        quaternion: decode_quaternion(buf, QUAT_OFFSET)?,
        acceleration: decode_vector(buf, ACCEL_OFFSET, ACCEL_DIVISOR)?,
    })
}

/// Decode the magnetometer vector of a compass report (3x int16 LE, scaled by 1/32).
pub fn decode_compass(buf: &[u8]) -> Option<Vector3> {
    decode_vector(buf, COMPASS_OFFSET, COMPASS_DIVISOR)
}

/// Encode a vibration power in [0, 1] as the rumble output report (uint16 LE).
/// Out-of-range values are clipped.
pub fn encode_rumble(power: f32) -> [u8; 2] {
    let power = if power.is_nan() { 0.0 } else { power.clamp(0.0, 1.0) };
    let value = (power * u16::MAX as f32) as u16;
    value.to_le_bytes()
}

/// Encode the flags byte written to the feature report.
pub fn encode_flags(flags: GloveFlags) -> [u8; 1] {
    [flags.bits()]
}

/// Parsed value of a HID Report Reference descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportReference {
    pub report_id: u8,
    pub report_type: u8,
}

impl ReportReference {
    /// Map the reference to the glove report it identifies.
    pub fn role(&self) -> Option<ReportRole> {
        match (self.report_type, self.report_id) {
            (REPORT_TYPE_INPUT, MOTION_REPORT_ID) => Some(ReportRole::Motion),
            (REPORT_TYPE_INPUT, COMPASS_REPORT_ID) => Some(ReportRole::Compass),
            (REPORT_TYPE_FEATURE, _) => Some(ReportRole::Feature),
            (REPORT_TYPE_OUTPUT, _) => Some(ReportRole::Rumble),
            _ => None,
        }
    }
}

/// Parse a Report Reference descriptor value: `[report_id, report_type]`.
pub fn parse_report_reference(value: &[u8]) -> Option<ReportReference> {
    match value {
        [report_id, report_type, ..] => Some(ReportReference {
            report_id: *report_id,
            report_type: *report_type,
        }),
        _ => None,
    }
}
