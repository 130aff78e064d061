use crate::types::{Quaternion, Vector3};

/// Convert a quaternion to Euler angles [roll, pitch, yaw] in radians.
///
///   roll  = atan2(2(wx + yz), 1 - 2(x² + y²))
///   pitch = asin(2(wy - zx))
///   yaw   = atan2(2(wz + xy), 1 - 2(y² + z²))
///
/// The asin argument is clamped to [-1, 1], so inputs at or past gimbal lock
/// give pitch = ±π/2 instead of NaN.
pub fn to_euler(q: Quaternion) -> Vector3 {
    let Quaternion { w, x, y, z } = q;
    let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
    let pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0).asin();
    let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));
    Vector3::new(roll, pitch, yaw)
}

/// Gravity direction in the sensor frame implied by `q`.
pub fn gravity(q: Quaternion) -> Vector3 {
    let Quaternion { w, x, y, z } = q;
    Vector3::new(
        2.0 * (x * z - w * y),
        2.0 * (w * x + y * z),
        w * w - x * x - y * y + z * z,
    )
}

/// Remove gravity from a raw acceleration sample.
pub fn linear_acceleration(raw: Vector3, gravity: Vector3) -> Vector3 {
    raw - gravity
}

impl Quaternion {
    pub fn norm(self) -> f32 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit quaternion in the same direction. A zero quaternion is returned unchanged.
    pub fn normalized(self) -> Quaternion {
        let n = self.norm();
        if n == 0.0 {
            return self;
        }
        Quaternion::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    pub fn to_euler(self) -> Vector3 {
        to_euler(self)
    }

    pub fn gravity(self) -> Vector3 {
        gravity(self)
    }
}

/// Hamilton product.
impl std::ops::Mul for Quaternion {
    type Output = Quaternion;

    fn mul(self, r: Quaternion) -> Quaternion {
        let q = self;
        Quaternion::new(
            q.w * r.w - q.x * r.x - q.y * r.y - q.z * r.z,
            q.w * r.x + q.x * r.w + q.y * r.z - q.z * r.y,
            q.w * r.y - q.x * r.z + q.y * r.w + q.z * r.x,
            q.w * r.z + q.x * r.y - q.y * r.x + q.z * r.w,
        )
    }
}
