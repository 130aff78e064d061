/// Sensor-fusion collaborator merging acceleration, compass and quaternion
/// samples into a corrected orientation.
///
/// Each session owns one instance. It is called synchronously, never
/// reentrantly, and dropped exactly once when the session is rejected or
/// closed, so implementations release native resources in `Drop`.
pub trait SensorFusion {
    /// Returns the fused quaternion in `[w, x, y, z]` order.
    fn fuse(&mut self, accel: [f32; 3], compass: [f32; 3], quat: [f32; 4]) -> [f32; 4];
}

/// Fusion that returns the input quaternion unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughFusion;

impl SensorFusion for PassThroughFusion {
    fn fuse(&mut self, _accel: [f32; 3], _compass: [f32; 3], quat: [f32; 4]) -> [f32; 4] {
        quat
    }
}
