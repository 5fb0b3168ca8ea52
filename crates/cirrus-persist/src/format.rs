//! On-disk state snapshot layout.

use cirrus_core::AtmosphereParameters;

/// Flat, fixed-size state snapshot: a sequence of records in a fixed field
/// order with no magic bytes and no version tag. The layout is the
/// serialization contract; any field change breaks old snapshots by design.
///
/// 512 bytes, `repr(C)` for byte-level serialization.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StateRecord {
    /// Live atmosphere parameters.
    pub params: AtmosphereParameters,
    /// Snapshot the cached LUTs were produced from.
    pub cached_params: AtmosphereParameters,

    pub camera_position: [f32; 3],
    pub camera_position_final: [f32; 3],
    pub view_direction: [f32; 3],
    pub sun_direction: [f32; 3],

    pub sun_illuminance_scale: f32,
    pub view_pitch: f32,
    pub view_yaw: f32,
    pub camera_height: f32,
    pub camera_forward: f32,
    pub sun_pitch: f32,
    pub sun_yaw: f32,

    pub scattering_orders: i32,
}

/// Exact byte length of a serialized snapshot.
pub const STATE_RECORD_SIZE: usize = std::mem::size_of::<StateRecord>();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_size() {
        // 2 parameter blocks of 216 bytes + 4 vectors + 7 scalars + 1 int.
        assert_eq!(STATE_RECORD_SIZE, 2 * 216 + 4 * 12 + 7 * 4 + 4);
    }
}
