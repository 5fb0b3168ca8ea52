use crate::error::PersistError;
use crate::format::{StateRecord, STATE_RECORD_SIZE};

/// Restore a state snapshot from its flat binary form.
///
/// The format carries no version tag, so the only corruption defense is the
/// exact length check. After a successful load the caller must force LUT
/// regeneration and UI-state refresh; the restored cached-parameter block is
/// informational only and never re-validates stale tables.
pub fn load(bytes: &[u8]) -> Result<StateRecord, PersistError> {
    if bytes.len() != STATE_RECORD_SIZE {
        return Err(PersistError::WrongLength {
            expected: STATE_RECORD_SIZE,
            actual: bytes.len(),
        });
    }
    let record: StateRecord = *bytemuck::from_bytes(bytes);
    log::debug!(
        "restored state snapshot ({} scattering orders)",
        record.scattering_orders
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::save::save;
    use bytemuck::Zeroable;
    use cirrus_core::AtmosphereParameters;

    fn sample_record() -> StateRecord {
        let mut record = StateRecord::zeroed();
        record.params = AtmosphereParameters::earth();
        record.params.mie_phase_function_g = 0.76;
        record.cached_params = AtmosphereParameters::earth();
        record.camera_position = [0.0, 0.0, 0.5];
        record.view_direction = [0.0, 1.0, 0.0];
        record.sun_direction = [0.0, 0.8, 0.6];
        record.sun_illuminance_scale = 2.5;
        record.view_pitch = -10.0;
        record.view_yaw = 45.0;
        record.camera_height = 0.5;
        record.camera_forward = -1.0;
        record.sun_pitch = 0.45;
        record.sun_yaw = 0.1;
        record.scattering_orders = 6;
        record
    }

    #[test]
    fn test_save_load_roundtrip() {
        let record = sample_record();
        let bytes = save(&record);
        let restored = load(&bytes).expect("load should succeed");

        assert_eq!(restored.params, record.params);
        assert_eq!(restored.cached_params, record.cached_params);
        assert_eq!(restored.sun_direction, record.sun_direction);
        assert_eq!(restored.sun_illuminance_scale, 2.5);
        assert_eq!(restored.scattering_orders, 6);
    }

    #[test]
    fn test_truncated_snapshot_rejected() {
        let bytes = save(&sample_record());
        let result = load(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(PersistError::WrongLength { .. })));
    }

    #[test]
    fn test_oversized_snapshot_rejected() {
        let mut bytes = save(&sample_record());
        bytes.push(0);
        let result = load(&bytes);
        assert!(matches!(result, Err(PersistError::WrongLength { .. })));
    }
}
