use crate::format::StateRecord;

/// Serialize a state snapshot to its flat binary form.
pub fn save(record: &StateRecord) -> Vec<u8> {
    bytemuck::bytes_of(record).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::STATE_RECORD_SIZE;
    use bytemuck::Zeroable;
    use cirrus_core::AtmosphereParameters;

    #[test]
    fn test_save_length() {
        let mut record = StateRecord::zeroed();
        record.params = AtmosphereParameters::earth();
        let bytes = save(&record);
        assert_eq!(bytes.len(), STATE_RECORD_SIZE);
    }

    #[test]
    fn test_save_starts_with_live_parameters() {
        let mut record = StateRecord::zeroed();
        record.params = AtmosphereParameters::earth();
        let bytes = save(&record);
        assert_eq!(&bytes[..216], record.params.as_bytes());
    }
}
