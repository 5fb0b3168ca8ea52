//! Lookup-table extents.

/// Integer extents for each LUT axis. Fixed for the process lifetime.
///
/// The 3-D scattering texture extents are always derived from the four base
/// sizes and never stored, so the two can not drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LutDimensions {
    pub transmittance_width: u32,
    pub transmittance_height: u32,

    pub irradiance_width: u32,
    pub irradiance_height: u32,

    pub scattering_r_size: u32,
    pub scattering_mu_size: u32,
    pub scattering_mu_s_size: u32,
    pub scattering_nu_size: u32,
}

impl Default for LutDimensions {
    fn default() -> Self {
        Self {
            transmittance_width: 256,
            transmittance_height: 64,

            irradiance_width: 64,
            irradiance_height: 16,

            scattering_r_size: 32,
            scattering_mu_size: 128,
            scattering_mu_s_size: 32,
            scattering_nu_size: 8,
        }
    }
}

impl LutDimensions {
    /// Width of the flattened scattering volume: the nu axis is tiled along
    /// the mu_s axis.
    pub fn scattering_width(&self) -> u32 {
        self.scattering_nu_size * self.scattering_mu_s_size
    }

    pub fn scattering_height(&self) -> u32 {
        self.scattering_mu_size
    }

    pub fn scattering_depth(&self) -> u32 {
        self.scattering_r_size
    }

    pub fn transmittance_texel_count(&self) -> u64 {
        self.transmittance_width as u64 * self.transmittance_height as u64
    }

    pub fn irradiance_texel_count(&self) -> u64 {
        self.irradiance_width as u64 * self.irradiance_height as u64
    }

    pub fn scattering_texel_count(&self) -> u64 {
        self.scattering_width() as u64
            * self.scattering_height() as u64
            * self.scattering_depth() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_extents() {
        let dims = LutDimensions::default();
        assert_eq!(dims.scattering_width(), 8 * 32);
        assert_eq!(dims.scattering_height(), 128);
        assert_eq!(dims.scattering_depth(), 32);
        assert_eq!(dims.scattering_texel_count(), 256 * 128 * 32);
    }

    #[test]
    fn test_derived_extents_track_base_sizes() {
        let mut dims = LutDimensions::default();
        dims.scattering_nu_size = 4;
        dims.scattering_mu_s_size = 16;
        assert_eq!(dims.scattering_width(), 64);
    }
}
