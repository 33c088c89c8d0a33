use candle_core::Device;

use voidx_core::{Error, Result};

/// Where the BGE-M3 model runs. `auto` tries Metal (when built with the
/// `metal` feature) and falls back to the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePreference {
    Auto,
    Cpu,
    Metal,
}

impl DevicePreference {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "metal" | "mps" => Ok(Self::Metal),
            other => Err(Error::InvalidConfig(format!("unknown embedding device '{other}'"))),
        }
    }
}

pub fn select_device(pref: DevicePreference) -> Result<Device> {
    match pref {
        DevicePreference::Cpu => Ok(Device::Cpu),
        DevicePreference::Metal => metal().ok_or_else(|| {
            let msg = "Metal requested but unavailable (build with the `metal` feature)";
            Error::InvalidConfig(msg.into())
        }),
        DevicePreference::Auto => Ok(metal().unwrap_or_else(|| {
            tracing::info!("embedding device: CPU");
            Device::Cpu
        })),
    }
}

#[cfg(feature = "metal")]
fn metal() -> Option<Device> {
    let dev = Device::new_metal(0).ok()?;
    tracing::info!("embedding device: Metal (MPS)");
    Some(dev)
}

#[cfg(not(feature = "metal"))]
fn metal() -> Option<Device> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_preferences() {
        assert_eq!(DevicePreference::parse("AUTO").unwrap(), DevicePreference::Auto);
        assert_eq!(DevicePreference::parse("").unwrap(), DevicePreference::Auto);
        assert_eq!(DevicePreference::parse(" cpu ").unwrap(), DevicePreference::Cpu);
        assert_eq!(DevicePreference::parse("mps").unwrap(), DevicePreference::Metal);
        assert!(DevicePreference::parse("cuda").is_err());
    }

    #[test]
    fn cpu_is_always_available() {
        assert!(select_device(DevicePreference::Cpu).unwrap().is_cpu());
        assert!(select_device(DevicePreference::Auto).is_ok());
    }
}
