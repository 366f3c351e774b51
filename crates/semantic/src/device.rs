//! Compute device selection.
//!
//! A device is picked by walking the configured preference list and taking the
//! first entry that the host reports as present *and* the chosen backend can
//! actually execute on. CPU is always available and is the final fallback.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Compute devices an embedding backend may run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Apple Metal Performance Shaders.
    Mps,
    /// NVIDIA CUDA.
    Cuda,
    Cpu,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Mps => "mps",
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default preference order: accelerators first, CPU last.
pub fn default_preference() -> Vec<Device> {
    vec![Device::Mps, Device::Cuda, Device::Cpu]
}

/// Reports whether a device is present on the host.
pub trait DeviceProbe {
    fn is_available(&self, device: Device) -> bool;
}

/// Probe backed by the running host.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostProbe;

impl DeviceProbe for HostProbe {
    fn is_available(&self, device: Device) -> bool {
        match device {
            Device::Cpu => true,
            Device::Mps => cfg!(all(target_os = "macos", target_arch = "aarch64")),
            Device::Cuda => Path::new("/proc/driver/nvidia/version").exists(),
        }
    }
}

/// Pick the first device in `preference` that is both present and supported.
///
/// Falls back to [`Device::Cpu`] when nothing in the list qualifies.
pub fn select_device(
    preference: &[Device],
    probe: &dyn DeviceProbe,
    supported: &[Device],
) -> Device {
    for &device in preference {
        if !probe.is_available(device) {
            debug!(device = %device, "device not present on host");
            continue;
        }
        if !supported.contains(&device) {
            debug!(device = %device, "device present but not supported by backend");
            continue;
        }
        info!(device = %device, "compute device selected");
        return device;
    }
    info!(device = %Device::Cpu, "no preferred device usable, falling back");
    Device::Cpu
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe(Vec<Device>);

    impl DeviceProbe for FixedProbe {
        fn is_available(&self, device: Device) -> bool {
            self.0.contains(&device)
        }
    }

    const ALL: &[Device] = &[Device::Mps, Device::Cuda, Device::Cpu];

    #[test]
    fn first_available_wins() {
        let probe = FixedProbe(vec![Device::Cuda, Device::Mps, Device::Cpu]);
        assert_eq!(select_device(&default_preference(), &probe, ALL), Device::Mps);
    }

    #[test]
    fn skips_missing_accelerator() {
        let probe = FixedProbe(vec![Device::Cuda, Device::Cpu]);
        assert_eq!(select_device(&default_preference(), &probe, ALL), Device::Cuda);
    }

    #[test]
    fn skips_unsupported_accelerator() {
        let probe = FixedProbe(vec![Device::Mps, Device::Cuda, Device::Cpu]);
        assert_eq!(
            select_device(&default_preference(), &probe, &[Device::Cpu]),
            Device::Cpu
        );
    }

    #[test]
    fn empty_preference_falls_back_to_cpu() {
        let probe = FixedProbe(vec![Device::Cuda]);
        assert_eq!(select_device(&[], &probe, ALL), Device::Cpu);
    }

    #[test]
    fn host_probe_always_has_cpu() {
        assert!(HostProbe.is_available(Device::Cpu));
    }

    #[test]
    fn device_serde_lowercase() {
        let json = serde_json::to_string(&default_preference()).unwrap();
        assert_eq!(json, r#"["mps","cuda","cpu"]"#);
        let back: Vec<Device> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, default_preference());
    }
}
