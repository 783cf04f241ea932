//! Execution device selection and precision policy

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Where a model executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    Cpu,
    Accelerator { index: u32 },
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Accelerator { index } => write!(f, "accelerator:{index}"),
        }
    }
}

impl Device {
    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Accelerator { .. })
    }
}

/// Caller-facing device request, resolved against loader capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePreference {
    /// Use an accelerator when the loader reports one, CPU otherwise.
    Auto,
    Cpu,
    Accelerator(u32),
}

impl DevicePreference {
    /// Resolve the preference into a concrete device.
    pub fn resolve(self, accelerator_available: bool) -> Device {
        match self {
            DevicePreference::Auto if accelerator_available => Device::Accelerator { index: 0 },
            DevicePreference::Auto => Device::Cpu,
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Accelerator(index) => Device::Accelerator { index },
        }
    }
}

/// Numeric precision the model weights are loaded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    Full,
    Half,
}

/// Optional weight quantization, only meaningful on an accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantization {
    Int8,
    Int4,
}

/// Complete placement instruction handed to a [`crate::ModelLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSpec {
    pub device: Device,
    pub precision: Precision,
    pub quantization: Option<Quantization>,
}

impl DeviceSpec {
    /// Apply the placement policy: full precision on CPU, reduced precision
    /// (plus any requested quantization) on an accelerator.
    pub fn for_device(device: Device, quantization: Option<Quantization>) -> Self {
        match device {
            Device::Cpu => Self { device, precision: Precision::Full, quantization: None },
            Device::Accelerator { .. } => {
                Self { device, precision: Precision::Half, quantization }
            }
        }
    }
}

/// Ask the device runtime to release cached allocations.
///
/// A no-op on CPU. Accelerator backends hook their cache-drain call in
/// here; the unload path calls this unconditionally and never fails on it.
pub fn release_cached_memory(device: &Device) {
    if device.is_accelerator() {
        debug!(device = %device, "releasing cached accelerator memory");
    }
}
