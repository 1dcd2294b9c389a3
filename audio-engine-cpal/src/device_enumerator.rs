//! Audio device enumeration via cpal.
//!
//! Lists input (microphone) and output (speaker/headphone) devices of the
//! default host and picks the devices a session should open, preferring a
//! built-in microphone when asked to.

use cpal::traits::{DeviceTrait, HostTrait};

use audio_engine_core::models::config::SessionOptions;
use audio_engine_core::models::error::EngineError;

/// Name fragments identifying a device as built into the machine.
const BUILTIN_MARKERS: [&str; 4] = ["built-in", "builtin", "internal", "macbook"];

/// A device as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub is_builtin: bool,
    pub channels: u16,
    pub sample_rate: u32,
}

/// Audio device enumerator over the default cpal host.
pub struct DeviceEnumerator {
    host: cpal::Host,
}

impl DeviceEnumerator {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// List input devices.
    pub fn list_input_devices(&self) -> Result<Vec<DeviceInfo>, EngineError> {
        let default_name = self.host.default_input_device().and_then(|d| d.name().ok());
        let devices = self
            .host
            .input_devices()
            .map_err(|e| EngineError::HardwareUnavailable(format!("failed to enumerate inputs: {}", e)))?;

        Ok(devices
            .enumerate()
            .map(|(i, device)| {
                let name = device.name().unwrap_or_else(|_| format!("Input {}", i));
                let (channels, sample_rate) = device
                    .default_input_config()
                    .map(|c| (c.channels(), c.sample_rate().0))
                    .unwrap_or((0, 0));
                describe(name, default_name.as_deref(), channels, sample_rate)
            })
            .collect())
    }

    /// List output devices.
    pub fn list_output_devices(&self) -> Result<Vec<DeviceInfo>, EngineError> {
        let default_name = self.host.default_output_device().and_then(|d| d.name().ok());
        let devices = self
            .host
            .output_devices()
            .map_err(|e| EngineError::HardwareUnavailable(format!("failed to enumerate outputs: {}", e)))?;

        Ok(devices
            .enumerate()
            .map(|(i, device)| {
                let name = device.name().unwrap_or_else(|_| format!("Output {}", i));
                let (channels, sample_rate) = device
                    .default_output_config()
                    .map(|c| (c.channels(), c.sample_rate().0))
                    .unwrap_or((0, 0));
                describe(name, default_name.as_deref(), channels, sample_rate)
            })
            .collect())
    }

    /// Resolve the input device for `options`.
    pub fn select_input(&self, options: &SessionOptions) -> Result<cpal::Device, EngineError> {
        let devices: Vec<cpal::Device> = self
            .host
            .input_devices()
            .map_err(|e| EngineError::HardwareUnavailable(format!("failed to enumerate inputs: {}", e)))?
            .collect();
        let names: Vec<String> = devices
            .iter()
            .map(|d| d.name().unwrap_or_default())
            .collect();
        let default_name = self.host.default_input_device().and_then(|d| d.name().ok());

        let index = choose_input(&names, default_name.as_deref(), options).ok_or_else(|| {
            EngineError::HardwareUnavailable(match &options.input_device {
                Some(name) => format!("input device not found: {}", name),
                None => "no input device available".into(),
            })
        })?;

        log::info!("Selected input device: {}", names[index]);
        devices
            .into_iter()
            .nth(index)
            .ok_or_else(|| EngineError::HardwareUnavailable("input device disappeared".into()))
    }

    /// Resolve the output device for `options`.
    pub fn select_output(&self, options: &SessionOptions) -> Result<cpal::Device, EngineError> {
        let device = match &options.output_device {
            Some(name) => self
                .host
                .output_devices()
                .map_err(|e| EngineError::HardwareUnavailable(format!("failed to enumerate outputs: {}", e)))?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| EngineError::HardwareUnavailable(format!("output device not found: {}", name)))?,
            None => self
                .host
                .default_output_device()
                .ok_or_else(|| EngineError::HardwareUnavailable("no output device available".into()))?,
        };

        log::info!(
            "Selected output device: {}",
            device.name().unwrap_or_else(|_| "unknown".into())
        );
        Ok(device)
    }
}

impl Default for DeviceEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a device name looks like built-in hardware.
pub fn is_builtin_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    BUILTIN_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Pick an input device index from `names`.
///
/// An explicitly named device must match exactly. Otherwise a built-in
/// microphone wins when preferred, then the host default, then the first
/// device.
pub fn choose_input(names: &[String], default_name: Option<&str>, options: &SessionOptions) -> Option<usize> {
    if let Some(wanted) = &options.input_device {
        return names.iter().position(|n| n == wanted);
    }
    if options.prefer_builtin_mic {
        if let Some(i) = names.iter().position(|n| is_builtin_name(n)) {
            return Some(i);
        }
    }
    if let Some(default_name) = default_name {
        if let Some(i) = names.iter().position(|n| n == default_name) {
            return Some(i);
        }
    }
    if names.is_empty() {
        None
    } else {
        Some(0)
    }
}

fn describe(name: String, default_name: Option<&str>, channels: u16, sample_rate: u32) -> DeviceInfo {
    DeviceInfo {
        is_default: default_name == Some(name.as_str()),
        is_builtin: is_builtin_name(&name),
        name,
        channels,
        sample_rate,
    }
}
