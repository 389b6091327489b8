//! Audio input device enumeration. Pass-through over cpal — selection policy
//! belongs to the caller.

use serde::{Deserialize, Serialize};

/// Metadata about an audio input device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default input device.
    pub is_default: bool,
}

/// List all available audio input devices, default first.
///
/// Returns an empty `Vec` if cpal is unavailable or no devices exist.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    match host.input_devices() {
        Ok(devices) => {
            let mut list = devices
                .enumerate()
                .map(|(idx, device)| {
                    let name = device
                        .name()
                        .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                    let is_default = default_name.as_deref() == Some(name.as_str());
                    DeviceInfo { name, is_default }
                })
                .collect::<Vec<_>>();
            list.sort_by_key(|d| (!d.is_default, d.name.to_ascii_lowercase()));
            list
        }
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            match default_name {
                Some(name) => vec![DeviceInfo {
                    name,
                    is_default: true,
                }],
                None => vec![],
            }
        }
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}
