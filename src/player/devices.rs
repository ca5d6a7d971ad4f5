//! Output device enumeration and selection.
//!
//! Indices follow the host's enumeration order and are only meaningful
//! within a session, since the OS may reorder them on hotplug. Names are the
//! stable key for change detection and config persistence, which is why
//! selection-by-name re-resolves to a fresh index at play time.

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::{Error, Result};

/// An output-capable audio device as seen at one enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDevice {
    /// Position in the host's enumeration order
    pub index: usize,
    /// Display name
    pub name: String,
    /// Whether the OS currently reports this as the default output
    pub is_default: bool,
}

/// List every output-capable device in platform enumeration order.
pub fn list_output_devices() -> Result<Vec<OutputDevice>> {
    let host = cpal::default_host();
    let default_name = host
        .default_output_device()
        .and_then(|d| d.name().ok());

    let devices = host
        .output_devices()
        .map_err(|e| Error::device(e.to_string()))?;

    Ok(devices
        .enumerate()
        .filter_map(|(index, device)| {
            let name = device.name().ok()?;
            let is_default = default_name.as_deref() == Some(name.as_str());
            Some(OutputDevice {
                index,
                name,
                is_default,
            })
        })
        .collect())
}

/// Index of the OS-reported default output device, if one exists.
pub fn default_output_index() -> Result<Option<usize>> {
    Ok(list_output_devices()?
        .into_iter()
        .find(|d| d.is_default)
        .map(|d| d.index))
}

/// Resolve a device name to its current index.
///
/// Returns `Ok(None)` when no device carries that name right now.
pub fn find_by_name(name: &str) -> Result<Option<usize>> {
    Ok(list_output_devices()?
        .into_iter()
        .find(|d| d.name == name)
        .map(|d| d.index))
}

/// Open a handle to the device at `index`, or the system default when `None`.
pub(crate) fn resolve(index: Option<usize>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match index {
        None => host
            .default_output_device()
            .ok_or_else(|| Error::device("no default output device")),
        Some(index) => {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::device(e.to_string()))?;
            devices
                .nth(index)
                .ok_or_else(|| Error::device(format!("no output device at index {index}")))
        }
    }
}
