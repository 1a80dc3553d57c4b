//! Output device enumeration and lookup
//!
//! Devices are listed from every available cpal host, so on Linux both the
//! JACK server and the individual ALSA devices show up.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{OutputError, OutputResult};

/// Display name for a host
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

fn host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|id| host_name(*id).eq_ignore_ascii_case(name))
        .and_then(|id| cpal::host_from_id(id).ok())
}

/// An output device as shown by `--list-devices`
#[derive(Debug, Clone)]
pub struct OutputDevice {
    pub id: DeviceId,
    pub is_default: bool,
    /// Whether some supported config covers `sample_rate` in stereo
    pub supports_rate: bool,
    pub max_channels: u16,
}

impl std::fmt::Display for OutputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id.display_label())?;
        if self.is_default {
            write!(f, " (default)")?;
        }
        if !self.supports_rate {
            write!(f, " [rate unsupported]")?;
        }
        Ok(())
    }
}

/// List output devices from all hosts, defaults first
pub fn list_output_devices(sample_rate: u32) -> OutputResult<Vec<OutputDevice>> {
    let mut devices = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(host) => host,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_label = host_name(host_id);
        let default_name = host.default_output_device().and_then(|d| d.name().ok());

        let outputs = match host.output_devices() {
            Ok(outputs) => outputs,
            Err(e) => {
                log::debug!("Could not enumerate devices for {:?}: {}", host_id, e);
                continue;
            }
        };

        for device in outputs {
            let Ok(name) = device.name() else {
                continue;
            };
            let Ok(configs) = device.supported_output_configs() else {
                continue;
            };

            let mut max_channels = 0;
            let mut supports_rate = false;
            for config in configs {
                max_channels = max_channels.max(config.channels());
                supports_rate |= config.channels() >= 2
                    && (config.min_sample_rate().0..=config.max_sample_rate().0)
                        .contains(&sample_rate);
            }
            if max_channels == 0 {
                continue;
            }

            devices.push(OutputDevice {
                is_default: default_name.as_deref() == Some(name.as_str()),
                id: DeviceId::with_host(&name, &host_label),
                supports_rate,
                max_channels,
            });
        }
    }

    if devices.is_empty() {
        return Err(OutputError::NoDevices);
    }

    devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.id.host.cmp(&b.id.host))
            .then_with(|| a.id.name.cmp(&b.id.name))
    });
    Ok(devices)
}

/// Find a device by id, searching every host when the id names none
pub fn find_device(id: &DeviceId) -> OutputResult<cpal::Device> {
    let matches = |d: &cpal::Device| d.name().ok().as_deref() == Some(id.name.as_str());

    if let Some(host) = id.host.as_deref().and_then(host_by_name) {
        return host
            .output_devices()
            .map_err(|e| OutputError::ConfigError(e.to_string()))?
            .find(matches)
            .ok_or_else(|| OutputError::DeviceNotFound(id.display_label()));
    }

    cpal::available_hosts()
        .into_iter()
        .filter_map(|host_id| cpal::host_from_id(host_id).ok())
        .filter_map(|host| host.output_devices().ok())
        .flatten()
        .find(matches)
        .ok_or_else(|| OutputError::DeviceNotFound(id.display_label()))
}

/// Default output device of the default host
pub fn default_device() -> OutputResult<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or(OutputError::NoDefaultDevice)
}
