//! Scan element and buffer control for a located device.

use crate::errors::{IoResult, ParseError};
use crate::kinds::{OutputField, SampleShape};
use crate::locator::DeviceDescriptor;
use crate::sysfs;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default capture buffer length written to `buffer/length`
pub const DEFAULT_BUFFER_LENGTH: usize = 256;

/// Storage width in bytes for a scan element type tag, `None` if unsupported.
pub fn byte_width_for(tag: &str) -> Option<usize> {
    match tag {
        "le:s16/16>>0" => Some(2),
        "le:s32/32>>0" => Some(4),
        "le:s64/64>>0" => Some(8),
        _ => None,
    }
}

/// Turns channel capture on and off
#[derive(Debug, Clone)]
pub struct ChannelEnabler {
    buffer_length: usize,
}

impl Default for ChannelEnabler {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_LENGTH)
    }
}

impl ChannelEnabler {
    pub fn new(buffer_length: usize) -> Self {
        Self { buffer_length }
    }

    /// Toggle every scan element of `device`. Returns the number of channels toggled.
    ///
    /// Enabling records each channel's storage width in
    /// `device.channel_byte_width`, writes the buffer length and finally
    /// enables the buffer. Disabling only clears the enable flags.
    pub fn enable(&self, device: &mut DeviceDescriptor, turn_on: bool) -> IoResult<usize> {
        let scan_dir = device.scan_elements_path();
        if !scan_dir.is_dir() {
            warn!("[enabler] {} does not exist, nothing to toggle", scan_dir.display());
            return Ok(0);
        }

        let enable_path = device.buffer_path().join("enable");
        let length_path = device.buffer_path().join("length");
        let flags = enable_flags(&scan_dir);

        if turn_on {
            device.channel_byte_width.clear();
            for flag in &flags {
                if let Some((index, width)) = describe_channel(flag) {
                    device.channel_byte_width.insert(index, width);
                }
                sysfs::write_value(flag, 1)?;
            }
            sysfs::write_value(&length_path, self.buffer_length)?;
            sysfs::write_value(&enable_path, 1)?;
        } else {
            sysfs::write_value(&enable_path, 0)?;
            for flag in &flags {
                sysfs::write_value(flag, 0)?;
            }
        }

        debug!(
            "[enabler] {} {} channel(s) of {}",
            if turn_on { "enabled" } else { "disabled" },
            flags.len(),
            device.base_path.display()
        );
        Ok(flags.len())
    }
}

/// All `*_en` files of a scan element directory, sorted by name.
fn enable_flags(scan_dir: &Path) -> Vec<PathBuf> {
    let mut flags: Vec<PathBuf> = match fs::read_dir(scan_dir) {
        Ok(entries) => entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with("_en"))
            })
            .collect(),
        Err(e) => {
            warn!("[enabler] cannot list {}: {}", scan_dir.display(), e);
            Vec::new()
        }
    };
    flags.sort();
    flags
}

/// Scan index and byte width of the channel owning an `_en` flag.
/// An unsupported type tag yields width 0.
fn describe_channel(flag: &Path) -> Option<(usize, usize)> {
    let flag_name = flag.to_string_lossy();
    let base = flag_name.strip_suffix("_en")?;

    let index_path = PathBuf::from(format!("{}_index", base));
    let index = match sysfs::read_line(&index_path) {
        Ok(value) => match value.trim().parse::<usize>() {
            Ok(index) => index,
            Err(_) => {
                let err = ParseError::NotANumber {
                    name: index_path.display().to_string(),
                    value,
                };
                warn!("[enabler] {}", err);
                return None;
            }
        },
        Err(e) => {
            warn!("[enabler] {}", e);
            return None;
        }
    };

    let type_path = PathBuf::from(format!("{}_type", base));
    let tag = sysfs::read_line(&type_path).unwrap_or_else(|e| {
        warn!("[enabler] {}", e);
        String::new()
    });
    let width = byte_width_for(&tag).unwrap_or_else(|| {
        let err = ParseError::UnknownTypeTag { path: type_path, tag };
        warn!("[enabler] channel {} excluded from decoding: {}", index, err);
        0
    });

    Some((index, width))
}

/// Stable identity of one channel across devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelKey {
    pub device: u32,
    pub channel: usize,
}

impl ChannelKey {
    pub fn new(device: u32, channel: usize) -> Self {
        Self { device, channel }
    }
}

/// Where a channel's value goes and how it is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelBinding {
    pub field: OutputField,
    /// `None` when the device exposes no scan element for the channel
    pub byte_width: Option<usize>,
}

impl ChannelBinding {
    /// Channels whose type tag was rejected contribute nothing.
    pub fn is_excluded(&self) -> bool {
        self.byte_width == Some(0)
    }
}

/// Bindings of every consumed channel of a device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelBindings {
    bindings: BTreeMap<ChannelKey, ChannelBinding>,
}

impl ChannelBindings {
    pub fn build(device: &DeviceDescriptor, shape: SampleShape) -> Self {
        let bindings = (0..device.channel_count())
            .filter_map(|channel| {
                let field = OutputField::for_channel(shape, channel)?;
                let binding = ChannelBinding {
                    field,
                    byte_width: device.channel_byte_width.get(&channel).copied(),
                };
                Some((ChannelKey::new(device.index, channel), binding))
            })
            .collect();
        Self { bindings }
    }

    pub fn get(&self, key: ChannelKey) -> Option<&ChannelBinding> {
        self.bindings.get(&key)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
