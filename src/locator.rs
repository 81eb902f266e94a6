//! Discovery of IIO devices and their calibration attributes.
//!
//! Attribute names are classified by suffix rather than position, since
//! vendors order `*_raw`, `*_scale` and `*_offset` files differently. Only
//! channel numbering depends on order: the n-th `*_raw` attribute found is
//! channel n.

use crate::attributes::AttributeStore;
use crate::errors::{ConfigError, LocateError, LocateResult};
use crate::samples;
use crate::sysfs;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, trace, warn};

/// Default location of IIO devices in sysfs
pub const IIO_SYSFS_BASE: &str = "/sys/bus/iio/devices";

/// Attribute holding the kernel's declared device type
const NAME_ATTRIBUTE: &str = "name";

/// One device as reported by the registry. Only the declared type name is
/// read up front; other attributes may block on hardware and are loaded for
/// the selected device alone.
#[derive(Debug, Clone)]
pub struct EnumeratedDevice {
    pub syspath: PathBuf,
    /// Kernel device number, `N` in `iio:deviceN`
    pub index: u32,
    pub name: Option<String>,
}

/// Source of IIO devices on the host
pub trait DeviceRegistry: Send + Sync {
    fn enumerate(&self) -> LocateResult<Vec<EnumeratedDevice>>;

    /// Every readable top-level attribute of one device, in name order.
    fn attributes(&self, device: &EnumeratedDevice) -> AttributeStore;
}

/// Registry backed by the sysfs IIO bus directory
#[derive(Debug, Clone)]
pub struct SysfsRegistry {
    root: PathBuf,
}

impl SysfsRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_attributes(dir: &Path) -> AttributeStore {
        let mut names: Vec<String> = match fs::read_dir(dir) {
            Ok(entries) => entries
                .flatten()
                .filter(|entry| entry.path().is_file())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(e) => {
                warn!("[locator] cannot list attributes of {}: {}", dir.display(), e);
                return AttributeStore::default();
            }
        };
        names.sort();

        names
            .into_iter()
            .filter_map(|name| match sysfs::read_line(&dir.join(&name)) {
                Ok(value) => Some((name, value)),
                Err(e) => {
                    // Write-only and hardware-backed files may refuse reads
                    trace!("[locator] skipping attribute: {}", e);
                    None
                }
            })
            .collect()
    }
}

impl Default for SysfsRegistry {
    fn default() -> Self {
        Self::new(IIO_SYSFS_BASE)
    }
}

impl DeviceRegistry for SysfsRegistry {
    fn enumerate(&self) -> LocateResult<Vec<EnumeratedDevice>> {
        let entries = fs::read_dir(&self.root).map_err(|source| LocateError::EnumerationFailed {
            root: self.root.clone(),
            source,
        })?;

        let mut dirs: Vec<(u32, String, PathBuf)> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .map(|entry| {
                let dir_name = entry.file_name().to_string_lossy().into_owned();
                (parse_device_index(&dir_name).unwrap_or(u32::MAX), dir_name, entry.path())
            })
            .collect();
        dirs.sort();

        let devices = dirs
            .into_iter()
            .enumerate()
            .map(|(position, (index, _, syspath))| EnumeratedDevice {
                index: if index == u32::MAX { position as u32 } else { index },
                name: sysfs::read_line(&syspath.join(NAME_ATTRIBUTE)).ok(),
                syspath,
            })
            .collect::<Vec<_>>();

        debug!("[locator] enumerated {} device(s) under {}", devices.len(), self.root.display());
        Ok(devices)
    }

    fn attributes(&self, device: &EnumeratedDevice) -> AttributeStore {
        Self::read_attributes(&device.syspath)
    }
}

/// Trailing decimal number of a device directory name.
fn parse_device_index(dir_name: &str) -> Option<u32> {
    let digits = dir_name.len() - dir_name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    dir_name[dir_name.len() - digits..].parse().ok()
}

/// Calibration constants of one device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationConstants {
    /// Physical units per raw LSB
    pub scale: f64,
    pub offset: f64,
    /// Informational only
    pub sample_rate_hz: Option<f64>,
}

/// A located device and everything later stages need from it
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub kernel_name: String,
    pub base_path: PathBuf,
    pub index: u32,
    /// `*_raw` files, position is the channel index
    pub channel_paths: Vec<PathBuf>,
    /// Storage width in bytes per scan index, filled in by the enabler.
    /// Zero marks a channel whose type tag could not be understood.
    pub channel_byte_width: BTreeMap<usize, usize>,
    pub calibration: CalibrationConstants,
    pub attributes: AttributeStore,
}

impl DeviceDescriptor {
    /// Build a descriptor from a registry entry and its full attribute set,
    /// classifying attributes by suffix.
    pub fn from_enumerated(device: EnumeratedDevice, attributes: AttributeStore) -> LocateResult<Self> {
        let EnumeratedDevice { syspath, index, name } = device;
        let device_label = syspath.display().to_string();

        let mut channel_paths = Vec::new();
        let mut scale = None;
        let mut offset = None;
        let mut sample_rate_hz = None;

        for name in attributes.names() {
            if name.ends_with("raw") {
                channel_paths.push(syspath.join(name));
            } else if name.ends_with("scale") {
                read_once(&attributes, name, &mut scale);
            } else if name.ends_with("offset") {
                read_once(&attributes, name, &mut offset);
            } else if name.ends_with("frequency") {
                read_once(&attributes, name, &mut sample_rate_hz);
            }
        }

        let scale = match scale {
            None => return Err(ConfigError::MissingScale { device: device_label }.into()),
            Some(s) if s == 0.0 => return Err(ConfigError::ZeroScale { device: device_label }.into()),
            Some(s) => s,
        };

        Ok(Self {
            kernel_name: name.unwrap_or_default(),
            base_path: syspath,
            index,
            channel_paths,
            channel_byte_width: BTreeMap::new(),
            calibration: CalibrationConstants {
                scale,
                offset: offset.unwrap_or(0.0),
                sample_rate_hz,
            },
            attributes,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.channel_paths.len()
    }

    pub fn scan_elements_path(&self) -> PathBuf {
        self.base_path.join("scan_elements")
    }

    pub fn buffer_path(&self) -> PathBuf {
        self.base_path.join("buffer")
    }
}

fn read_once(attributes: &AttributeStore, name: &str, slot: &mut Option<f64>) {
    if slot.is_some() {
        return;
    }
    match attributes.get_float(name) {
        Ok(value) => *slot = Some(value),
        Err(e) => warn!("[locator] ignoring attribute: {}", e),
    }
}

static SHARED: RwLock<Option<Arc<DeviceLocator>>> = RwLock::new(None);

/// Finds the device serving a sensor kind
pub struct DeviceLocator {
    registry: Box<dyn DeviceRegistry>,
}

impl DeviceLocator {
    pub fn new(registry: Box<dyn DeviceRegistry>) -> Self {
        Self { registry }
    }

    /// Install the process-wide locator. The first install wins; later
    /// calls get the already installed instance back.
    pub fn install(registry: Box<dyn DeviceRegistry>) -> Arc<DeviceLocator> {
        samples::start_clock();
        let mut shared = SHARED.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = shared.as_ref() {
            debug!("[locator] already installed, keeping existing registry");
            return existing.clone();
        }
        let locator = Arc::new(DeviceLocator::new(registry));
        *shared = Some(locator.clone());
        locator
    }

    pub fn shared() -> Option<Arc<DeviceLocator>> {
        SHARED.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Release the process-wide locator. Adaptors holding their own handle
    /// keep it alive until they are dropped.
    pub fn teardown() {
        if SHARED.write().unwrap_or_else(|e| e.into_inner()).take().is_some() {
            debug!("[locator] torn down");
        }
    }

    /// Find the first device whose declared type name equals `kind_name`.
    pub fn locate(&self, kind_name: &str) -> LocateResult<DeviceDescriptor> {
        let device = self
            .registry
            .enumerate()?
            .into_iter()
            .find(|device| device.name.as_deref() == Some(kind_name))
            .ok_or_else(|| LocateError::NoSuchDevice {
                kind: kind_name.to_string(),
            })?;

        let attributes = self.registry.attributes(&device);
        let descriptor = DeviceDescriptor::from_enumerated(device, attributes)?;
        info!(
            "[locator] {} found at {} with {} channel(s), scale {}",
            kind_name,
            descriptor.base_path.display(),
            descriptor.channel_count(),
            descriptor.calibration.scale
        );
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeIioTree;
    use serial_test::serial;
    use std::sync::Mutex;

    #[test]
    fn test_parse_device_index() {
        assert_eq!(parse_device_index("iio:device0"), Some(0));
        assert_eq!(parse_device_index("iio:device12"), Some(12));
        assert_eq!(parse_device_index("trigger"), None);
    }

    #[test]
    fn test_sysfs_registry_orders_by_device_index() {
        let tree = FakeIioTree::new();
        tree.device(10, "gyro_3d").attr("in_anglvel_scale", "0.1");
        tree.device(2, "accel_3d").attr("in_accel_scale", "0.1");

        let devices = tree.registry().enumerate().unwrap();
        let indices: Vec<u32> = devices.iter().map(|d| d.index).collect();
        assert_eq!(indices, vec![2, 10]);
        assert_eq!(devices[0].name.as_deref(), Some("accel_3d"));
    }

    /// Wraps the sysfs registry and records whose attributes were loaded.
    struct RecordingRegistry {
        inner: SysfsRegistry,
        loaded: Arc<Mutex<Vec<u32>>>,
    }

    impl DeviceRegistry for RecordingRegistry {
        fn enumerate(&self) -> LocateResult<Vec<EnumeratedDevice>> {
            self.inner.enumerate()
        }

        fn attributes(&self, device: &EnumeratedDevice) -> AttributeStore {
            self.loaded.lock().unwrap().push(device.index);
            self.inner.attributes(device)
        }
    }

    #[test]
    fn test_locate_reads_only_the_selected_device() {
        let tree = FakeIioTree::new();
        tree.accelerometer(0, "0.1");
        tree.device(1, "gyro_3d")
            .attr("in_anglvel_scale", "0.1")
            .attr("in_anglvel_x_raw", "777");

        let devices = tree.registry().enumerate().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1].name.as_deref(), Some("gyro_3d"));

        let loaded = Arc::new(Mutex::new(Vec::new()));
        let locator = DeviceLocator::new(Box::new(RecordingRegistry {
            inner: tree.registry(),
            loaded: loaded.clone(),
        }));
        let device = locator.locate("accel_3d").unwrap();
        assert_eq!(device.index, 0);
        assert_eq!(device.attributes.get("in_anglvel_x_raw"), None);
        assert_eq!(*loaded.lock().unwrap(), vec![0]);
    }

    #[test]
    fn test_enumeration_failure() {
        let registry = SysfsRegistry::new("/nonexistent/iio/devices");
        assert!(matches!(
            registry.enumerate(),
            Err(LocateError::EnumerationFailed { .. })
        ));
    }

    #[test]
    fn test_locate_classifies_attributes() {
        let tree = FakeIioTree::new();
        tree.accelerometer(0, "0.001");
        tree.device(0, "accel_3d")
            .attr("in_accel_offset", "2")
            .attr("in_accel_sampling_frequency", "50");

        let locator = DeviceLocator::new(Box::new(tree.registry()));
        let device = locator.locate("accel_3d").unwrap();

        assert_eq!(device.kernel_name, "accel_3d");
        assert_eq!(device.index, 0);
        assert_eq!(device.channel_count(), 3);
        assert!(device.channel_paths[0].ends_with("in_accel_x_raw"));
        assert!(device.channel_paths[2].ends_with("in_accel_z_raw"));
        assert_eq!(device.calibration.scale, 0.001);
        assert_eq!(device.calibration.offset, 2.0);
        assert_eq!(device.calibration.sample_rate_hz, Some(50.0));
    }

    #[test]
    fn test_locate_first_match_wins() {
        let tree = FakeIioTree::new();
        tree.accelerometer(3, "0.5");
        tree.accelerometer(1, "0.25");

        let locator = DeviceLocator::new(Box::new(tree.registry()));
        let device = locator.locate("accel_3d").unwrap();
        assert_eq!(device.index, 1);
        assert_eq!(device.calibration.scale, 0.25);
    }

    #[test]
    fn test_locate_no_such_device() {
        let tree = FakeIioTree::new();
        tree.accelerometer(0, "0.001");

        let locator = DeviceLocator::new(Box::new(tree.registry()));
        assert!(matches!(
            locator.locate("magn_3d"),
            Err(LocateError::NoSuchDevice { kind }) if kind == "magn_3d"
        ));
    }

    #[test]
    fn test_locate_missing_scale() {
        let tree = FakeIioTree::new();
        tree.device(0, "accel_3d").attr("in_accel_x_raw", "1");

        let locator = DeviceLocator::new(Box::new(tree.registry()));
        assert!(matches!(
            locator.locate("accel_3d"),
            Err(LocateError::Calibration(ConfigError::MissingScale { .. }))
        ));
    }

    #[test]
    fn test_locate_unparseable_or_zero_scale() {
        let tree = FakeIioTree::new();
        tree.device(0, "accel_3d").attr("in_accel_scale", "fast");
        tree.device(1, "gyro_3d").attr("in_anglvel_scale", "0");

        let locator = DeviceLocator::new(Box::new(tree.registry()));
        assert!(matches!(
            locator.locate("accel_3d"),
            Err(LocateError::Calibration(ConfigError::MissingScale { .. }))
        ));
        assert!(matches!(
            locator.locate("gyro_3d"),
            Err(LocateError::Calibration(ConfigError::ZeroScale { .. }))
        ));
    }

    #[test]
    fn test_locate_rejects_non_finite_scale() {
        let tree = FakeIioTree::new();
        tree.accelerometer(0, "nan");
        tree.vector_device(1, "gyro_3d", "anglvel", "inf");

        let locator = DeviceLocator::new(Box::new(tree.registry()));
        assert!(matches!(
            locator.locate("accel_3d"),
            Err(LocateError::Calibration(ConfigError::MissingScale { .. }))
        ));
        assert!(matches!(
            locator.locate("gyro_3d"),
            Err(LocateError::Calibration(ConfigError::MissingScale { .. }))
        ));
    }

    #[test]
    #[serial]
    fn test_shared_locator_lifecycle() {
        DeviceLocator::teardown();
        assert!(DeviceLocator::shared().is_none());

        let first = DeviceLocator::install(Box::new(SysfsRegistry::new("/first")));
        let second = DeviceLocator::install(Box::new(SysfsRegistry::new("/second")));
        assert!(Arc::ptr_eq(&first, &second));
        assert!(DeviceLocator::shared().is_some());

        DeviceLocator::teardown();
        assert!(DeviceLocator::shared().is_none());
    }
}
