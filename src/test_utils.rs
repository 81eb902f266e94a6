//! Fake sysfs IIO trees for tests.

use crate::locator::SysfsRegistry;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct FakeIioTree {
    dir: TempDir,
}

impl FakeIioTree {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp sysfs root"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn registry(&self) -> SysfsRegistry {
        SysfsRegistry::new(self.root())
    }

    /// Create (or reopen) `iio:device<index>` declaring `name`.
    pub fn device(&self, index: u32, name: &str) -> FakeDevice {
        let path = self.root().join(format!("iio:device{}", index));
        fs::create_dir_all(&path).expect("create device dir");
        let device = FakeDevice { path };
        device.attr("name", name);
        device
    }

    /// Three-axis accelerometer with buffered capture support.
    pub fn accelerometer(&self, index: u32, scale: &str) -> FakeDevice {
        self.vector_device(index, "accel_3d", "accel", scale)
    }

    pub fn vector_device(&self, index: u32, name: &str, channel: &str, scale: &str) -> FakeDevice {
        let device = self.device(index, name);
        device.attr(&format!("in_{}_scale", channel), scale);
        for (i, axis) in ["x", "y", "z"].iter().enumerate() {
            device.attr(&format!("in_{}_{}_raw", channel, axis), "0");
            device.scan_element(&format!("in_{}_{}", channel, axis), i, "le:s32/32>>0");
        }
        device.scan_element("in_timestamp", 3, "le:s64/64>>0");
        device.buffer();
        device
    }
}

pub struct FakeDevice {
    path: PathBuf,
}

impl FakeDevice {
    pub fn attr(&self, name: &str, value: &str) -> &Self {
        fs::write(self.path.join(name), format!("{}\n", value)).expect("write attribute");
        self
    }

    pub fn scan_element(&self, channel: &str, index: usize, type_tag: &str) -> &Self {
        let scan = self.path.join("scan_elements");
        fs::create_dir_all(&scan).expect("create scan_elements");
        fs::write(scan.join(format!("{}_en", channel)), "0\n").expect("write _en");
        fs::write(scan.join(format!("{}_index", channel)), format!("{}\n", index)).expect("write _index");
        fs::write(scan.join(format!("{}_type", channel)), format!("{}\n", type_tag)).expect("write _type");
        self
    }

    pub fn buffer(&self) -> &Self {
        let buffer = self.path.join("buffer");
        fs::create_dir_all(&buffer).expect("create buffer dir");
        fs::write(buffer.join("enable"), "0\n").expect("write buffer/enable");
        fs::write(buffer.join("length"), "0\n").expect("write buffer/length");
        self
    }

    /// Contents of a file relative to the device directory, trimmed.
    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path.join(relative))
            .expect("read fake attribute")
            .trim()
            .to_string()
    }
}
