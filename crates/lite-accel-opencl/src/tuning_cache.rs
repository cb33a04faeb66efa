//! Persisted tuning results.
//!
//! One JSON file holds a [`DeviceProfile`] per device. Each profile maps a
//! kernel and its global size to the fastest local size found, so a later
//! session can commit it without searching again.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::candidates::TuningCandidate;

/// Best local size recorded for one kernel/global-size pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedTuning {
    pub local_size: Vec<usize>,
    /// Measured device time of the winning launch.
    pub time_ms: f64,
}

impl CachedTuning {
    pub fn candidate(&self) -> TuningCandidate {
        TuningCandidate::new(self.local_size.clone())
    }
}

/// Tuning results for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub device_name: String,
    /// Driver version at tuning time; results from another driver are ignored.
    pub driver_version: String,
    pub entries: HashMap<String, CachedTuning>,
    pub created_at: String,
}

impl DeviceProfile {
    pub fn new(device_name: impl Into<String>, driver_version: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            driver_version: driver_version.into(),
            entries: HashMap::new(),
            created_at: epoch_now(),
        }
    }
}

fn epoch_now() -> String {
    use std::time::SystemTime;
    let d = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    format!("epoch:{}", d.as_secs())
}

/// Cache file containing one or more device profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningCache {
    /// Schema version for forward-compatibility.
    pub version: String,
    pub profiles: HashMap<String, DeviceProfile>,
}

impl Default for TuningCache {
    fn default() -> Self {
        Self { version: "1.0.0".to_owned(), profiles: HashMap::new() }
    }
}

impl TuningCache {
    /// Key for a kernel at a given global size, e.g. `conv2d@64x32x1`.
    pub fn key(kernel_name: &str, global: &[usize]) -> String {
        let dims: Vec<String> = global.iter().map(ToString::to_string).collect();
        format!("{kernel_name}@{}", dims.join("x"))
    }

    /// Load from a JSON file, returning an empty cache on any error.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!("Corrupt tuning cache {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => {
                debug!("No tuning cache at {}, starting fresh", path.display());
                Self::default()
            }
        }
    }

    /// Persist to a JSON file, creating parent directories.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        info!("Saved tuning cache to {}", path.display());
        Ok(())
    }

    pub fn get_profile(&self, device_name: &str) -> Option<&DeviceProfile> {
        self.profiles.get(device_name)
    }

    /// Cached result for `key` on a device, if recorded under the same driver.
    pub fn lookup(
        &self,
        device_name: &str,
        driver_version: &str,
        key: &str,
    ) -> Option<&CachedTuning> {
        let profile = self.get_profile(device_name)?;
        if profile.driver_version != driver_version {
            debug!(
                "Ignoring tuning cache for '{}': driver {} != {}",
                device_name, profile.driver_version, driver_version
            );
            return None;
        }
        profile.entries.get(key)
    }

    /// Record a result. A profile from a different driver is replaced.
    pub fn record(
        &mut self,
        device_name: &str,
        driver_version: &str,
        key: String,
        entry: CachedTuning,
    ) {
        let profile = self
            .profiles
            .entry(device_name.to_owned())
            .or_insert_with(|| DeviceProfile::new(device_name, driver_version));
        if profile.driver_version != driver_version {
            *profile = DeviceProfile::new(device_name, driver_version);
        }
        profile.entries.insert(key, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(local: Vec<usize>) -> CachedTuning {
        CachedTuning { local_size: local, time_ms: 0.5 }
    }

    #[test]
    fn key_format() {
        assert_eq!(TuningCache::key("conv2d", &[64, 32, 1]), "conv2d@64x32x1");
        assert_eq!(TuningCache::key("add", &[7]), "add@7");
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let mut cache = TuningCache::default();
        cache.record("GPU", "1.0", "k@8".into(), entry(vec![8, 1, 1]));
        cache.save(&path).unwrap();

        let loaded = TuningCache::load(&path);
        assert_eq!(loaded, cache);
        let entry = loaded.lookup("GPU", "1.0", "k@8").unwrap();
        assert_eq!(entry.candidate().local_size, vec![8, 1, 1]);
    }

    #[test]
    fn load_missing_file_is_empty() {
        let cache = TuningCache::load(Path::new("/nonexistent/tuning.json"));
        assert!(cache.profiles.is_empty());
    }

    #[test]
    fn load_corrupt_json_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not valid json {{{").unwrap();
        assert!(TuningCache::load(&path).profiles.is_empty());
    }

    #[test]
    fn driver_change_invalidates() {
        let mut cache = TuningCache::default();
        cache.record("GPU", "1.0", "k@8".into(), entry(vec![8]));
        assert!(cache.lookup("GPU", "2.0", "k@8").is_none());

        cache.record("GPU", "2.0", "k@16".into(), entry(vec![16]));
        let profile = cache.get_profile("GPU").unwrap();
        assert_eq!(profile.driver_version, "2.0");
        assert!(!profile.entries.contains_key("k@8"));
    }
}
