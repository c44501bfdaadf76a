//! Accelerator resources.
//!
//! [`DeviceResources`] is the handle every device-resident index is built
//! against. It owns a table of devices, each with a fixed memory budget, and
//! a dedicated worker pool that runs device kernels (graph construction and
//! batched search). Index data placed on a device is accounted for through a
//! [`DeviceAllocation`] guard that returns its bytes when dropped.
//!
//! # Example
//!
//! ```
//! use manifoldb_binary::resources::{DeviceResources, ResourcesConfig};
//!
//! let res = DeviceResources::new(ResourcesConfig::new().memory_per_device(1 << 20)).unwrap();
//!
//! let block = res.allocate(0, 4096).unwrap();
//! assert_eq!(res.memory_info(0).unwrap().used, 4096);
//!
//! drop(block);
//! assert_eq!(res.memory_info(0).unwrap().used, 0);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{BinaryIndexError, Result};

/// Environment variable overriding [`ResourcesConfig::device_count`].
pub const ENV_DEVICE_COUNT: &str = "MANIFOLDB_DEVICE_COUNT";
/// Environment variable overriding [`ResourcesConfig::memory_per_device`].
pub const ENV_DEVICE_MEMORY: &str = "MANIFOLDB_DEVICE_MEMORY";
/// Environment variable overriding [`ResourcesConfig::worker_threads`].
pub const ENV_DEVICE_THREADS: &str = "MANIFOLDB_DEVICE_THREADS";

/// Configuration for [`DeviceResources`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// Number of devices.
    /// Default: 1
    pub device_count: usize,

    /// Memory budget per device, in bytes.
    /// Default: 4 GiB
    pub memory_per_device: usize,

    /// Worker threads for device kernels (`None` = one per core).
    /// Default: None
    pub worker_threads: Option<usize>,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self { device_count: 1, memory_per_device: 4 << 30, worker_threads: None }
    }
}

impl ResourcesConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of devices.
    #[must_use]
    pub const fn device_count(mut self, count: usize) -> Self {
        self.device_count = count;
        self
    }

    /// Set the memory budget per device.
    #[must_use]
    pub const fn memory_per_device(mut self, bytes: usize) -> Self {
        self.memory_per_device = bytes;
        self
    }

    /// Set the number of kernel worker threads.
    #[must_use]
    pub const fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Defaults overlaid with `MANIFOLDB_DEVICE_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| -> Option<usize> {
            let raw = lookup(key)?;
            match raw.trim().parse::<usize>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(key, value = %raw, "ignoring unparseable resource setting");
                    None
                }
            }
        };

        if let Some(count) = parse(ENV_DEVICE_COUNT) {
            self.device_count = count;
        }
        if let Some(bytes) = parse(ENV_DEVICE_MEMORY) {
            self.memory_per_device = bytes;
        }
        if let Some(threads) = parse(ENV_DEVICE_THREADS) {
            self.worker_threads = Some(threads);
        }
        self
    }
}

/// Memory usage of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMemoryInfo {
    /// Bytes currently allocated.
    pub used: usize,
    /// Total budget.
    pub capacity: usize,
}

impl DeviceMemoryInfo {
    /// Bytes still available.
    #[must_use]
    pub const fn available(&self) -> usize {
        self.capacity.saturating_sub(self.used)
    }
}

#[derive(Debug)]
struct DeviceMemory {
    capacity: usize,
    used: AtomicUsize,
}

/// Shared handle to the accelerator devices.
#[derive(Debug)]
pub struct DeviceResources {
    devices: Vec<DeviceMemory>,
    pool: rayon::ThreadPool,
    released: AtomicBool,
}

impl DeviceResources {
    /// Acquire device resources.
    ///
    /// # Errors
    ///
    /// Returns an error if `device_count` is zero or the worker pool cannot start.
    pub fn new(config: ResourcesConfig) -> Result<Arc<Self>> {
        if config.device_count == 0 {
            return Err(BinaryIndexError::InvalidDevice { device: 0, count: 0 });
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads.unwrap_or(0))
            .thread_name(|i| format!("manifoldb-device-{i}"))
            .build()
            .map_err(|e| BinaryIndexError::Io(std::io::Error::other(e)))?;

        let devices = (0..config.device_count)
            .map(|_| DeviceMemory { capacity: config.memory_per_device, used: AtomicUsize::new(0) })
            .collect();

        debug!(
            devices = config.device_count,
            memory_per_device = config.memory_per_device,
            threads = pool.current_num_threads(),
            "acquired device resources"
        );

        Ok(Arc::new(Self { devices, pool, released: AtomicBool::new(false) }))
    }

    /// Acquire resources with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker pool cannot start.
    pub fn standard() -> Result<Arc<Self>> {
        Self::new(ResourcesConfig::default())
    }

    /// Number of devices.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Number of kernel worker threads.
    #[must_use]
    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Fail unless `device` exists and the handle is live.
    ///
    /// # Errors
    ///
    /// Returns [`BinaryIndexError::ResourcesReleased`] or
    /// [`BinaryIndexError::InvalidDevice`].
    pub fn check_device(&self, device: usize) -> Result<()> {
        if self.is_released() {
            return Err(BinaryIndexError::ResourcesReleased);
        }
        if device >= self.devices.len() {
            return Err(BinaryIndexError::InvalidDevice { device, count: self.devices.len() });
        }
        Ok(())
    }

    /// Reserve `bytes` of memory on `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle was released, the device does not
    /// exist, or the budget would be exceeded.
    pub fn allocate(self: &Arc<Self>, device: usize, bytes: usize) -> Result<DeviceAllocation> {
        self.check_device(device)?;

        let memory = &self.devices[device];
        memory
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|&total| total <= memory.capacity)
            })
            .map_err(|used| BinaryIndexError::DeviceMemoryExhausted {
                device,
                requested: bytes,
                available: memory.capacity.saturating_sub(used),
            })?;

        debug!(device, bytes, "device allocation");
        Ok(DeviceAllocation { resources: Arc::clone(self), device, bytes })
    }

    /// Memory usage of `device`.
    ///
    /// # Errors
    ///
    /// Returns [`BinaryIndexError::InvalidDevice`] if the device does not exist.
    pub fn memory_info(&self, device: usize) -> Result<DeviceMemoryInfo> {
        let memory = self
            .devices
            .get(device)
            .ok_or(BinaryIndexError::InvalidDevice { device, count: self.devices.len() })?;
        Ok(DeviceMemoryInfo { used: memory.used.load(Ordering::Acquire), capacity: memory.capacity })
    }

    /// Release the handle. Later allocations fail; live allocations stay valid.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            debug!("released device resources");
        }
    }

    /// Check if [`release`](Self::release) was called.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Run a kernel on the device worker pool.
    pub fn run<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}

/// Device memory held by an index. Returned to the device on drop.
#[derive(Debug)]
pub struct DeviceAllocation {
    resources: Arc<DeviceResources>,
    device: usize,
    bytes: usize,
}

impl DeviceAllocation {
    /// The device this allocation lives on.
    #[must_use]
    pub fn device(&self) -> usize {
        self.device
    }

    /// Size in bytes.
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for DeviceAllocation {
    fn drop(&mut self) {
        self.resources.devices[self.device].used.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}
