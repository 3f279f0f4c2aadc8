//! Non-volatile memory adapter.
//!
//! Implements [`EepromPort`] as a byte-addressable, page-bounded image.
//!
//! - **`target_os = "espidf"`**: the image is mirrored in RAM and every
//!   page write is committed to one NVS blob.  ESP-IDF NVS commits are
//!   atomic per `nvs_commit()`, so a reset mid-save leaves either the old or
//!   the new page contents.
//! - **`not(target_os = "espidf")`**: plain in-memory image for host tests
//!   and simulation.
//!
//! Both backends start erased (`0xFF`), reject out-of-range access and
//! reject writes that cross a page boundary, like a real serial EEPROM.

use log::{info, warn};

use crate::app::ports::EepromPort;
use crate::error::StorageError;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// 24C08-class geometry.
pub const DEFAULT_CAPACITY: usize = 1024;
pub const DEFAULT_PAGE_SIZE: usize = 16;

/// Erased cell value.
pub const ERASED: u8 = 0xFF;

#[cfg(target_os = "espidf")]
const NVS_NAMESPACE: &[u8] = b"domotouch\0";
#[cfg(target_os = "espidf")]
const NVS_KEY: &[u8] = b"eeprom\0";

pub struct NvsEeprom {
    image: Vec<u8>,
    page_size: usize,
}

impl NvsEeprom {
    /// Open the default-geometry store.
    ///
    /// On device this initialises NVS flash and loads the persisted image;
    /// a missing or mis-sized blob yields an erased image.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            init_flash()?;
            let mut store = Self::with_geometry(DEFAULT_CAPACITY, DEFAULT_PAGE_SIZE);
            match load_blob(&mut store.image) {
                Ok(()) => info!("NvsEeprom: image loaded ({} bytes)", store.image.len()),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => info!("NvsEeprom: no stored image, starting erased"),
                Err(e) => warn!("NvsEeprom: NVS read error {e}, starting erased"),
            }
            Ok(store)
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("NvsEeprom: simulation backend");
            Ok(Self::with_geometry(DEFAULT_CAPACITY, DEFAULT_PAGE_SIZE))
        }
    }

    /// Erased in-memory image with the given geometry.
    pub fn with_geometry(capacity: usize, page_size: usize) -> Self {
        Self {
            image: vec![ERASED; capacity.min(usize::from(u16::MAX) + 1)],
            page_size: page_size.max(1),
        }
    }

    /// Raw contents, for diagnostics and tests.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Overwrite raw bytes without page checks or persistence.  Used to
    /// seed legacy images and inject corruption.
    pub fn poke(&mut self, address: usize, data: &[u8]) {
        let end = (address + data.len()).min(self.image.len());
        if address < end {
            self.image[address..end].copy_from_slice(&data[..end - address]);
        }
    }

    fn range(&self, address: u16, len: usize) -> Result<core::ops::Range<usize>, StorageError> {
        let start = usize::from(address);
        let end = start + len;
        if end > self.image.len() {
            return Err(StorageError::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl EepromPort for NvsEeprom {
    fn capacity(&self) -> usize {
        self.image.len()
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn read(&mut self, address: u16, buf: &mut [u8]) -> Result<(), StorageError> {
        let range = self.range(address, buf.len())?;
        buf.copy_from_slice(&self.image[range]);
        Ok(())
    }

    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), StorageError> {
        let range = self.range(address, data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        if range.start / self.page_size != (range.end - 1) / self.page_size {
            return Err(StorageError::PageOverflow);
        }
        self.image[range].copy_from_slice(data);

        #[cfg(target_os = "espidf")]
        store_blob(&self.image).map_err(|e| {
            warn!("NvsEeprom: NVS commit failed ({e})");
            StorageError::Io
        })?;

        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF NVS plumbing
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn init_flash() -> Result<(), StorageError> {
    // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
    // single main-task context before any concurrent NVS access.
    let ret = unsafe { nvs_flash_init() };
    if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
        warn!("NVS: erasing and re-initialising flash partition");
        if unsafe { nvs_flash_erase() } != ESP_OK || unsafe { nvs_flash_init() } != ESP_OK {
            return Err(StorageError::Io);
        }
    } else if ret != ESP_OK {
        return Err(StorageError::Io);
    }
    Ok(())
}

/// Open the namespace, run `f` with the handle, then close.
#[cfg(target_os = "espidf")]
fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, i32>
where
    F: FnOnce(nvs_handle_t) -> Result<T, i32>,
{
    let mut handle: nvs_handle_t = 0;
    let mode = if write {
        nvs_open_mode_t_NVS_READWRITE
    } else {
        nvs_open_mode_t_NVS_READONLY
    };
    let ret = unsafe { nvs_open(NVS_NAMESPACE.as_ptr() as *const _, mode, &mut handle) };
    if ret != ESP_OK {
        return Err(ret);
    }
    let result = f(handle);
    unsafe {
        nvs_close(handle);
    }
    result
}

#[cfg(target_os = "espidf")]
fn load_blob(image: &mut [u8]) -> Result<(), i32> {
    with_nvs_handle(false, |handle| {
        let mut size: usize = 0;
        let ret = unsafe {
            nvs_get_blob(handle, NVS_KEY.as_ptr() as *const _, core::ptr::null_mut(), &mut size)
        };
        if ret != ESP_OK {
            return Err(ret);
        }
        if size != image.len() {
            return Err(ESP_ERR_NVS_INVALID_LENGTH);
        }
        let ret = unsafe {
            nvs_get_blob(
                handle,
                NVS_KEY.as_ptr() as *const _,
                image.as_mut_ptr() as *mut _,
                &mut size,
            )
        };
        if ret != ESP_OK {
            return Err(ret);
        }
        Ok(())
    })
}

#[cfg(target_os = "espidf")]
fn store_blob(image: &[u8]) -> Result<(), i32> {
    with_nvs_handle(true, |handle| {
        let ret = unsafe {
            nvs_set_blob(
                handle,
                NVS_KEY.as_ptr() as *const _,
                image.as_ptr() as *const _,
                image.len(),
            )
        };
        if ret != ESP_OK {
            return Err(ret);
        }
        let ret = unsafe { nvs_commit(handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        Ok(())
    })
}
