// Compass Relay - Flash Storage
//
// Mounts the SPIFFS data partition at `STORAGE_BASE_PATH` so the updater can
// use `std::fs`.

use std::ffi::CString;

use crate::config::*;

pub fn mount() -> anyhow::Result<()> {
    // The VFS layer may keep these pointers; they live for the whole program.
    let base_path: &'static std::ffi::CStr =
        Box::leak(CString::new(STORAGE_BASE_PATH)?.into_boxed_c_str());
    let label: &'static std::ffi::CStr =
        Box::leak(CString::new(STORAGE_PARTITION_LABEL)?.into_boxed_c_str());

    let conf = esp_idf_sys::esp_vfs_spiffs_conf_t {
        base_path: base_path.as_ptr(),
        partition_label: label.as_ptr(),
        max_files: STORAGE_MAX_FILES as _,
        format_if_mount_failed: true,
    };

    let ret = unsafe { esp_idf_sys::esp_vfs_spiffs_register(&conf) };
    if ret != esp_idf_sys::ESP_OK {
        anyhow::bail!("SPIFFS mount failed ({})", ret);
    }

    log::info!("Storage mounted at {}", STORAGE_BASE_PATH);
    Ok(())
}
