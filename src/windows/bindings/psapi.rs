//! PSAPI.dll bindings for module enumeration

use crate::core::types::{MemoryError, MemoryResult};
use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;
use winapi::shared::minwindef::{FALSE, HMODULE, MAX_PATH};
use winapi::um::psapi::{EnumProcessModules, GetModuleBaseNameW, GetModuleInformation, MODULEINFO};
use winapi::um::winnt::HANDLE;

/// A loaded module: name, base address and image size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    pub name: String,
    pub base: usize,
    pub size: usize,
}

/// Safe wrapper for EnumProcessModules
///
/// # Safety
/// The handle must be a valid process handle
pub unsafe fn enum_process_modules(handle: HANDLE) -> MemoryResult<Vec<HMODULE>> {
    let mut modules = vec![std::ptr::null_mut(); 1024];
    let mut bytes_needed = 0u32;

    let result = EnumProcessModules(
        handle,
        modules.as_mut_ptr(),
        (modules.len() * std::mem::size_of::<HMODULE>()) as u32,
        &mut bytes_needed,
    );

    if result == FALSE {
        return Err(MemoryError::WindowsApi(
            "Failed to enumerate process modules".to_string(),
        ));
    }

    let count = bytes_needed as usize / std::mem::size_of::<HMODULE>();
    modules.truncate(count);

    Ok(modules)
}

/// Safe wrapper for GetModuleInformation
///
/// # Safety
/// The handle must be a valid process handle and module must be valid
pub unsafe fn get_module_information(handle: HANDLE, module: HMODULE) -> MemoryResult<MODULEINFO> {
    let mut info = MODULEINFO {
        lpBaseOfDll: std::ptr::null_mut(),
        SizeOfImage: 0,
        EntryPoint: std::ptr::null_mut(),
    };

    let result = GetModuleInformation(
        handle,
        module,
        &mut info,
        std::mem::size_of::<MODULEINFO>() as u32,
    );

    if result == FALSE {
        return Err(MemoryError::WindowsApi(
            "Failed to get module information".to_string(),
        ));
    }

    Ok(info)
}

/// Safe wrapper for GetModuleBaseNameW
///
/// # Safety
/// The handle must be a valid process handle and module must be valid
pub unsafe fn get_module_base_name(handle: HANDLE, module: HMODULE) -> MemoryResult<String> {
    let mut buffer = vec![0u16; MAX_PATH];

    let length = GetModuleBaseNameW(handle, module, buffer.as_mut_ptr(), MAX_PATH as u32);

    if length == 0 {
        return Err(MemoryError::WindowsApi(
            "Failed to get module base name".to_string(),
        ));
    }

    buffer.truncate(length as usize);

    OsString::from_wide(&buffer)
        .into_string()
        .map_err(|_| MemoryError::WindowsApi("Invalid module name encoding".to_string()))
}

/// Lists every module of the process. Modules whose details cannot be read
/// are skipped.
///
/// # Safety
/// The handle must be a valid process handle
pub unsafe fn list_modules(handle: HANDLE) -> MemoryResult<Vec<LoadedModule>> {
    let modules = enum_process_modules(handle)?;
    let mut loaded = Vec::with_capacity(modules.len());

    for module in modules {
        let (Ok(info), Ok(name)) = (
            get_module_information(handle, module),
            get_module_base_name(handle, module),
        ) else {
            continue;
        };

        loaded.push(LoadedModule {
            name,
            base: info.lpBaseOfDll as usize,
            size: info.SizeOfImage as usize,
        });
    }

    Ok(loaded)
}
