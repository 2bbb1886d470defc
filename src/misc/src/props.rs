use anyhow::{Result, bail};
use std::ops::Deref;

const PROP_VALUE_MAX: usize = 92;

// https://cs.android.com/android/platform/superproject/main/+/main:system/libbase/parsebool.cpp;l=23-31;drc=61197364367c9e404c7da6900658f1b16c42d0da
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "y" | "yes" | "on" | "true" => Some(true),
        "0" | "n" | "no" | "off" | "false" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property(String);

impl From<Property> for bool {
    fn from(value: Property) -> Self {
        parse_bool(&value).unwrap_or_default()
    }
}

impl Property {
    pub fn as_bool(&self) -> Option<bool> {
        parse_bool(self)
    }
}

impl Deref for Property {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

#[cfg(target_os = "android")]
mod imp {
    use super::PROP_VALUE_MAX;
    use anyhow::{Result, bail};
    use std::ffi::{CStr, CString, c_char, c_int};

    unsafe extern "C" {
        fn __system_property_get(name: *const c_char, value: *mut c_char) -> c_int;
        fn __system_property_set(name: *const c_char, value: *const c_char) -> c_int;
    }

    pub fn get(name: &str) -> Option<String> {
        let name = CString::new(name).ok()?;
        let mut buffer = [0u8; PROP_VALUE_MAX + 1];

        let len = unsafe { __system_property_get(name.as_ptr(), buffer.as_mut_ptr() as _) };

        if len <= 0 {
            return None;
        }

        let value = CStr::from_bytes_until_nul(&buffer).ok()?;
        Some(value.to_string_lossy().into_owned())
    }

    pub fn set(name: &str, value: &str) -> Result<()> {
        let c_name = CString::new(name)?;
        let c_value = CString::new(value)?;

        let res = unsafe { __system_property_set(c_name.as_ptr(), c_value.as_ptr()) };

        if res != 0 {
            bail!("__system_property_set({name}, {value}) failed: {res}")
        }

        Ok(())
    }
}

// Off-device the property area is emulated per process, so hosts and tests share one namespace.
#[cfg(not(target_os = "android"))]
mod imp {
    use anyhow::Result;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::LazyLock;

    static PROPERTIES: LazyLock<Mutex<HashMap<String, String>>> = LazyLock::new(Default::default);

    pub fn get(name: &str) -> Option<String> {
        PROPERTIES.lock().get(name).cloned()
    }

    pub fn set(name: &str, value: &str) -> Result<()> {
        PROPERTIES.lock().insert(name.into(), value.into());
        Ok(())
    }
}

pub fn get(name: &str) -> Option<Property> {
    imp::get(name).filter(|it| !it.is_empty()).map(Property)
}

pub fn set(name: &str, value: &str) -> Result<()> {
    if value.len() > PROP_VALUE_MAX {
        bail!("property value too long for {name}: {} bytes", value.len())
    }

    imp::set(name, value)
}

pub fn get_bool(name: &str, fallback: bool) -> bool {
    get(name).and_then(|it| it.as_bool()).unwrap_or(fallback)
}

pub fn set_bool(name: &str, value: bool) -> Result<()> {
    set(name, if value { "true" } else { "false" })
}

pub fn prop_on(name: &str) -> bool {
    get(name).map(|it| it.into()).unwrap_or_default()
}
