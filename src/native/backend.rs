//! Backend lifecycle and native log routing.

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::sync::{Mutex, Once};

use llama_cpp_sys_2 as sys;

use crate::error::Error;

static BACKEND_REFS: Mutex<usize> = Mutex::new(0);
static LOG_ROUTING: Once = Once::new();

/// Refcounted guard over global backend initialization. The native library
/// is initialized when the first guard is acquired and torn down when the
/// last one drops.
pub(crate) struct Backend {
    _private: (),
}

impl Backend {
    pub fn acquire() -> Self {
        LOG_ROUTING.call_once(|| unsafe {
            sys::llama_log_set(Some(forward_native_log), std::ptr::null_mut());
        });
        let mut refs = BACKEND_REFS.lock().unwrap();
        if *refs == 0 {
            unsafe { sys::llama_backend_init() };
        }
        *refs += 1;
        Self { _private: () }
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        let mut refs = BACKEND_REFS.lock().unwrap();
        *refs -= 1;
        if *refs == 0 {
            unsafe { sys::llama_backend_free() };
        }
    }
}

/// Severity levels the backend's logger emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NativeLogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl TryFrom<i32> for NativeLogLevel {
    type Error = Error;

    fn try_from(level: i32) -> Result<Self, Error> {
        match level {
            2 => Ok(Self::Error),
            3 => Ok(Self::Warn),
            4 => Ok(Self::Info),
            5 => Ok(Self::Debug),
            other => Err(Error::UnknownLogLevel(other)),
        }
    }
}

unsafe extern "C" fn forward_native_log(
    level: sys::ggml_log_level,
    text: *const c_char,
    _user_data: *mut c_void,
) {
    if text.is_null() {
        return;
    }
    let message = CStr::from_ptr(text).to_string_lossy();
    let message = message.trim_end();
    if message.is_empty() {
        return;
    }
    match NativeLogLevel::try_from(level as i32) {
        Ok(NativeLogLevel::Error) => tracing::error!(target: "kiln::native", "{message}"),
        Ok(NativeLogLevel::Warn) => tracing::warn!(target: "kiln::native", "{message}"),
        Ok(NativeLogLevel::Info) => tracing::info!(target: "kiln::native", "{message}"),
        Ok(NativeLogLevel::Debug) => tracing::debug!(target: "kiln::native", "{message}"),
        Err(err) => tracing::debug!(target: "kiln::native", "{err}: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::NativeLogLevel;
    use crate::error::Error;

    #[test]
    fn known_levels_map() {
        assert_eq!(NativeLogLevel::try_from(2).unwrap(), NativeLogLevel::Error);
        assert_eq!(NativeLogLevel::try_from(5).unwrap(), NativeLogLevel::Debug);
    }

    #[test]
    fn unknown_level_is_an_error() {
        assert!(matches!(
            NativeLogLevel::try_from(99),
            Err(Error::UnknownLogLevel(99))
        ));
    }
}
