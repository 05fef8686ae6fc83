//! Windows capture protection using window display affinity
//!
//! `WDA_EXCLUDEFROMCAPTURE` (Windows 10 2004 and later) removes the window
//! from captured frames entirely. Older builds reject it, in which case
//! `WDA_MONITOR` is used and the window renders black in captures.

use parking_lot::Mutex;
use std::ffi::c_void;
use tracing::{debug, info, warn};
use windows::Win32::Foundation::{E_ACCESSDENIED, ERROR_INVALID_PARAMETER, HWND};
use windows::Win32::UI::WindowsAndMessaging::{
    GetWindowDisplayAffinity, IsWindow, SetWindowDisplayAffinity, WDA_EXCLUDEFROMCAPTURE,
    WDA_MONITOR, WDA_NONE, WINDOW_DISPLAY_AFFINITY,
};
use windows::core::HRESULT;

use crate::{EnforcerError, EnforcerResult, ScreenEnforcer};

/// Windows capture enforcer bound to one top-level window
pub struct WindowsEnforcer {
    hwnd: isize,
    protected_affinity: Mutex<WINDOW_DISPLAY_AFFINITY>,
    last_applied: Mutex<bool>,
}

impl WindowsEnforcer {
    /// Create an enforcer for the window identified by `hwnd`
    pub fn new(hwnd: isize) -> EnforcerResult<Self> {
        let enforcer = Self {
            hwnd,
            protected_affinity: Mutex::new(WDA_EXCLUDEFROMCAPTURE),
            last_applied: Mutex::new(false),
        };

        if !enforcer.is_valid_window() {
            return Err(EnforcerError::InvalidTarget(format!(
                "{:#x} is not a window",
                hwnd
            )));
        }

        info!("Initializing Windows capture enforcer for window {:#x}", hwnd);
        Ok(enforcer)
    }

    fn handle(&self) -> HWND {
        HWND(self.hwnd as *mut c_void)
    }

    fn is_valid_window(&self) -> bool {
        unsafe { IsWindow(self.handle()).as_bool() }
    }

    fn set_affinity(&self, affinity: WINDOW_DISPLAY_AFFINITY) -> windows::core::Result<()> {
        unsafe { SetWindowDisplayAffinity(self.handle(), affinity) }
    }

    fn read_affinity(&self) -> Option<u32> {
        let mut affinity = 0u32;
        unsafe { GetWindowDisplayAffinity(self.handle(), &mut affinity) }
            .ok()
            .map(|_| affinity)
    }
}

fn map_error(err: windows::core::Error) -> EnforcerError {
    if err.code() == E_ACCESSDENIED {
        EnforcerError::PermissionDenied(err.message().to_string())
    } else {
        EnforcerError::Platform(format!("{:#x}: {}", err.code().0, err.message()))
    }
}

impl ScreenEnforcer for WindowsEnforcer {
    fn platform(&self) -> &'static str {
        "windows"
    }

    fn apply(&self, enabled: bool) -> EnforcerResult<()> {
        if !self.is_valid_window() {
            return Err(EnforcerError::NoWindow);
        }

        let mut protected = self.protected_affinity.lock();
        let affinity = if enabled { *protected } else { WDA_NONE };
        debug!("SetWindowDisplayAffinity({:#x}, {})", self.hwnd, affinity.0);

        match self.set_affinity(affinity) {
            Ok(()) => {}
            Err(err)
                if enabled
                    && affinity == WDA_EXCLUDEFROMCAPTURE
                    && err.code() == HRESULT::from_win32(ERROR_INVALID_PARAMETER.0) =>
            {
                warn!("WDA_EXCLUDEFROMCAPTURE rejected, falling back to WDA_MONITOR");
                *protected = WDA_MONITOR;
                self.set_affinity(WDA_MONITOR).map_err(map_error)?;
            }
            Err(err) => return Err(map_error(err)),
        }

        *self.last_applied.lock() = enabled;
        Ok(())
    }

    fn query(&self) -> bool {
        match self.read_affinity() {
            Some(affinity) => affinity != WDA_NONE.0,
            None => *self.last_applied.lock(),
        }
    }

    fn can_query(&self) -> bool {
        true
    }
}
