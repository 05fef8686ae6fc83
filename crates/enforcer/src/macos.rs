//! macOS capture protection using `NSWindow.sharingType`
//!
//! `NSWindowSharingNone` keeps window contents out of screenshots, screen
//! recordings, and mirrored displays. The setting is per window, so windows
//! created after an apply are only covered by the next reconciliation.
//!
//! AppKit is main-thread only. Calls made elsewhere are handed to the main
//! dispatch queue and waited on; a main thread that never services the
//! queue surfaces as `NoWindow`.

use cocoa::appkit::NSApp;
use cocoa::base::{id, nil};
use cocoa::foundation::NSUInteger;
use crossbeam_channel::bounded;
use dispatch::Queue;
use objc::runtime::{BOOL, NO};
use objc::{class, msg_send, sel, sel_impl};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{EnforcerError, EnforcerResult, ScreenEnforcer};

const NS_WINDOW_SHARING_NONE: NSUInteger = 0;
const NS_WINDOW_SHARING_READ_ONLY: NSUInteger = 1;

/// How long to wait for the main run loop to pick up AppKit work
const MAIN_THREAD_TIMEOUT: Duration = Duration::from_secs(2);

/// macOS capture enforcer covering every window of the application
pub struct MacOSEnforcer {
    last_applied: AtomicBool,
}

impl MacOSEnforcer {
    pub fn new() -> Self {
        info!("Initializing macOS capture enforcer");
        Self {
            last_applied: AtomicBool::new(false),
        }
    }
}

impl Default for MacOSEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `work` on the main thread and wait for its result
fn on_main_thread<T, F>(work: F) -> EnforcerResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let is_main: BOOL = unsafe { msg_send![class!(NSThread), isMainThread] };
    if is_main != NO {
        return Ok(work());
    }

    let (tx, rx) = bounded(1);
    Queue::main().exec_async(move || {
        let _ = tx.send(work());
    });

    rx.recv_timeout(MAIN_THREAD_TIMEOUT).map_err(|_| {
        warn!("Main run loop did not service AppKit request");
        EnforcerError::NoWindow
    })
}

/// Must run on the main thread
unsafe fn app_windows() -> Option<Vec<id>> {
    unsafe {
        let app = NSApp();
        if app == nil {
            return None;
        }

        let windows: id = msg_send![app, windows];
        let count: NSUInteger = msg_send![windows, count];
        let mut result = Vec::with_capacity(count as usize);
        for i in 0..count {
            let window: id = msg_send![windows, objectAtIndex: i];
            result.push(window);
        }
        Some(result)
    }
}

/// Must run on the main thread. Returns the number of windows updated.
fn set_sharing_type(sharing: NSUInteger) -> EnforcerResult<usize> {
    let windows = unsafe { app_windows() }.ok_or(EnforcerError::NoWindow)?;
    if windows.is_empty() {
        return Err(EnforcerError::NoWindow);
    }

    for window in &windows {
        unsafe {
            let _: () = msg_send![*window, setSharingType: sharing];
        }
    }
    Ok(windows.len())
}

/// Must run on the main thread. None when there is no window to read.
fn all_windows_protected() -> Option<bool> {
    let windows = unsafe { app_windows() }?;
    if windows.is_empty() {
        return None;
    }

    Some(windows.iter().all(|window| {
        let sharing: NSUInteger = unsafe { msg_send![*window, sharingType] };
        sharing == NS_WINDOW_SHARING_NONE
    }))
}

impl ScreenEnforcer for MacOSEnforcer {
    fn platform(&self) -> &'static str {
        "macos"
    }

    fn apply(&self, enabled: bool) -> EnforcerResult<()> {
        let sharing = if enabled {
            NS_WINDOW_SHARING_NONE
        } else {
            NS_WINDOW_SHARING_READ_ONLY
        };

        let updated = on_main_thread(move || set_sharing_type(sharing))??;
        debug!("Set sharingType={} on {} windows", sharing, updated);

        self.last_applied.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn query(&self) -> bool {
        match on_main_thread(all_windows_protected) {
            Ok(Some(protected)) => protected,
            _ => self.last_applied.load(Ordering::SeqCst),
        }
    }

    fn can_query(&self) -> bool {
        true
    }
}
