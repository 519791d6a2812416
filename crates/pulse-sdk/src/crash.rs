//! Panic capture.
//!
//! Installs a panic hook that records each panic as a fatal error event and
//! then hands the panic to whatever hook was installed before it.

use crate::{ErrorReport, Pulse};
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::{self, PanicHookInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;

/// Guard for an installed panic hook.
///
/// Panics are written straight to the durable queue; nothing is sent over
/// the network from inside the hook. The next drain pass delivers them.
pub struct PanicCapture {
    previous: Arc<PanicHook>,
    enabled: Arc<AtomicBool>,
    // Address of the installed closure, used to recognize it on uninstall.
    hook_addr: usize,
}

impl PanicCapture {
    /// Install the capture hook in front of the current hook.
    pub fn install(pulse: &Pulse) -> Self {
        let previous: Arc<PanicHook> = Arc::new(panic::take_hook());
        let chained = Arc::clone(&previous);
        let enabled = Arc::new(AtomicBool::new(true));
        let active = Arc::clone(&enabled);
        let client = pulse.downgrade();

        let hook: PanicHook = Box::new(move |info| {
            if active.load(Ordering::SeqCst) {
                if let Some(client) = client.upgrade() {
                    client.record_panic(panic_report(info));
                }
            }
            chained(info);
        });
        let hook_addr = hook_address(&hook);
        panic::set_hook(hook);

        Self {
            previous,
            enabled,
            hook_addr,
        }
    }

    /// Stop capturing panics.
    ///
    /// If the capture hook is still the current process hook, the hook that
    /// was current at install time is put back. If another hook was installed
    /// on top of it since, that hook stays in place and the capture hook
    /// below it only forwards to its predecessor from now on. Uninstalling in
    /// reverse install order restores the original hook exactly.
    pub fn uninstall(self) {
        self.enabled.store(false, Ordering::SeqCst);

        let current = panic::take_hook();
        if hook_address(&current) != self.hook_addr {
            panic::set_hook(current);
            return;
        }

        // Dropping our hook releases its reference to the previous one.
        drop(current);
        match Arc::try_unwrap(self.previous) {
            Ok(previous) => panic::set_hook(previous),
            Err(shared) => panic::set_hook(Box::new(move |info| shared(info))),
        }
    }
}

fn hook_address(hook: &PanicHook) -> usize {
    let hook: &(dyn Fn(&PanicHookInfo<'_>) + Sync + Send) = &**hook;
    hook as *const _ as *const () as usize
}

fn panic_report(info: &PanicHookInfo<'_>) -> ErrorReport {
    let mut report = ErrorReport::new(panic_message(info.payload()), "Panic");
    if let Some(location) = info.location() {
        report = report.with_source(format!(
            "{}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        ));
    }
    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
        report = report.with_stack(backtrace.to_string());
    }
    report
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}
