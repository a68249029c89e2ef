//! The native network event loop.
//!
//! The native client drives all I/O and future completions from one event
//! loop, which must run on a thread the host runtime does not schedule.
//! This module owns that thread as process-wide singleton state: start is
//! one-shot and fails loudly on a second call, stop is idempotent and joins
//! the thread before returning.

use std::thread;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::ffi::{self, check, TKV_OK};
use crate::options::OptionValue;

enum NetworkState {
    Idle,
    Running(thread::JoinHandle<ffi::TkvErrorCode>),
    Stopped,
}

static NETWORK: Mutex<NetworkState> = Mutex::new(NetworkState::Idle);

/// Set a network option. Must be called before [`start`]. The code is an
/// opaque integer passed through to the native client unchanged.
pub fn set_option(code: i32, value: OptionValue<'_>) -> Result<()> {
    let encoded = value.encode();
    let code = unsafe { ffi::tkv_network_set_option(code, encoded.as_ptr(), encoded.len()) };
    check(code)?;
    Ok(())
}

/// Set up the native network and spawn the event-loop thread.
///
/// Requires [`select_api_version`](crate::select_api_version) first. The
/// loop is single-shot per process: calling `start` while it is running, or
/// after [`stop`], returns [`Error::NetworkStarted`].
pub fn start() -> Result<()> {
    let mut state = NETWORK.lock();
    if !matches!(*state, NetworkState::Idle) {
        return Err(Error::NetworkStarted);
    }

    check(unsafe { ffi::tkv_setup_network() })?;

    let handle = thread::Builder::new()
        .name("tkv-network".into())
        .spawn(|| {
            let code = unsafe { ffi::tkv_run_network() };
            if code != TKV_OK {
                tracing::error!(code, "network event loop exited with error");
            }
            code
        })?;

    *state = NetworkState::Running(handle);
    Ok(())
}

/// Stop the network event loop and join its thread.
///
/// Idempotent: safe to call from a supervisory shutdown path whether or not
/// the loop ever started. A nonzero loop exit code is surfaced as a native
/// error after the join.
pub fn stop() -> Result<()> {
    let mut state = NETWORK.lock();
    let handle = match std::mem::replace(&mut *state, NetworkState::Stopped) {
        NetworkState::Running(handle) => handle,
        NetworkState::Idle => {
            // Never started: nothing to stop, and a later start stays legal.
            *state = NetworkState::Idle;
            return Ok(());
        }
        NetworkState::Stopped => return Ok(()),
    };

    if let Err(e) = check(unsafe { ffi::tkv_stop_network() }) {
        *state = NetworkState::Running(handle);
        return Err(e.into());
    }

    let code = handle.join().unwrap_or_else(|_| {
        tracing::error!("network thread panicked");
        TKV_OK
    });
    check(code)?;
    Ok(())
}
