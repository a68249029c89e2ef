//! Completion delivery: one native callback, one message.
//!
//! Subscribing a future installs the crate's completion callback with the
//! native library. The callback runs on a thread the host does not own, so
//! everything it touches must be safe from a foreign thread: it decodes the
//! future, builds a [`Completion`], and pushes it over a channel sender,
//! the only runtime primitive it uses and one that is safe to call from
//! anywhere. Exactly one message is delivered per subscription; a cancelled
//! future delivers its cancellation code through the same path.

use std::os::raw::c_void;
use std::sync::Arc;

pub use crossbeam_channel::{Receiver, Sender};

use crate::error::NativeError;
use crate::ffi::{self, check, TkvFuture};
use crate::future::{decode, Future, FutureInner, FutureResult};

/// An unbounded mailbox for completions. Convenience over building the
/// channel yourself; any `crossbeam_channel::Sender<Completion>` works.
pub fn channel() -> (Sender<Completion>, Receiver<Completion>) {
    crossbeam_channel::unbounded()
}

/// The message a subscribed future delivers into its mailbox.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Caller-supplied correlation token, echoed back verbatim.
    pub token: u64,
    /// The decoded result, or the native error code the future failed with.
    pub result: Result<FutureResult, NativeError>,
}

impl Completion {
    /// The native error code of this completion; zero on success.
    pub fn error_code(&self) -> i32 {
        match &self.result {
            Ok(_) => ffi::TKV_OK,
            Err(e) => e.code(),
        }
    }
}

/// Per-subscription state handed to the native callback as its `void*`
/// parameter. The `future` field is the extra keep-alive reference taken at
/// subscription time; dropping the box releases it.
struct CallbackState {
    future: Arc<FutureInner>,
    token: u64,
    mailbox: Sender<Completion>,
}

impl Future {
    /// Subscribe for asynchronous completion.
    ///
    /// Arranges for exactly one [`Completion`] carrying `token` to be sent
    /// to `mailbox` when the future resolves. Never blocks: either the
    /// subscription is installed (the message arrives later, possibly from
    /// a native thread) or the native registration code is returned. On a
    /// synchronous failure the keep-alive reference is rolled back.
    ///
    /// The caller keeps its own handle and may still poll or cancel. If the
    /// receiving side goes away before resolution, the completion is logged
    /// and dropped; the subscriber is responsible for timing out.
    pub fn subscribe(&self, token: u64, mailbox: &Sender<Completion>) -> Result<(), NativeError> {
        let state = Box::new(CallbackState {
            future: Arc::clone(&self.inner),
            token,
            mailbox: mailbox.clone(),
        });
        let param = Box::into_raw(state);
        let code =
            unsafe { ffi::tkv_future_set_callback(self.native_ptr(), on_resolve, param.cast()) };
        if let Err(e) = check(code) {
            // Registration never fired and never will: reclaim the state
            // (and with it the extra keep-alive reference) immediately.
            drop(unsafe { Box::from_raw(param) });
            return Err(e);
        }
        Ok(())
    }

    pub(crate) fn native_ptr(&self) -> *mut TkvFuture {
        self.inner.ptr()
    }
}

/// The native completion callback. Invoked exactly once per subscription,
/// on a native-library thread.
unsafe extern "C" fn on_resolve(_future: *mut TkvFuture, param: *mut c_void) {
    let state = Box::from_raw(param as *mut CallbackState);

    let completion = Completion {
        token: state.token,
        result: decode(&state.future),
    };

    if state.mailbox.send(completion).is_err() {
        // Receiver is gone. Logged, never retried, never escalated: the
        // subscriber already returned from subscribe() and owns its timeout.
        tracing::debug!(token = state.token, "completion receiver dropped; message discarded");
    }

    // Dropping `state` releases the subscription's keep-alive reference and
    // the copied token/mailbox.
}
