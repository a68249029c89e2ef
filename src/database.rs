//! Database handles.

use std::ffi::CString;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::ffi::{self, check, TkvDatabase};
use crate::options::OptionValue;
use crate::transaction::Transaction;

/// Owns the native database pointer. Destroyed exactly once, when the last
/// handle referring to it (database, transaction, or future) is gone.
#[derive(Debug)]
pub(crate) struct DatabaseInner {
    ptr: *mut TkvDatabase,
}

// Safety: the native client documents database handles as safe to use from
// any thread; it synchronizes internally.
unsafe impl Send for DatabaseInner {}
unsafe impl Sync for DatabaseInner {}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        unsafe {
            ffi::tkv_database_destroy(self.ptr);
        }
    }
}

/// A handle to a database.
///
/// Cloning is cheap (shared ownership of one native handle). Transactions
/// created from a database keep it alive, so the handles may be dropped in
/// any order.
///
/// # Example
///
/// ```no_run
/// use tkv::Database;
///
/// let db = Database::open(None)?;
/// let tr = db.create_transaction()?;
/// tr.set(b"key", b"value");
/// let commit = tr.commit();
/// # Ok::<(), tkv::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Open a database.
    ///
    /// `cluster_file` is the path to the cluster description file; `None`
    /// uses the client's default resolution. A synchronous native failure
    /// surfaces the raw code.
    pub fn open(cluster_file: Option<&str>) -> Result<Self> {
        let path = match cluster_file {
            Some(p) => {
                Some(CString::new(p).map_err(|_| Error::InvalidArgument("cluster_file"))?)
            }
            None => None,
        };

        let mut ptr: *mut TkvDatabase = std::ptr::null_mut();
        let code = unsafe {
            ffi::tkv_create_database(
                path.as_ref().map(|p| p.as_ptr()).unwrap_or(std::ptr::null()),
                &mut ptr,
            )
        };
        check(code)?;

        Ok(Self {
            inner: Arc::new(DatabaseInner { ptr }),
        })
    }

    /// Set a database option. The code is an opaque integer passed through
    /// to the native client unchanged.
    pub fn set_option(&self, code: i32, value: OptionValue<'_>) -> Result<()> {
        let encoded = value.encode();
        let code = unsafe {
            ffi::tkv_database_set_option(self.inner.ptr, code, encoded.as_ptr(), encoded.len())
        };
        check(code)?;
        Ok(())
    }

    /// Begin a transaction against this database.
    pub fn create_transaction(&self) -> Result<Transaction> {
        let mut ptr = std::ptr::null_mut();
        let code = unsafe { ffi::tkv_database_create_transaction(self.inner.ptr, &mut ptr) };
        check(code)?;
        // Safety: the pointer is fresh from the native constructor.
        Ok(unsafe { Transaction::from_ptr(ptr, Arc::clone(&self.inner)) })
    }
}
