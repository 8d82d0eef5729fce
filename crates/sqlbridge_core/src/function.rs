//! Host functions callable from SQL.

use crate::codec;
use crate::error::{Error, Result};
use crate::value::Value;
use rusqlite::ffi;
use std::collections::HashMap;
use std::ffi::{c_int, c_void, CString};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Outcome of a host function call.
pub type FunctionResult = std::result::Result<Value, Box<dyn std::error::Error + Send + Sync>>;

type HostFn = dyn Fn(&[Value]) -> FunctionResult;

/// Boxed callback whose address is the engine's user data pointer.
struct FunctionSlot {
    name: CString,
    callback: Box<HostFn>,
}

/// Host functions registered on one connection, by name.
///
/// A slot must stay allocated for as long as the engine may call it, so it
/// is dropped only after the engine-side registration has been removed.
#[derive(Default)]
pub(crate) struct FunctionRegistry {
    slots: HashMap<String, Box<FunctionSlot>>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("names", &self.slots.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FunctionRegistry {
    /// Installs `callback` as `name`, replacing any previous host function
    /// of that name. Returns the engine status of the installation.
    pub(crate) fn install(
        &mut self,
        db: *mut ffi::sqlite3,
        name: &str,
        callback: Box<HostFn>,
    ) -> Result<c_int> {
        let c_name = CString::new(name).map_err(|_| Error::InvalidString(name.to_string()))?;
        self.uninstall(db, name);

        let slot = Box::new(FunctionSlot {
            name: c_name,
            callback,
        });
        let user_data = std::ptr::from_ref::<FunctionSlot>(&slot)
            .cast_mut()
            .cast::<c_void>();
        // SAFETY: `db` is open; `user_data` points into the boxed slot which
        // is kept in `slots` until the registration is removed.
        let status = unsafe {
            ffi::sqlite3_create_function_v2(
                db,
                slot.name.as_ptr(),
                -1,
                ffi::SQLITE_UTF8,
                user_data,
                Some(trampoline),
                None,
                None,
                None,
            )
        };
        if status == ffi::SQLITE_OK {
            tracing::debug!(name, "registered host function");
            self.slots.insert(name.to_string(), slot);
        }
        Ok(status)
    }

    /// Removes the engine registration of `name`, then drops its slot.
    fn uninstall(&mut self, db: *mut ffi::sqlite3, name: &str) {
        let Some(slot) = self.slots.remove(name) else {
            return;
        };
        if !db.is_null() {
            // SAFETY: passing no callbacks deletes the function.
            unsafe {
                ffi::sqlite3_create_function_v2(
                    db,
                    slot.name.as_ptr(),
                    -1,
                    ffi::SQLITE_UTF8,
                    std::ptr::null_mut(),
                    None,
                    None,
                    None,
                    None,
                );
            }
        }
        tracing::debug!(name, "unregistered host function");
    }

    /// Unregisters every host function.
    pub(crate) fn clear(&mut self, db: *mut ffi::sqlite3) {
        let names: Vec<String> = self.slots.keys().cloned().collect();
        for name in names {
            self.uninstall(db, &name);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "function panicked".to_string()
    }
}

unsafe extern "C" fn trampoline(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    let slot = &*ffi::sqlite3_user_data(ctx).cast::<FunctionSlot>();
    let argc = usize::try_from(argc).unwrap_or(0);
    let args: Vec<Value> = if argv.is_null() {
        Vec::new()
    } else {
        std::slice::from_raw_parts(argv, argc)
            .iter()
            .map(|value| codec::read_arg(*value))
            .collect()
    };

    match catch_unwind(AssertUnwindSafe(|| (slot.callback)(&args))) {
        Ok(Ok(value)) => codec::set_result(ctx, &value),
        Ok(Err(e)) => codec::set_error(ctx, &e.to_string()),
        Err(payload) => codec::set_error(ctx, &panic_message(payload.as_ref())),
    }
}
