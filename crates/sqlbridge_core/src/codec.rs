//! Value codec: host values to engine parameters and back.
//!
//! All tag dispatch between [`Value`] and the engine's storage classes
//! happens here, so statements and function trampolines share one set of
//! coercion rules.

use crate::arena::Arena;
use crate::config::ReadOptions;
use crate::error::{Error, Result};
use crate::value::{exact_i32, SqlType, Value};
use rusqlite::ffi;
use std::ffi::{c_char, c_int, c_void};

fn length(len: usize) -> Result<c_int> {
    c_int::try_from(len).map_err(|_| Error::engine("string or blob too big"))
}

/// Binds `value` at the 1-based `index` and returns the engine status.
///
/// Text and blob bytes are copied into `arena` and bound without an engine
/// side copy, so the arena must outlive the bind cycle.
pub(crate) fn bind_value(
    stmt: *mut ffi::sqlite3_stmt,
    arena: &mut Arena,
    index: c_int,
    value: &Value,
) -> Result<c_int> {
    // SAFETY: `stmt` is a live statement handle and every pointer bound
    // below stays allocated in `arena` until the next reset or free.
    let status = unsafe {
        match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, index),
            Value::Bool(b) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*b)),
            Value::Number(n) => match exact_i32(*n) {
                Some(i) => ffi::sqlite3_bind_int(stmt, index, i),
                None => ffi::sqlite3_bind_double(stmt, index, *n),
            },
            Value::BigInt(n) => bind_text(stmt, arena, index, &n.to_string())?,
            Value::Text(s) => bind_text(stmt, arena, index, s)?,
            Value::Blob(bytes) => {
                let len = length(bytes.len())?;
                let ptr = arena.alloc_bytes(bytes)?;
                ffi::sqlite3_bind_blob(
                    stmt,
                    index,
                    ptr.as_ptr().cast::<c_void>(),
                    len,
                    ffi::SQLITE_STATIC(),
                )
            }
        }
    };
    Ok(status)
}

unsafe fn bind_text(
    stmt: *mut ffi::sqlite3_stmt,
    arena: &mut Arena,
    index: c_int,
    text: &str,
) -> Result<c_int> {
    let len = length(text.len())?;
    let ptr = arena.alloc_str(text)?;
    Ok(ffi::sqlite3_bind_text(
        stmt,
        index,
        ptr.as_ptr().cast::<c_char>(),
        len,
        ffi::SQLITE_STATIC(),
    ))
}

/// Reads column `index` of the current row.
pub(crate) fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int, options: ReadOptions) -> Value {
    // SAFETY: `stmt` is a live statement positioned on a row and `index`
    // is below its data count. Text and blob pointers are copied before
    // any other call on the column.
    unsafe {
        match SqlType::from_code(ffi::sqlite3_column_type(stmt, index)) {
            SqlType::Integer if options.use_big_int => {
                let text = column_string(stmt, index);
                text.parse::<i64>()
                    .map_or_else(|_| Value::Number(ffi::sqlite3_column_double(stmt, index)), Value::BigInt)
            }
            SqlType::Integer | SqlType::Float => Value::Number(ffi::sqlite3_column_double(stmt, index)),
            SqlType::Text => Value::Text(column_string(stmt, index)),
            SqlType::Blob => Value::Blob(column_bytes(stmt, index)),
            SqlType::Null => Value::Null,
        }
    }
}

/// Copies column `index` as raw bytes regardless of its storage class.
pub(crate) unsafe fn column_bytes(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Vec<u8> {
    let ptr = ffi::sqlite3_column_blob(stmt, index);
    let len = ffi::sqlite3_column_bytes(stmt, index);
    copy_bytes(ptr.cast::<u8>(), len)
}

/// Reads column `index` as text regardless of its storage class.
pub(crate) unsafe fn column_string(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> String {
    let ptr = ffi::sqlite3_column_text(stmt, index);
    let len = ffi::sqlite3_column_bytes(stmt, index);
    String::from_utf8_lossy(&copy_bytes(ptr, len)).into_owned()
}

/// Reads a host function argument.
///
/// Integers arrive as numbers, like default column reads.
pub(crate) unsafe fn read_arg(value: *mut ffi::sqlite3_value) -> Value {
    match SqlType::from_code(ffi::sqlite3_value_type(value)) {
        SqlType::Integer | SqlType::Float => Value::Number(ffi::sqlite3_value_double(value)),
        SqlType::Text => {
            let ptr = ffi::sqlite3_value_text(value);
            let len = ffi::sqlite3_value_bytes(value);
            Value::Text(String::from_utf8_lossy(&copy_bytes(ptr, len)).into_owned())
        }
        SqlType::Blob => {
            let ptr = ffi::sqlite3_value_blob(value);
            let len = ffi::sqlite3_value_bytes(value);
            Value::Blob(copy_bytes(ptr.cast::<u8>(), len))
        }
        SqlType::Null => Value::Null,
    }
}

/// Hands a host function's result back to the engine.
pub(crate) unsafe fn set_result(ctx: *mut ffi::sqlite3_context, value: &Value) {
    match value {
        Value::Null => ffi::sqlite3_result_null(ctx),
        Value::Bool(b) => ffi::sqlite3_result_int(ctx, c_int::from(*b)),
        Value::Number(n) => match exact_i32(*n) {
            Some(i) => ffi::sqlite3_result_int(ctx, i),
            None => ffi::sqlite3_result_double(ctx, *n),
        },
        Value::BigInt(n) => ffi::sqlite3_result_int64(ctx, *n),
        Value::Text(s) => match length(s.len()) {
            Ok(len) => ffi::sqlite3_result_text(
                ctx,
                s.as_ptr().cast::<c_char>(),
                len,
                ffi::SQLITE_TRANSIENT(),
            ),
            Err(e) => set_error(ctx, &e.to_string()),
        },
        Value::Blob(bytes) => match length(bytes.len()) {
            Ok(len) => ffi::sqlite3_result_blob(
                ctx,
                bytes.as_ptr().cast::<c_void>(),
                len,
                ffi::SQLITE_TRANSIENT(),
            ),
            Err(e) => set_error(ctx, &e.to_string()),
        },
    }
}

/// Reports `message` as the function's error result.
pub(crate) unsafe fn set_error(ctx: *mut ffi::sqlite3_context, message: &str) {
    let len = c_int::try_from(message.len()).unwrap_or(c_int::MAX);
    ffi::sqlite3_result_error(ctx, message.as_ptr().cast::<c_char>(), len);
}

unsafe fn copy_bytes(ptr: *const u8, len: c_int) -> Vec<u8> {
    let len = usize::try_from(len).unwrap_or(0);
    if ptr.is_null() || len == 0 {
        return Vec::new();
    }
    std::slice::from_raw_parts(ptr, len).to_vec()
}
