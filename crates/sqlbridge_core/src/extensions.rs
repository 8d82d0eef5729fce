//! Built-in text and statistics functions installed on every connection.
//!
//! These run entirely engine-side (they are not host functions and never
//! appear in the function registry). The text functions count characters,
//! not bytes, and return NULL when any argument is NULL. The aggregates
//! skip NULL and non-numeric inputs.

use crate::codec;
use crate::error::Result;
use crate::function::panic_message;
use crate::value::Value;
use rusqlite::ffi;
use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};

type Unary = fn(&str) -> String;
type Summary = fn(&[f64]) -> Option<f64>;

/// A text function taking a character count.
struct Counted {
    apply: fn(&str, usize) -> String,
    /// Upper bound of the result size in bytes; `None` on overflow.
    output_len: fn(&str, usize) -> Option<usize>,
}

const DOMAIN_ERROR: &str = "domain error";

/// Reverses the characters of `s`.
pub fn reverse(s: &str) -> String {
    s.chars().rev().collect()
}

/// Upper-cases the first letter of every word and lower-cases the rest.
pub fn proper(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut word_start = true;
    for c in s.chars() {
        if c.is_whitespace() {
            word_start = true;
            out.push(c);
        } else if word_start {
            word_start = false;
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Concatenates `count` copies of `s`.
pub fn replicate(s: &str, count: usize) -> String {
    s.repeat(count)
}

/// Left-pads `s` with spaces to `width` characters.
pub fn padl(s: &str, width: usize) -> String {
    let missing = width.saturating_sub(s.chars().count());
    format!("{}{s}", " ".repeat(missing))
}

/// Right-pads `s` with spaces to `width` characters.
pub fn padr(s: &str, width: usize) -> String {
    let missing = width.saturating_sub(s.chars().count());
    format!("{s}{}", " ".repeat(missing))
}

/// Centers `s` in `width` characters; an odd extra space goes right.
pub fn padc(s: &str, width: usize) -> String {
    let missing = width.saturating_sub(s.chars().count());
    let left = missing / 2;
    format!("{}{s}{}", " ".repeat(left), " ".repeat(missing - left))
}

/// The first `count` characters of `s`.
pub fn leftstr(s: &str, count: usize) -> String {
    s.chars().take(count).collect()
}

/// The last `count` characters of `s`.
pub fn rightstr(s: &str, count: usize) -> String {
    let skip = s.chars().count().saturating_sub(count);
    s.chars().skip(skip).collect()
}

/// The characters of `s` that also occur in `allowed`, in order.
pub fn strfilter(s: &str, allowed: &str) -> String {
    s.chars().filter(|c| allowed.contains(*c)).collect()
}

/// 1-based character position of `needle` in `haystack`, searching from
/// character `start` (also 1-based; 0 means 1). 0 when there is no match.
pub fn charindex(needle: &str, haystack: &str, start: usize) -> usize {
    let needle: Vec<char> = needle.chars().collect();
    let haystack: Vec<char> = haystack.chars().collect();
    if needle.is_empty() || needle.len() > haystack.len() {
        return 0;
    }
    let from = start.saturating_sub(1);
    (from..=haystack.len() - needle.len())
        .find(|&i| haystack[i..i + needle.len()] == needle[..])
        .map_or(0, |i| i + 1)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance; `None` for fewer than two values.
pub fn variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let squares: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some(squares / (values.len() - 1) as f64)
}

/// Sample standard deviation; `None` for fewer than two values.
pub fn stdev(values: &[f64]) -> Option<f64> {
    variance(values).map(f64::sqrt)
}

/// The most frequent value; `None` when empty or when several values tie.
pub fn mode(values: &[f64]) -> Option<f64> {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for v in values {
        // -0.0 and 0.0 count as one value.
        *counts.entry((v + 0.0).to_bits()).or_default() += 1;
    }
    let best = counts.values().copied().max()?;
    let mut winners = counts.iter().filter(|(_, &n)| n == best);
    match (winners.next(), winners.next()) {
        (Some((bits, _)), None) => Some(f64::from_bits(*bits)),
        _ => None,
    }
}

/// Value at fraction `p` of the sorted input. When `p * n` lands exactly
/// between two values their mean is returned.
fn quantile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let target = p * sorted.len() as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let index = target.floor() as usize;
    if target.fract() == 0.0 && index > 0 {
        Some((sorted[index - 1] + sorted[index.min(sorted.len() - 1)]) / 2.0)
    } else {
        Some(sorted[index.min(sorted.len() - 1)])
    }
}

/// The middle value, or the mean of the two middle values.
pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// The first quartile.
pub fn lower_quartile(values: &[f64]) -> Option<f64> {
    quantile(values, 0.25)
}

/// The third quartile.
pub fn upper_quartile(values: &[f64]) -> Option<f64> {
    quantile(values, 0.75)
}

/// Runs an entry body, turning a panic into an error result.
unsafe fn guarded(ctx: *mut ffi::sqlite3_context, body: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(body)) {
        codec::set_error(ctx, &panic_message(payload.as_ref()));
    }
}

/// Largest text the calling connection accepts, in bytes.
unsafe fn max_length(ctx: *mut ffi::sqlite3_context) -> usize {
    let db = ffi::sqlite3_context_db_handle(ctx);
    usize::try_from(ffi::sqlite3_limit(db, ffi::SQLITE_LIMIT_LENGTH, -1)).unwrap_or(0)
}

unsafe fn text_arg(value: *mut ffi::sqlite3_value) -> Option<String> {
    if ffi::sqlite3_value_type(value) == ffi::SQLITE_NULL {
        return None;
    }
    let ptr = ffi::sqlite3_value_text(value);
    let len = usize::try_from(ffi::sqlite3_value_bytes(value)).unwrap_or(0);
    if ptr.is_null() || len == 0 {
        return Some(String::new());
    }
    Some(String::from_utf8_lossy(std::slice::from_raw_parts(ptr, len)).into_owned())
}

/// Reads a count argument: `Ok(None)` for NULL, `Err` for a negative count.
unsafe fn count_arg(value: *mut ffi::sqlite3_value) -> std::result::Result<Option<usize>, ()> {
    if ffi::sqlite3_value_type(value) == ffi::SQLITE_NULL {
        return Ok(None);
    }
    usize::try_from(ffi::sqlite3_value_int64(value))
        .map(Some)
        .map_err(|_| ())
}

unsafe fn set_text(ctx: *mut ffi::sqlite3_context, text: Option<String>) {
    match text {
        Some(text) => codec::set_result(ctx, &Value::Text(text)),
        None => ffi::sqlite3_result_null(ctx),
    }
}

unsafe extern "C" fn unary_entry(
    ctx: *mut ffi::sqlite3_context,
    _argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    guarded(ctx, || {
        // SAFETY: registered with a `&'static Unary` as user data and
        // exactly one argument.
        let f = *ffi::sqlite3_user_data(ctx).cast::<Unary>();
        set_text(ctx, text_arg(*argv).map(|s| f(&s)));
    });
}

unsafe extern "C" fn counted_entry(
    ctx: *mut ffi::sqlite3_context,
    _argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    guarded(ctx, || {
        // SAFETY: registered with a `&'static Counted` as user data and
        // exactly two arguments.
        let f = &*ffi::sqlite3_user_data(ctx).cast::<Counted>();
        let count = match count_arg(*argv.add(1)) {
            Ok(Some(count)) => count,
            Ok(None) => return ffi::sqlite3_result_null(ctx),
            Err(()) => return codec::set_error(ctx, DOMAIN_ERROR),
        };
        let Some(text) = text_arg(*argv) else {
            return ffi::sqlite3_result_null(ctx);
        };
        match (f.output_len)(&text, count) {
            Some(len) if len <= max_length(ctx) => set_text(ctx, Some((f.apply)(&text, count))),
            _ => ffi::sqlite3_result_error_toobig(ctx),
        }
    });
}

unsafe extern "C" fn strfilter_entry(
    ctx: *mut ffi::sqlite3_context,
    _argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    guarded(ctx, || {
        let result = match (text_arg(*argv), text_arg(*argv.add(1))) {
            (Some(s), Some(allowed)) => Some(strfilter(&s, &allowed)),
            _ => None,
        };
        set_text(ctx, result);
    });
}

unsafe extern "C" fn charindex_entry(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    guarded(ctx, || {
        let start = if argc == 3 {
            if ffi::sqlite3_value_type(*argv.add(2)) == ffi::SQLITE_NULL {
                return ffi::sqlite3_result_null(ctx);
            }
            usize::try_from(ffi::sqlite3_value_int64(*argv.add(2))).unwrap_or(0)
        } else {
            1
        };
        match (text_arg(*argv), text_arg(*argv.add(1))) {
            (Some(needle), Some(haystack)) => {
                let position = charindex(&needle, &haystack, start);
                ffi::sqlite3_result_int64(ctx, i64::try_from(position).unwrap_or(i64::MAX));
            }
            _ => ffi::sqlite3_result_null(ctx),
        }
    });
}

/// Slot inside the aggregate context holding the boxed samples.
unsafe fn samples_slot(ctx: *mut ffi::sqlite3_context, allocate: bool) -> *mut *mut Vec<f64> {
    let size = if allocate {
        c_int::try_from(std::mem::size_of::<*mut Vec<f64>>()).unwrap_or(0)
    } else {
        0
    };
    ffi::sqlite3_aggregate_context(ctx, size).cast::<*mut Vec<f64>>()
}

unsafe extern "C" fn aggregate_step(
    ctx: *mut ffi::sqlite3_context,
    _argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    guarded(ctx, || {
        let value = *argv;
        match ffi::sqlite3_value_numeric_type(value) {
            ffi::SQLITE_INTEGER | ffi::SQLITE_FLOAT => {}
            _ => return,
        }
        let slot = samples_slot(ctx, true);
        if slot.is_null() {
            return ffi::sqlite3_result_error_nomem(ctx);
        }
        // The context starts zeroed, so the first step sees a null slot.
        if (*slot).is_null() {
            *slot = Box::into_raw(Box::default());
        }
        (**slot).push(ffi::sqlite3_value_double(value));
    });
}

unsafe extern "C" fn aggregate_final(ctx: *mut ffi::sqlite3_context) {
    // Runs even after a failed step, so the samples are always reclaimed here.
    let slot = samples_slot(ctx, false);
    let samples = if slot.is_null() || (*slot).is_null() {
        Vec::new()
    } else {
        let boxed = Box::from_raw(*slot);
        *slot = std::ptr::null_mut();
        *boxed
    };
    guarded(ctx, || {
        // SAFETY: registered with a `&'static Summary` as user data.
        let summary = *ffi::sqlite3_user_data(ctx).cast::<Summary>();
        match summary(&samples) {
            Some(v) => codec::set_result(ctx, &Value::Number(v)),
            None => ffi::sqlite3_result_null(ctx),
        }
    });
}

static UNARY: [(&CStr, Unary); 2] = [(c"reverse", reverse as Unary), (c"proper", proper as Unary)];

fn repeated_len(s: &str, count: usize) -> Option<usize> {
    s.len().checked_mul(count)
}

fn padded_len(s: &str, width: usize) -> Option<usize> {
    s.len().checked_add(width)
}

fn same_len(s: &str, _count: usize) -> Option<usize> {
    Some(s.len())
}

static COUNTED: [(&CStr, Counted); 6] = [
    (c"replicate", Counted { apply: replicate, output_len: repeated_len }),
    (c"padl", Counted { apply: padl, output_len: padded_len }),
    (c"padr", Counted { apply: padr, output_len: padded_len }),
    (c"padc", Counted { apply: padc, output_len: padded_len }),
    (c"leftstr", Counted { apply: leftstr, output_len: same_len }),
    (c"rightstr", Counted { apply: rightstr, output_len: same_len }),
];

static AGGREGATES: [(&CStr, Summary); 6] = [
    (c"variance", variance as Summary),
    (c"stdev", stdev as Summary),
    (c"mode", mode as Summary),
    (c"median", median as Summary),
    (c"lower_quartile", lower_quartile as Summary),
    (c"upper_quartile", upper_quartile as Summary),
];

type ScalarEntry = unsafe extern "C" fn(*mut ffi::sqlite3_context, c_int, *mut *mut ffi::sqlite3_value);

unsafe fn install_scalar(
    db: *mut ffi::sqlite3,
    name: &CStr,
    arity: c_int,
    user_data: *mut c_void,
    entry: ScalarEntry,
) -> c_int {
    ffi::sqlite3_create_function_v2(
        db,
        name.as_ptr().cast::<c_char>(),
        arity,
        ffi::SQLITE_UTF8 | ffi::SQLITE_DETERMINISTIC,
        user_data,
        Some(entry),
        None,
        None,
        None,
    )
}

unsafe fn install_aggregate(db: *mut ffi::sqlite3, name: &CStr, user_data: *mut c_void) -> c_int {
    ffi::sqlite3_create_function_v2(
        db,
        name.as_ptr().cast::<c_char>(),
        1,
        ffi::SQLITE_UTF8 | ffi::SQLITE_DETERMINISTIC,
        user_data,
        None,
        Some(aggregate_step),
        Some(aggregate_final),
        None,
    )
}

fn static_data<T>(item: &'static T) -> *mut c_void {
    std::ptr::from_ref(item).cast_mut().cast::<c_void>()
}

/// Installs every built-in function on `db`, stopping at the first
/// failing status.
pub(crate) fn register(conn: &crate::connection::Connection) -> Result<()> {
    let db = conn.raw()?;
    // SAFETY (all blocks below): `db` is open and every user data pointer
    // refers to a static table entry.
    for (name, f) in &UNARY {
        conn.check(unsafe { install_scalar(db, name, 1, static_data(f), unary_entry) })?;
    }
    for (name, f) in &COUNTED {
        conn.check(unsafe { install_scalar(db, name, 2, static_data(f), counted_entry) })?;
    }
    let null = std::ptr::null_mut();
    conn.check(unsafe { install_scalar(db, c"strfilter", 2, null, strfilter_entry) })?;
    for arity in [2, 3] {
        conn.check(unsafe { install_scalar(db, c"charindex", arity, null, charindex_entry) })?;
    }
    for (name, f) in &AGGREGATES {
        conn.check(unsafe { install_aggregate(db, name, static_data(f)) })?;
    }
    tracing::trace!("registered extension functions");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_counts_characters() {
        assert_eq!(reverse("abc"), "cba");
        assert_eq!(reverse("héllo"), "olléh");
        assert_eq!(reverse(""), "");
    }

    #[test]
    fn proper_capitalizes_words() {
        assert_eq!(proper("hello wORLD"), "Hello World");
        assert_eq!(proper("  two  spaces"), "  Two  Spaces");
    }

    #[test]
    fn replicate_repeats() {
        assert_eq!(replicate("ab", 3), "ababab");
        assert_eq!(replicate("ab", 0), "");
    }

    #[test]
    fn padding() {
        assert_eq!(padl("ab", 5), "   ab");
        assert_eq!(padr("ab", 5), "ab   ");
        assert_eq!(padc("ab", 5), " ab  ");
        assert_eq!(padl("abcdef", 3), "abcdef");
        assert_eq!(padc("é", 3), " é ");
    }

    #[test]
    fn substrings() {
        assert_eq!(leftstr("héllo", 2), "hé");
        assert_eq!(rightstr("héllo", 3), "llo");
        assert_eq!(leftstr("ab", 10), "ab");
        assert_eq!(rightstr("ab", 10), "ab");
    }

    #[test]
    fn output_bounds_cover_results_and_detect_overflow() {
        assert_eq!(repeated_len("ab", usize::MAX), None);
        assert_eq!(padded_len("a", usize::MAX), None);
        assert!(padded_len("é", 3).unwrap() >= padc("é", 3).len());
        assert_eq!(repeated_len("ab", 3), Some(replicate("ab", 3).len()));
    }

    #[test]
    fn strfilter_keeps_allowed_characters() {
        assert_eq!(strfilter("abcabc", "bc"), "bcbc");
        assert_eq!(strfilter("héllo", "é"), "é");
        assert_eq!(strfilter("abc", ""), "");
    }

    #[test]
    fn charindex_positions() {
        assert_eq!(charindex("b", "abcabc", 1), 2);
        assert_eq!(charindex("b", "abcabc", 3), 5);
        assert_eq!(charindex("b", "abcabc", 0), 2);
        assert_eq!(charindex("x", "abc", 1), 0);
        assert_eq!(charindex("c", "éc", 1), 2);
        assert_eq!(charindex("", "abc", 1), 0);
        assert_eq!(charindex("abcd", "abc", 1), 0);
        assert_eq!(charindex("b", "abc", 9), 0);
    }

    #[test]
    fn spread_statistics() {
        assert_eq!(variance(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), Some(32.0 / 7.0));
        assert_eq!(stdev(&[1.0, 3.0]), Some(2.0_f64.sqrt()));
        assert_eq!(variance(&[1.0]), None);
        assert_eq!(stdev(&[]), None);
    }

    #[test]
    fn mode_requires_a_unique_winner() {
        assert_eq!(mode(&[1.0, 2.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(mode(&[1.0, 1.0, 2.0, 2.0]), None);
        assert_eq!(mode(&[0.0, -0.0, 1.0]), Some(0.0));
        assert_eq!(mode(&[]), None);
    }

    #[test]
    fn quantiles() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[7.0]), Some(7.0));
        assert_eq!(median(&[]), None);
        assert_eq!(lower_quartile(&[1.0, 2.0, 3.0, 4.0]), Some(1.5));
        assert_eq!(upper_quartile(&[1.0, 2.0, 3.0, 4.0]), Some(3.5));
        assert_eq!(lower_quartile(&[1.0, 2.0, 3.0, 4.0, 5.0]), Some(2.0));
        assert_eq!(upper_quartile(&[1.0, 2.0, 3.0, 4.0, 5.0]), Some(4.0));
    }
}
