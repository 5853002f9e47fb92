//! FFI bindings for Posture Nudge
//!
//! This module provides C-compatible functions for driving the engine from a
//! mobile UI layer. All functions use C strings (null-terminated) carrying JSON
//! and return allocated memory that must be freed by the caller using
//! `nudge_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::CoachEngine;
use crate::error::CoachError;
use crate::settings::{Settings, SettingsPatch};
use crate::storage::{KeyValueStore, MemoryStore, STATE_KEYS};
use crate::types::Period;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Serialize a result to an owned C string, recording any error
fn json_result<T: serde::Serialize>(result: Result<T, CoachError>) -> *mut c_char {
    match result.and_then(|value| serde_json::to_string(&value).map_err(CoachError::from)) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Map a unit result to a C status code (0 ok, -1 error)
fn status_result(result: Result<(), CoachError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Export engine state as a JSON object keyed like the persistent store
fn export_state(engine: &CoachEngine) -> Result<serde_json::Value, CoachError> {
    let store = MemoryStore::new();
    engine.save(&store)?;
    let mut state = serde_json::Map::new();
    for key in STATE_KEYS {
        if let Some(json) = store.get(key)? {
            state.insert(key.to_string(), serde_json::from_str(&json)?);
        }
    }
    Ok(serde_json::Value::Object(state))
}

/// Rebuild an engine from a state object produced by `export_state`
fn import_state(config: EngineConfig, state_json: &str) -> Result<CoachEngine, CoachError> {
    let state: serde_json::Map<String, serde_json::Value> = serde_json::from_str(state_json)?;
    let store = MemoryStore::new();
    for key in STATE_KEYS {
        if let Some(value) = state.get(key) {
            store.put(key, &value.to_string())?;
        }
    }
    CoachEngine::load(config, &store, Box::new(crate::channel::LogChannel))
}

unsafe fn parse_config(config_json: *const c_char) -> Result<EngineConfig, CoachError> {
    match cstr_to_string(config_json) {
        Some(json) if !json.trim().is_empty() => Ok(EngineConfig::from_json(&json)?),
        _ => Ok(EngineConfig::default()),
    }
}

// ============================================================================
// Engine lifecycle
// ============================================================================

/// Opaque handle to a CoachEngine
pub struct NudgeEngineHandle {
    engine: CoachEngine,
}

/// Create a new engine with first-run defaults.
///
/// # Safety
/// - `config_json` may be NULL (default config) or a valid null-terminated
///   `EngineConfig` JSON string.
/// - Returns a pointer that must be freed with `nudge_engine_free`.
/// - Returns NULL on error; call `nudge_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn nudge_engine_new(config_json: *const c_char) -> *mut NudgeEngineHandle {
    clear_last_error();

    match parse_config(config_json) {
        Ok(config) => Box::into_raw(Box::new(NudgeEngineHandle {
            engine: CoachEngine::new(config),
        })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Create an engine from state previously returned by `nudge_engine_save_state`.
///
/// # Safety
/// - `config_json` may be NULL; `state_json` must be a valid null-terminated C string.
/// - Returns a pointer that must be freed with `nudge_engine_free`.
/// - Returns NULL on error; call `nudge_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn nudge_engine_restore(
    config_json: *const c_char,
    state_json: *const c_char,
) -> *mut NudgeEngineHandle {
    clear_last_error();

    let state_str = match cstr_to_string(state_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid state string pointer");
            return ptr::null_mut();
        }
    };

    match parse_config(config_json).and_then(|config| import_state(config, &state_str)) {
        Ok(engine) => Box::into_raw(Box::new(NudgeEngineHandle { engine })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `nudge_engine_new` or
///   `nudge_engine_restore`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn nudge_engine_free(engine: *mut NudgeEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Serialize settings, exception apps, history and usage to one JSON object.
///
/// # Safety
/// - `engine` must be a valid engine pointer.
/// - Returns a newly allocated string that must be freed with `nudge_free_string`.
/// - Returns NULL on error; call `nudge_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn nudge_engine_save_state(engine: *mut NudgeEngineHandle) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    json_result(export_state(&(*engine).engine))
}

// ============================================================================
// Sensor input
// ============================================================================

/// Feed one `RawMotion` JSON sample and return the `SampleOutcome` JSON.
///
/// Dropped samples are not errors, including input that is not valid sample
/// JSON; the outcome reports `"accepted": false` and the drop is counted in
/// the classifier metrics.
///
/// # Safety
/// - `engine` must be a valid engine pointer.
/// - `sample_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `nudge_free_string`.
/// - Returns NULL only for invalid pointers; call `nudge_last_error` for details.
#[no_mangle]
pub unsafe extern "C" fn nudge_engine_process_sample(
    engine: *mut NudgeEngineHandle,
    sample_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &mut *engine;

    let sample_str = match cstr_to_string(sample_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid sample string pointer");
            return ptr::null_mut();
        }
    };

    json_result(Ok(handle.engine.process_sample_json(&sample_str)))
}

/// Advance engine time to an RFC 3339 timestamp.
///
/// # Safety
/// - `engine` must be a valid engine pointer.
/// - `timestamp` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn nudge_engine_tick(
    engine: *mut NudgeEngineHandle,
    timestamp: *const c_char,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    let handle = &mut *engine;

    let parsed = cstr_to_string(timestamp)
        .ok_or_else(|| CoachError::ParseError("Invalid timestamp string pointer".to_string()))
        .and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| CoachError::ParseError(format!("{}: {}", s, e)))
        });

    status_result(parsed.map(|now| handle.engine.tick(now)))
}

/// Pause (0) or resume (non-zero) monitoring.
///
/// # Safety
/// - `engine` must be a valid engine pointer.
#[no_mangle]
pub unsafe extern "C" fn nudge_engine_set_monitoring(engine: *mut NudgeEngineHandle, enabled: i32) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    let handle = &mut *engine;
    if enabled != 0 {
        handle.engine.resume();
    } else {
        handle.engine.pause();
    }
    0
}

// ============================================================================
// Settings and exceptions
// ============================================================================

/// Current settings as JSON.
///
/// # Safety
/// - `engine` must be a valid engine pointer.
/// - Returns a newly allocated string that must be freed with `nudge_free_string`.
#[no_mangle]
pub unsafe extern "C" fn nudge_engine_get_settings(engine: *mut NudgeEngineHandle) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    json_result(Ok(Settings::clone(&(*engine).engine.settings())))
}

/// Apply a `SettingsPatch` JSON and return the resulting settings JSON.
///
/// An invalid patch leaves settings unchanged.
///
/// # Safety
/// - `engine` must be a valid engine pointer.
/// - `patch_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `nudge_free_string`.
/// - Returns NULL on error; call `nudge_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn nudge_engine_update_settings(
    engine: *mut NudgeEngineHandle,
    patch_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &mut *engine;

    let patch_str = match cstr_to_string(patch_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid patch string pointer");
            return ptr::null_mut();
        }
    };

    json_result(
        serde_json::from_str::<SettingsPatch>(&patch_str)
            .map_err(CoachError::from)
            .and_then(|patch| handle.engine.update_settings(&patch))
            .map(|updated| Settings::clone(&updated)),
    )
}

/// Register an exception app.
///
/// # Safety
/// - `engine` must be a valid engine pointer.
/// - `name` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error (including duplicates).
#[no_mangle]
pub unsafe extern "C" fn nudge_engine_add_exception(
    engine: *mut NudgeEngineHandle,
    name: *const c_char,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    let handle = &mut *engine;

    match cstr_to_string(name) {
        Some(name) => status_result(handle.engine.add_exception(&name)),
        None => {
            set_last_error("Invalid name string pointer");
            -1
        }
    }
}

/// Remove an exception app.
///
/// # Safety
/// - `engine` must be a valid engine pointer.
/// - `name` must be a valid null-terminated C string.
/// - Returns 1 if removed, 0 if it was not registered, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn nudge_engine_remove_exception(
    engine: *mut NudgeEngineHandle,
    name: *const c_char,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    let handle = &mut *engine;

    match cstr_to_string(name) {
        Some(name) => i32::from(handle.engine.remove_exception(&name)),
        None => {
            set_last_error("Invalid name string pointer");
            -1
        }
    }
}

/// Exception apps as a JSON array of names.
///
/// # Safety
/// - `engine` must be a valid engine pointer.
/// - Returns a newly allocated string that must be freed with `nudge_free_string`.
#[no_mangle]
pub unsafe extern "C" fn nudge_engine_exception_apps(engine: *mut NudgeEngineHandle) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    json_result(Ok((*engine).engine.exception_apps()))
}

// ============================================================================
// History and statistics
// ============================================================================

/// Reminder history page (newest first) as a JSON array.
///
/// # Safety
/// - `engine` must be a valid engine pointer.
/// - Returns a newly allocated string that must be freed with `nudge_free_string`.
#[no_mangle]
pub unsafe extern "C" fn nudge_engine_list_history(
    engine: *mut NudgeEngineHandle,
    limit: u32,
    offset: u32,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    json_result(Ok((*engine).engine.list_history(limit as usize, offset as usize)))
}

/// Mark a reminder as acknowledged.
///
/// # Safety
/// - `engine` must be a valid engine pointer.
/// - `id` must be a valid null-terminated UUID string.
/// - Returns 0 on success, -1 on error (unknown or malformed id).
#[no_mangle]
pub unsafe extern "C" fn nudge_engine_acknowledge(
    engine: *mut NudgeEngineHandle,
    id: *const c_char,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }

    let handle = &*engine;

    let parsed = cstr_to_string(id)
        .ok_or_else(|| CoachError::ParseError("Invalid id string pointer".to_string()))
        .and_then(|s| {
            Uuid::parse_str(&s).map_err(|e| CoachError::ParseError(format!("{}: {}", s, e)))
        });

    status_result(parsed.and_then(|id| handle.engine.acknowledge(id)))
}

/// Usage report for a period (`week`, `month`, `quarter` or `year`) as JSON.
///
/// # Safety
/// - `engine` must be a valid engine pointer.
/// - `period` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `nudge_free_string`.
/// - Returns NULL on error; call `nudge_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn nudge_engine_summary(
    engine: *mut NudgeEngineHandle,
    period: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &*engine;

    let parsed = cstr_to_string(period)
        .ok_or_else(|| CoachError::ParseError("Invalid period string pointer".to_string()))
        .and_then(|s| s.parse::<Period>().map_err(CoachError::ParseError));

    json_result(parsed.map(|period| handle.engine.report(period)))
}

/// Engine counters as JSON.
///
/// # Safety
/// - `engine` must be a valid engine pointer.
/// - Returns a newly allocated string that must be freed with `nudge_free_string`.
#[no_mangle]
pub unsafe extern "C" fn nudge_engine_metrics(engine: *mut NudgeEngineHandle) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    json_result(Ok((*engine).engine.metrics()))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Nudge functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Nudge function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn nudge_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Nudge function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn nudge_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn nudge_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        nudge_free_string(ptr);
        s
    }

    fn walking_sample(sec: i64) -> CString {
        let timestamp = DateTime::parse_from_rfc3339("2024-01-17T14:00:00Z").unwrap()
            + chrono::Duration::seconds(sec);
        CString::new(format!(
            r#"{{"timestamp":"{}","motion_intensity":1.5,"step_cadence":100.0,"tilt_deg":60.0,"foreground_app":"sns"}}"#,
            timestamp.to_rfc3339()
        ))
        .unwrap()
    }

    #[test]
    fn test_ffi_engine_lifecycle() {
        unsafe {
            let engine = nudge_engine_new(ptr::null());
            assert!(!engine.is_null());

            let mut reminded = false;
            for i in 0..12 {
                let sample = walking_sample(i * 5);
                let outcome = take_string(nudge_engine_process_sample(engine, sample.as_ptr()));
                reminded |= outcome.contains("\"reminder\"");
            }
            assert!(reminded);

            let history = take_string(nudge_engine_list_history(engine, 10, 0));
            let events: Vec<serde_json::Value> = serde_json::from_str(&history).unwrap();
            assert_eq!(events.len(), 1);

            let id = CString::new(events[0]["id"].as_str().unwrap()).unwrap();
            assert_eq!(nudge_engine_acknowledge(engine, id.as_ptr()), 0);

            nudge_engine_free(engine);
        }
    }

    #[test]
    fn test_ffi_settings_and_exceptions() {
        unsafe {
            let engine = nudge_engine_new(ptr::null());

            let patch = CString::new(r#"{"walking_sensitivity": 90}"#).unwrap();
            let settings = take_string(nudge_engine_update_settings(engine, patch.as_ptr()));
            assert!(settings.contains("\"walking_sensitivity\":90"));

            let bad = CString::new(r#"{"walking_sensitivity": 5}"#).unwrap();
            assert!(nudge_engine_update_settings(engine, bad.as_ptr()).is_null());
            assert!(!nudge_last_error().is_null());
            let settings = take_string(nudge_engine_get_settings(engine));
            assert!(settings.contains("\"walking_sensitivity\":90"));

            let name = CString::new("전화").unwrap();
            assert_eq!(nudge_engine_add_exception(engine, name.as_ptr()), -1);
            assert_eq!(nudge_engine_remove_exception(engine, name.as_ptr()), 1);
            assert_eq!(nudge_engine_remove_exception(engine, name.as_ptr()), 0);
            assert_eq!(nudge_engine_add_exception(engine, name.as_ptr()), 0);

            nudge_engine_free(engine);
        }
    }

    #[test]
    fn test_ffi_state_roundtrip() {
        unsafe {
            let engine = nudge_engine_new(ptr::null());
            for i in 0..12 {
                let sample = walking_sample(i * 5);
                nudge_free_string(nudge_engine_process_sample(engine, sample.as_ptr()));
            }
            let state = nudge_engine_save_state(engine);
            assert!(!state.is_null());

            let restored = nudge_engine_restore(ptr::null(), state);
            assert!(!restored.is_null());
            let history = take_string(nudge_engine_list_history(restored, 10, 0));
            let events: Vec<serde_json::Value> = serde_json::from_str(&history).unwrap();
            assert_eq!(events.len(), 1);

            nudge_free_string(state);
            nudge_engine_free(engine);
            nudge_engine_free(restored);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let engine = nudge_engine_new(ptr::null());

            let garbage = CString::new("not json").unwrap();
            let outcome = take_string(nudge_engine_process_sample(engine, garbage.as_ptr()));
            let outcome: serde_json::Value = serde_json::from_str(&outcome).unwrap();
            assert_eq!(outcome["accepted"], serde_json::Value::Bool(false));
            assert!(nudge_last_error().is_null());

            let metrics = take_string(nudge_engine_metrics(engine));
            let metrics: serde_json::Value = serde_json::from_str(&metrics).unwrap();
            assert_eq!(metrics["classifier"]["dropped_samples"], 1);
            assert_eq!(metrics["classifier"]["accepted_samples"], 0);

            let sample = walking_sample(0);
            let outcome = take_string(nudge_engine_process_sample(engine, sample.as_ptr()));
            assert!(outcome.contains("\"accepted\":true"));

            assert!(nudge_engine_process_sample(engine, ptr::null()).is_null());
            let error = CStr::from_ptr(nudge_last_error()).to_str().unwrap();
            assert!(!error.is_empty());

            let period = CString::new("decade").unwrap();
            assert!(nudge_engine_summary(engine, period.as_ptr()).is_null());

            let unknown = CString::new(Uuid::new_v4().to_string()).unwrap();
            assert_eq!(nudge_engine_acknowledge(engine, unknown.as_ptr()), -1);

            assert!(nudge_engine_get_settings(ptr::null_mut()).is_null());

            nudge_engine_free(engine);
        }
    }

    #[test]
    fn test_ffi_summary_and_version() {
        unsafe {
            let engine = nudge_engine_new(ptr::null());
            let period = CString::new("week").unwrap();
            let report = take_string(nudge_engine_summary(engine, period.as_ptr()));
            assert!(report.contains("\"buckets\""));
            nudge_engine_free(engine);

            let version = CStr::from_ptr(nudge_version()).to_str().unwrap();
            assert!(!version.is_empty());
        }
    }
}
