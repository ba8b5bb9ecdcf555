//! # Agri Offline Core
//!
//! Offline-first state core for a farming assistant mobile app. It keeps
//! farm records, the camera scan workflow and a market price/news cache in
//! three independent stores, persisted as JSON blobs in LMDB, and exposes
//! them to Flutter/React Native hosts over a C ABI.
//!
//! ## Stores
//!
//! - [`farm_store::FarmStore`] - plantings and harvests, written through on every change
//! - [`scan_store::ScanStore`] - scan state machine plus the offline upload queue
//! - [`market_store::MarketStore`] - prices and news behind a one hour TTL
//!
//! All three live in an [`app_core::AgriCore`] that the host creates once.
//!
//! ## Quick Start
//!
//! ```no_run
//! use agri_offline_core::{create_core, farm_add_planting, free_response};
//! use std::ffi::CString;
//!
//! let config = CString::new(r#"{"dbName":"my_farm"}"#).unwrap();
//! let core = create_core(config.as_ptr());
//!
//! let planting = CString::new(r#"{"cropName":"Tomato","plantingDate":"2024-01-01"}"#).unwrap();
//! let response = farm_add_planting(core, planting.as_ptr());
//! free_response(response as *mut _);
//! ```
//!
//! ## FFI Functions
//!
//! Every function except [`create_core`] returns a JSON-encoded
//! [`app_response::AppResponse`]; `Ok` carries the payload as a JSON string.
//! Release returned strings with [`free_response`].
//!
//! - Lifecycle: [`create_core`], [`close_core`], [`free_response`], [`subscribe_changes`], [`unsubscribe_changes`]
//! - Farm: [`farm_load`], [`farm_state`], [`farm_add_planting`], [`farm_update_planting`],
//!   [`farm_delete_planting`], [`farm_add_harvest`], [`farm_update_harvest`],
//!   [`farm_delete_harvest`], [`farm_active_plantings`], [`farm_upcoming_harvests`], [`farm_summary`],
//!   [`farm_set_loading`], [`farm_set_error`]
//! - Scan: [`scan_state`], [`scan_set_image`], [`scan_set_analysis_type`], [`scan_begin_analysis`],
//!   [`scan_complete_analysis`], [`scan_retry`], [`scan_reset`]
//! - Upload queue: [`queue_add`], [`queue_list`], [`queue_remove`]
//! - Market: [`market_state`], [`market_load_cache`], [`market_is_cache_valid`],
//!   [`market_set_prices`], [`market_set_news`], [`market_set_loading`], [`market_set_error`],
//!   [`market_clear_cache`]
//!
//! The host owns network access. A market refresh from the host looks like
//! `market_set_loading(core, true)`, the HTTP call, then either
//! [`market_set_prices`]/[`market_set_news`] or [`market_set_error`].

pub mod app_core;
pub mod app_response;
pub mod clock;
pub mod config;
pub mod farm_model;
pub mod farm_store;
pub mod local_db_state;
pub mod market_model;
pub mod market_store;
pub mod observer;
pub mod scan_model;
pub mod scan_store;
pub mod services;
pub mod storage;

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::app_core::AgriCore;
use crate::app_response::AppResponse;
use crate::config::CoreConfig;
use crate::farm_model::{HarvestPatch, NewHarvest, NewPlanting, PlantingPatch};
use crate::market_model::{Article, PriceQuote};
use crate::observer::SubscriptionId;
use crate::scan_model::{AnalysisCompletion, AnalysisType};

/// Host callback for store changes: `topic` is `farm`, `scan` or `market`,
/// `payload` the JSON snapshot of that store. Both pointers are only valid
/// for the duration of the call.
///
/// Callbacks run after the FFI call that caused the change has finished
/// with the core, just before it returns, so a callback may call back into
/// any function of this library with the same core pointer.
pub type ChangeCallback = extern "C" fn(topic: *const c_char, payload: *const c_char);

struct PendingChange {
    callback: ChangeCallback,
    topic: &'static str,
    payload: String,
}

thread_local! {
    static PENDING_CHANGES: RefCell<Vec<PendingChange>> = RefCell::new(Vec::new());
}

macro_rules! try_ffi {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(error_ptr) => return error_ptr,
        }
    };
}

/// Creates the core, opening `<dbName>.lmdb` and loading persisted state.
///
/// # Parameters
///
/// * `config_json` - Null-terminated JSON [`CoreConfig`], or null / empty for the defaults
///
/// # Returns
///
/// A pointer to the [`AgriCore`], or null if the config is invalid or the
/// database cannot be opened. Release it with [`close_core`].
///
/// # Safety
///
/// `config_json` must be null or point to a valid null-terminated string.
///
/// # JSON Format
///
/// ```json
/// { "dbName": "my_farm", "marketCacheTtlMs": 3600000, "plantingDeletePolicy": "retain" }
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_core(config_json: *const c_char) -> *mut AgriCore {
    let config = if config_json.is_null() {
        CoreConfig::default()
    } else {
        let raw = match unsafe { CStr::from_ptr(config_json).to_str() } {
            Ok(s) => s,
            Err(e) => {
                warn!("Invalid UTF-8 in config parameter: {e}");
                return std::ptr::null_mut();
            }
        };
        match CoreConfig::from_json_str(raw) {
            Ok(config) => config,
            Err(e) => {
                warn!("Rejected core config: {e}");
                return std::ptr::null_mut();
            }
        }
    };

    info!("Opening core database '{}'", config.db_name);
    match AgriCore::open(config) {
        Ok(core) => Box::into_raw(Box::new(core)),
        Err(e) => {
            warn!("Failed to initialize core: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Flushes storage and frees the core.
///
/// # Parameters
///
/// * `core` - Pointer returned by [`create_core`]
///
/// # Returns
///
/// `Ok` on success, `BadRequest` for a null pointer, `DatabaseError` if the
/// final sync fails (the core is freed either way).
///
/// # Safety
///
/// `core` must come from [`create_core`] and must not be used afterwards.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_core(core: *mut AgriCore) -> *const c_char {
    if core.is_null() {
        let error = AppResponse::BadRequest("Null core pointer passed to close_core".to_string());
        return response_to_c_string(&error);
    }

    let core = unsafe { Box::from_raw(core) };
    match core.close() {
        Ok(()) => response_to_c_string(&AppResponse::success("Core closed successfully")),
        Err(e) => response_to_c_string(&e),
    }
}

/// Frees a string returned by any function in this library. Null is ignored.
///
/// # Safety
///
/// `ptr` must have been returned by this library and not freed before.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_response(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

/// Forwards every store change to `callback`.
///
/// # Parameters
///
/// * `core` - Pointer returned by [`create_core`]
/// * `callback` - Function called with the topic and the store snapshot
///
/// # Returns
///
/// The subscription ids as `{"farm":n,"scan":n,"market":n}`, which
/// [`unsubscribe_changes`] accepts back.
///
/// # Safety
///
/// `callback` must stay callable until it is unsubscribed or the core is closed.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn subscribe_changes(core: *mut AgriCore, callback: ChangeCallback) -> *const c_char {
    with_core(core, "subscribe_changes", |core| {
        let ids = ChangeSubscriptions {
            farm: core.farm.subscribe(move |state| queue_change(callback, "farm", state)),
            scan: core.scan.subscribe(move |session| queue_change(callback, "scan", session)),
            market: core.market.subscribe(move |state| queue_change(callback, "market", state)),
        };
        json_response(&ids)
    })
}

/// Removes the listeners registered by [`subscribe_changes`].
///
/// # Parameters
///
/// * `core` - Pointer returned by [`create_core`]
/// * `ids_json` - The JSON object [`subscribe_changes`] returned
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn unsubscribe_changes(core: *mut AgriCore, ids_json: *const c_char) -> *const c_char {
    with_core(core, "unsubscribe_changes", |core| {
        let ids: ChangeSubscriptions = try_ffi!(parse_json_arg(ids_json, "subscription ids"));
        core.farm.unsubscribe(ids.farm);
        core.scan.unsubscribe(ids.scan);
        core.market.unsubscribe(ids.market);
        response_to_c_string(&AppResponse::success("Unsubscribed"))
    })
}

// ---------------------------------------------------------------------------
// Farm
// ---------------------------------------------------------------------------

/// Reloads plantings and harvests from storage and returns the farm state.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn farm_load(core: *mut AgriCore) -> *const c_char {
    with_core(core, "farm_load", |core| {
        core.farm.load_farm_data();
        json_response(core.farm.state())
    })
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn farm_state(core: *mut AgriCore) -> *const c_char {
    with_core(core, "farm_state", |core| json_response(core.farm.state()))
}

/// Adds a planting.
///
/// # Parameters
///
/// * `core` - Pointer returned by [`create_core`]
/// * `json_ptr` - Null-terminated JSON planting input
///
/// # Returns
///
/// The stored planting, with `id`, `status` (`planned`) and `createdAt`
/// filled in. `SerializationError` if the JSON does not parse.
///
/// # Safety
///
/// Both pointers must be valid; `json_ptr` must be null-terminated.
///
/// # JSON Format
///
/// ```json
/// {
///   "cropName": "Tomato",
///   "variety": "Roma",
///   "plantingDate": "2024-01-01",
///   "expectedHarvestDate": "2024-03-15",
///   "area": "0.5"
/// }
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn farm_add_planting(core: *mut AgriCore, json_ptr: *const c_char) -> *const c_char {
    with_core(core, "farm_add_planting", |core| {
        let input: NewPlanting = try_ffi!(parse_json_arg(json_ptr, "planting"));
        json_response(&core.farm.add_planting(input))
    })
}

/// Merges a partial planting into the planting with `id`.
///
/// # Parameters
///
/// * `core` - Pointer returned by [`create_core`]
/// * `id` - Null-terminated planting id
/// * `json_ptr` - Null-terminated JSON with any subset of the planting fields
///
/// # Returns
///
/// The updated planting, or `NotFound` when no planting has that id (nothing
/// is written in that case).
///
/// # Safety
///
/// All pointers must be valid; strings must be null-terminated.
///
/// # JSON Format
///
/// Absent fields are left alone; `null` clears `variety`,
/// `expectedHarvestDate`, `area` or `notes`:
///
/// ```json
/// { "status": "growing", "expectedHarvestDate": null }
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn farm_update_planting(
    core: *mut AgriCore,
    id: *const c_char,
    json_ptr: *const c_char,
) -> *const c_char {
    with_core(core, "farm_update_planting", |core| {
        let id = try_ffi!(c_ptr_to_string(id, "id"));
        let patch: PlantingPatch = try_ffi!(parse_json_arg(json_ptr, "planting patch"));

        if !core.farm.update_planting(&id, patch) {
            return not_found("planting", &id);
        }
        match core.farm.planting(&id) {
            Some(planting) => json_response(planting),
            None => not_found("planting", &id),
        }
    })
}

/// Deletes a planting. Linked harvests are handled per the configured
/// `plantingDeletePolicy`.
///
/// # Safety
///
/// Both pointers must be valid; `id` must be null-terminated.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn farm_delete_planting(core: *mut AgriCore, id: *const c_char) -> *const c_char {
    with_core(core, "farm_delete_planting", |core| {
        let id = try_ffi!(c_ptr_to_string(id, "id"));
        if core.farm.delete_planting(&id) {
            response_to_c_string(&AppResponse::success("Planting deleted successfully"))
        } else {
            not_found("planting", &id)
        }
    })
}

/// Adds a harvest. When `plantingId` names an existing planting, that
/// planting is marked `harvested`.
///
/// # Parameters
///
/// * `core` - Pointer returned by [`create_core`]
/// * `json_ptr` - Null-terminated JSON harvest input
///
/// # Returns
///
/// The stored harvest with `id` and `createdAt`; `unit` defaults to `kg`
/// and `quality` to `average`.
///
/// # Safety
///
/// Both pointers must be valid; `json_ptr` must be null-terminated.
///
/// # JSON Format
///
/// ```json
/// {
///   "cropName": "Tomato",
///   "harvestDate": "2024-03-01",
///   "yield": 150,
///   "unit": "kg",
///   "quality": "good",
///   "plantingId": "1704096000000"
/// }
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn farm_add_harvest(core: *mut AgriCore, json_ptr: *const c_char) -> *const c_char {
    with_core(core, "farm_add_harvest", |core| {
        let input: NewHarvest = try_ffi!(parse_json_arg(json_ptr, "harvest"));
        json_response(&core.farm.add_harvest(input))
    })
}

/// Merges a partial harvest into the harvest with `id`. `null` clears
/// `notes` or `plantingId`. No planting is touched.
///
/// # Safety
///
/// All pointers must be valid; strings must be null-terminated.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn farm_update_harvest(
    core: *mut AgriCore,
    id: *const c_char,
    json_ptr: *const c_char,
) -> *const c_char {
    with_core(core, "farm_update_harvest", |core| {
        let id = try_ffi!(c_ptr_to_string(id, "id"));
        let patch: HarvestPatch = try_ffi!(parse_json_arg(json_ptr, "harvest patch"));

        if !core.farm.update_harvest(&id, patch) {
            return not_found("harvest", &id);
        }
        match core.farm.harvest(&id) {
            Some(harvest) => json_response(harvest),
            None => not_found("harvest", &id),
        }
    })
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn farm_delete_harvest(core: *mut AgriCore, id: *const c_char) -> *const c_char {
    with_core(core, "farm_delete_harvest", |core| {
        let id = try_ffi!(c_ptr_to_string(id, "id"));
        if core.farm.delete_harvest(&id) {
            response_to_c_string(&AppResponse::success("Harvest deleted successfully"))
        } else {
            not_found("harvest", &id)
        }
    })
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn farm_active_plantings(core: *mut AgriCore) -> *const c_char {
    with_core(core, "farm_active_plantings", |core| json_response(&core.farm.active_plantings()))
}

/// Unharvested plantings expected within the configured window (14 days by default).
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn farm_upcoming_harvests(core: *mut AgriCore) -> *const c_char {
    with_core(core, "farm_upcoming_harvests", |core| json_response(&core.farm.upcoming_harvests()))
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn farm_summary(core: *mut AgriCore) -> *const c_char {
    with_core(core, "farm_summary", |core| json_response(&core.farm.summary()))
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn farm_set_loading(core: *mut AgriCore, loading: bool) -> *const c_char {
    with_core(core, "farm_set_loading", |core| {
        core.farm.set_loading(loading);
        json_response(core.farm.state())
    })
}

/// Sets the farm error field shown by the UI.
///
/// # Parameters
///
/// * `core` - Pointer returned by [`create_core`]
/// * `message` - Null-terminated message, or null to clear the error
///
/// # Returns
///
/// The farm state after the change.
///
/// # Safety
///
/// `core` must be valid; `message` must be null or null-terminated.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn farm_set_error(core: *mut AgriCore, message: *const c_char) -> *const c_char {
    with_core(core, "farm_set_error", |core| {
        let message = if message.is_null() {
            None
        } else {
            Some(try_ffi!(c_ptr_to_string(message, "message")))
        };
        core.farm.set_error(message);
        json_response(core.farm.state())
    })
}

// ---------------------------------------------------------------------------
// Scan workflow
// ---------------------------------------------------------------------------

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn scan_state(core: *mut AgriCore) -> *const c_char {
    with_core(core, "scan_state", |core| json_response(core.scan.session()))
}

/// Selects an image, clearing any previous result or error.
///
/// # Parameters
///
/// * `core` - Pointer returned by [`create_core`]
/// * `uri` - Null-terminated local image URI
///
/// # Safety
///
/// Both pointers must be valid; `uri` must be null-terminated.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn scan_set_image(core: *mut AgriCore, uri: *const c_char) -> *const c_char {
    with_core(core, "scan_set_image", |core| {
        let uri = try_ffi!(c_ptr_to_string(uri, "uri"));
        core.scan.set_image(uri);
        json_response(core.scan.session())
    })
}

/// `analysis_type` is one of `crop`, `soil`, `pest`; anything else is a
/// `ValidationError`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn scan_set_analysis_type(core: *mut AgriCore, analysis_type: *const c_char) -> *const c_char {
    with_core(core, "scan_set_analysis_type", |core| {
        let raw = try_ffi!(c_ptr_to_string(analysis_type, "analysis type"));
        match raw.parse::<AnalysisType>() {
            Ok(analysis_type) => {
                core.scan.set_analysis_type(analysis_type);
                json_response(core.scan.session())
            }
            Err(e) => response_to_c_string(&e),
        }
    })
}

/// Moves the scan to loading and returns the ticket to pass back to
/// [`scan_complete_analysis`] once the host's analysis call returns.
/// `BadRequest` when no image is selected.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn scan_begin_analysis(core: *mut AgriCore) -> *const c_char {
    with_core(core, "scan_begin_analysis", |core| match core.scan.begin_analysis() {
        Ok(ticket) => json_response(&ticket),
        Err(e) => response_to_c_string(&e),
    })
}

/// Applies an analysis outcome.
///
/// # Parameters
///
/// * `core` - Pointer returned by [`create_core`]
/// * `json_ptr` - Null-terminated JSON completion
///
/// # Returns
///
/// The scan session after the change. A stale ticket yields `NotFound` and
/// leaves the session untouched; a completion with more or less than one
/// outcome yields `BadRequest`.
///
/// # Safety
///
/// Both pointers must be valid; `json_ptr` must be null-terminated.
///
/// # JSON Format
///
/// ```json
/// { "ticket": { "generation": 3, "image": "file:///leaf.jpg", "analysisType": "crop" },
///   "result": { "cropName": "Tomato", "healthStatus": "warning" } }
/// ```
///
/// `result` is stored exactly as given. Instead of `result` the host may
/// send `"error": "Analysis failed"`, or `"offline": true` when the service
/// was unreachable; the latter queues the ticket's image for upload (even
/// for a stale ticket) and shows the offline message.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn scan_complete_analysis(core: *mut AgriCore, json_ptr: *const c_char) -> *const c_char {
    with_core(core, "scan_complete_analysis", |core| {
        let completion: AnalysisCompletion = try_ffi!(parse_json_arg(json_ptr, "completion"));
        let (ticket, outcome) = match completion.into_outcome() {
            Ok(parts) => parts,
            Err(e) => return response_to_c_string(&e),
        };

        if core.scan.finish_analysis(&ticket, outcome) {
            json_response(core.scan.session())
        } else {
            let stale = AppResponse::NotFound(format!(
                "Analysis ticket {} was superseded",
                ticket.generation
            ));
            response_to_c_string(&stale)
        }
    })
}

/// Re-runs a failed analysis on the same image and returns a new ticket.
/// `BadRequest` unless the session is in the error state.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn scan_retry(core: *mut AgriCore) -> *const c_char {
    with_core(core, "scan_retry", |core| match core.scan.retry() {
        Ok(ticket) => json_response(&ticket),
        Err(e) => response_to_c_string(&e),
    })
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn scan_reset(core: *mut AgriCore) -> *const c_char {
    with_core(core, "scan_reset", |core| {
        core.scan.reset_analysis();
        json_response(core.scan.session())
    })
}

/// Appends an image to the pending-upload queue.
///
/// # Parameters
///
/// * `core` - Pointer returned by [`create_core`]
/// * `image` - Null-terminated image URI
/// * `analysis_type` - Null-terminated `crop`, `soil` or `pest`
///
/// # Returns
///
/// The queued entry; its `timestamp` is the key for [`queue_remove`].
///
/// # Safety
///
/// All pointers must be valid; strings must be null-terminated.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn queue_add(
    core: *mut AgriCore,
    image: *const c_char,
    analysis_type: *const c_char,
) -> *const c_char {
    with_core(core, "queue_add", |core| {
        let image = try_ffi!(c_ptr_to_string(image, "image"));
        let raw_type = try_ffi!(c_ptr_to_string(analysis_type, "analysis type"));
        match raw_type.parse::<AnalysisType>() {
            Ok(analysis_type) => json_response(&core.scan.add_to_queue(image, analysis_type)),
            Err(e) => response_to_c_string(&e),
        }
    })
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn queue_list(core: *mut AgriCore) -> *const c_char {
    with_core(core, "queue_list", |core| json_response(core.scan.pending_uploads()))
}

/// Removes the queue entry enqueued at `timestamp` (ms since epoch) and
/// returns the remaining queue, or `NotFound`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn queue_remove(core: *mut AgriCore, timestamp: i64) -> *const c_char {
    with_core(core, "queue_remove", |core| {
        if core.scan.remove_from_queue(timestamp) {
            json_response(core.scan.pending_uploads())
        } else {
            not_found("queued upload", &timestamp.to_string())
        }
    })
}

// ---------------------------------------------------------------------------
// Market cache
// ---------------------------------------------------------------------------

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn market_state(core: *mut AgriCore) -> *const c_char {
    with_core(core, "market_state", |core| json_response(core.market.state()))
}

/// Replaces prices, news and `lastUpdated` with the persisted cache,
/// regardless of its age.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn market_load_cache(core: *mut AgriCore) -> *const c_char {
    with_core(core, "market_load_cache", |core| {
        core.market.load_cached_data();
        json_response(core.market.state())
    })
}

/// `Ok("true")` while the cache is younger than the TTL, `Ok("false")` otherwise.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn market_is_cache_valid(core: *mut AgriCore) -> *const c_char {
    with_core(core, "market_is_cache_valid", |core| json_response(&core.market.is_cache_valid()))
}

/// Replaces the price list and restamps the cache.
///
/// # Parameters
///
/// * `core` - Pointer returned by [`create_core`]
/// * `json_ptr` - Null-terminated JSON array of price quotes
///
/// # Returns
///
/// The market state after the change; loading and error are cleared.
///
/// # Safety
///
/// Both pointers must be valid; `json_ptr` must be null-terminated.
///
/// # JSON Format
///
/// ```json
/// [{ "cropName": "Tomato", "currentPrice": 45.5, "unit": "kg", "change": 5.2,
///    "trend": "up", "lastUpdated": "2024-01-22T00:00:00.000Z",
///    "history": [{ "date": "2024-01-22", "price": 45.5 }] }]
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn market_set_prices(core: *mut AgriCore, json_ptr: *const c_char) -> *const c_char {
    with_core(core, "market_set_prices", |core| {
        let prices: Vec<PriceQuote> = try_ffi!(parse_json_arg(json_ptr, "prices"));
        core.market.set_prices(prices);
        json_response(core.market.state())
    })
}

/// Replaces the news list (a JSON array of articles) and restamps the cache.
///
/// # Safety
///
/// Both pointers must be valid; `json_ptr` must be null-terminated.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn market_set_news(core: *mut AgriCore, json_ptr: *const c_char) -> *const c_char {
    with_core(core, "market_set_news", |core| {
        let news: Vec<Article> = try_ffi!(parse_json_arg(json_ptr, "news"));
        core.market.set_news(news);
        json_response(core.market.state())
    })
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn market_set_loading(core: *mut AgriCore, loading: bool) -> *const c_char {
    with_core(core, "market_set_loading", |core| {
        core.market.set_loading(loading);
        json_response(core.market.state())
    })
}

/// Records a failed market fetch. Cached lists stay visible and loading is
/// cleared.
///
/// # Parameters
///
/// * `core` - Pointer returned by [`create_core`]
/// * `message` - Null-terminated error message
///
/// # Safety
///
/// Both pointers must be valid; `message` must be null-terminated.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn market_set_error(core: *mut AgriCore, message: *const c_char) -> *const c_char {
    with_core(core, "market_set_error", |core| {
        let message = try_ffi!(c_ptr_to_string(message, "message"));
        core.market.set_error(message);
        json_response(core.market.state())
    })
}

/// Deletes the persisted cache and empties prices and news. If the durable
/// delete fails the cache is left as it was.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn market_clear_cache(core: *mut AgriCore) -> *const c_char {
    with_core(core, "market_clear_cache", |core| {
        core.market.clear_cache();
        json_response(core.market.state())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
struct ChangeSubscriptions {
    farm: SubscriptionId,
    scan: SubscriptionId,
    market: SubscriptionId,
}

/// Runs `op` on the core, then delivers the change notifications it
/// produced. The `&mut AgriCore` is gone by the time callbacks run.
fn with_core<F>(core: *mut AgriCore, caller: &str, op: F) -> *const c_char
where
    F: FnOnce(&mut AgriCore) -> *const c_char,
{
    let response = match core_mut(core, caller) {
        Ok(core) => op(core),
        Err(error_ptr) => error_ptr,
    };
    deliver_changes();
    response
}

fn queue_change<T: Serialize>(callback: ChangeCallback, topic: &'static str, snapshot: &T) {
    match serde_json::to_string(snapshot) {
        Ok(payload) => PENDING_CHANGES.with(|pending| {
            pending.borrow_mut().push(PendingChange { callback, topic, payload });
        }),
        Err(e) => warn!("Error serializing {topic} snapshot: {e}"),
    }
}

fn deliver_changes() {
    loop {
        let batch = PENDING_CHANGES.with(|pending| std::mem::take(&mut *pending.borrow_mut()));
        if batch.is_empty() {
            return;
        }
        for change in batch {
            match (CString::new(change.topic), CString::new(change.payload)) {
                (Ok(topic), Ok(payload)) => (change.callback)(topic.as_ptr(), payload.as_ptr()),
                _ => warn!("Change payload for {} contained an interior NUL", change.topic),
            }
        }
    }
}

fn core_mut<'a>(core: *mut AgriCore, caller: &str) -> Result<&'a mut AgriCore, *const c_char> {
    match unsafe { core.as_mut() } {
        Some(core) => Ok(core),
        None => {
            let error = AppResponse::BadRequest(format!("Null core pointer passed to {caller}"));
            Err(response_to_c_string(&error))
        }
    }
}

fn not_found(kind: &str, id: &str) -> *const c_char {
    response_to_c_string(&AppResponse::NotFound(format!("No {kind} found with id: {id}")))
}

/// Serializes `value` and wraps it in `AppResponse::Ok`.
fn json_response<T: Serialize + ?Sized>(value: &T) -> *const c_char {
    match serde_json::to_string(value) {
        Ok(json) => response_to_c_string(&AppResponse::Ok(json)),
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Failed to serialize result: {e}"));
            response_to_c_string(&error)
        }
    }
}

fn parse_json_arg<T: DeserializeOwned>(ptr: *const c_char, field_name: &str) -> Result<T, *const c_char> {
    let json = c_ptr_to_string(ptr, field_name)?;
    serde_json::from_str(&json).map_err(|e| {
        let error = AppResponse::SerializationError(format!("Invalid {field_name} JSON: {e}"));
        response_to_c_string(&error)
    })
}

/// Converts an [`AppResponse`] to a C string the host must release with
/// [`free_response`]. Returns null if serialization fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to a Rust String, reporting null pointers and
/// invalid UTF-8 as `BadRequest` responses.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
