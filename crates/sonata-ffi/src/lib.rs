//! C FFI surface for sonata.
//!
//! Pattern: opaque PlayerHandle + C strings + JSON serialization.
//! Status-returning calls give 1 on success and 0 on error; the message is
//! then available from `sonata_last_error` on the same thread.
//!
//! Hosts that own their own playback engine (ExoPlayer, AVPlayer, ...)
//! open the player with `sonata_open_hosted` and forward the engine's
//! callbacks through the `sonata_report_*` functions.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sonata_core::{
    AudioItem, CallbackSink, Coordinator, EngineError, EngineState, EngineTransitionReason,
    PlaybackEngine, PlayerConfig, Subscription, SubscriptionId, TimeUnit,
};

// ---------------------------------------------------------------------------
// Error handling (thread-local last error)
// ---------------------------------------------------------------------------

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

fn set_error(msg: String) {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = Some(msg));
}

fn clear_error() {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = None);
}

/// Returns the last error message (caller frees with `sonata_string_free`).
#[no_mangle]
pub extern "C" fn sonata_last_error() -> *mut c_char {
    LAST_ERROR.with(|cell| {
        cell.borrow_mut()
            .take()
            .and_then(|s| CString::new(s).ok())
            .map(|s| s.into_raw())
            .unwrap_or(ptr::null_mut())
    })
}

/// Frees a string returned from sonata FFI.
///
/// # Safety
/// Must be a pointer returned from this FFI and not already freed.
#[no_mangle]
pub unsafe extern "C" fn sonata_string_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        let _ = CString::from_raw(ptr);
    }
}

/// Route `log` output to stderr, filtered by `RUST_LOG`. Safe to call twice.
#[no_mangle]
pub extern "C" fn sonata_init_logging() -> i32 {
    match env_logger::try_init() {
        Ok(()) => 1,
        Err(_) => 0,
    }
}

// ---------------------------------------------------------------------------
// Opaque handle
// ---------------------------------------------------------------------------

#[repr(C)]
pub struct PlayerHandle {
    _private: [u8; 0],
}

struct PlayerHandleInner {
    coordinator: Coordinator,
    hosted: Option<Arc<HostedEngine>>,
    subscriptions: Mutex<HashMap<u64, Arc<Mutex<Subscription>>>>,
}

// ---------------------------------------------------------------------------
// Hosted engine
// ---------------------------------------------------------------------------

/// Engine implemented by the host through C function pointers.
///
/// `ctx` is passed back unchanged on every call. Calls may arrive from any
/// thread; null entries are skipped.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SonataEngineVTable {
    pub ctx: *mut c_void,
    /// Receives the item as JSON. Returns nonzero if accepted.
    pub load: Option<extern "C" fn(ctx: *mut c_void, item_json: *const c_char) -> i32>,
    pub set_play_when_ready: Option<extern "C" fn(ctx: *mut c_void, play_when_ready: i32)>,
    pub prepare: Option<extern "C" fn(ctx: *mut c_void)>,
    pub play: Option<extern "C" fn(ctx: *mut c_void)>,
    pub pause: Option<extern "C" fn(ctx: *mut c_void)>,
    pub seek_to: Option<extern "C" fn(ctx: *mut c_void, position_ms: u64)>,
    /// Returns nonzero on success.
    pub release: Option<extern "C" fn(ctx: *mut c_void) -> i32>,
    pub is_playing: Option<extern "C" fn(ctx: *mut c_void) -> i32>,
}

struct HostedEngine {
    vtable: SonataEngineVTable,
    sink: Mutex<Option<CallbackSink>>,
    released: AtomicBool,
}

// The host guarantees `ctx` may be used from any thread; see `sonata_open_hosted`.
unsafe impl Send for HostedEngine {}
unsafe impl Sync for HostedEngine {}

impl HostedEngine {
    fn sink(&self) -> Result<CallbackSink, String> {
        self.sink
            .lock()
            .clone()
            .ok_or_else(|| "nothing loaded yet".to_string())
    }
}

impl PlaybackEngine for HostedEngine {
    fn load(&self, item: Arc<AudioItem>, sink: CallbackSink) -> Result<(), EngineError> {
        if self.is_released() {
            return Err(EngineError::Released);
        }
        let json = CString::new(item.to_value().to_string())
            .map_err(|e| EngineError::Backend(e.to_string()))?;
        // Install the new sink first: the host may report synchronously.
        let previous = self.sink.lock().replace(sink);
        let accepted = match self.vtable.load {
            Some(f) => f(self.vtable.ctx, json.as_ptr()) != 0,
            None => true,
        };
        if !accepted {
            *self.sink.lock() = previous;
            return Err(EngineError::Backend("host rejected load".into()));
        }
        Ok(())
    }

    fn set_play_when_ready(&self, play_when_ready: bool) {
        if let Some(f) = self.vtable.set_play_when_ready {
            f(self.vtable.ctx, play_when_ready as i32);
        }
    }

    fn prepare(&self) {
        if let Some(f) = self.vtable.prepare {
            f(self.vtable.ctx);
        }
    }

    fn play(&self) {
        if let Some(f) = self.vtable.play {
            f(self.vtable.ctx);
        }
    }

    fn pause(&self) {
        if let Some(f) = self.vtable.pause {
            f(self.vtable.ctx);
        }
    }

    fn seek_to(&self, position_ms: u64) {
        if let Some(f) = self.vtable.seek_to {
            f(self.vtable.ctx, position_ms);
        }
    }

    fn release(&self) -> Result<(), EngineError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.sink.lock().take();
        match self.vtable.release {
            Some(f) if f(self.vtable.ctx) == 0 => {
                Err(EngineError::Backend("host failed to release".into()))
            }
            _ => Ok(()),
        }
    }

    fn is_playing(&self) -> bool {
        match self.vtable.is_playing {
            Some(f) => f(self.vtable.ctx) != 0,
            None => false,
        }
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

fn read_config(config_json: *const c_char) -> Result<PlayerConfig, String> {
    if config_json.is_null() {
        return Ok(PlayerConfig::default());
    }
    read_cstr(config_json).map(|s| PlayerConfig::from_json(&s))
}

fn into_handle(coordinator: Coordinator, hosted: Option<Arc<HostedEngine>>) -> *mut PlayerHandle {
    let inner = PlayerHandleInner {
        coordinator,
        hosted,
        subscriptions: Mutex::new(HashMap::new()),
    };
    Box::into_raw(Box::new(inner)) as *mut PlayerHandle
}

/// Opens a player over the built-in engine (native audio when compiled
/// with the `native` feature, simulation otherwise). `config_json` may be
/// NULL for defaults. Returns NULL on error.
///
/// # Safety
/// `config_json` must be NULL or a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn sonata_open(config_json: *const c_char) -> *mut PlayerHandle {
    clear_error();
    let config = match read_config(config_json) {
        Ok(c) => c,
        Err(e) => return err_handle(e),
    };

    #[cfg(feature = "native")]
    let opened = Coordinator::with_config(Arc::new(sonata_core::engine::NativeEngine::default()), config);
    #[cfg(not(feature = "native"))]
    let opened = Coordinator::simulated(config);

    match opened {
        Ok(coordinator) => into_handle(coordinator, None),
        Err(e) => err_handle(e.to_string()),
    }
}

/// Opens a player over an engine the host implements.
///
/// # Safety
/// `config_json` must be NULL or a valid C string. `vtable` must point to a
/// valid table whose functions and `ctx` stay usable, from any thread, until
/// `sonata_close` returns.
#[no_mangle]
pub unsafe extern "C" fn sonata_open_hosted(
    config_json: *const c_char,
    vtable: *const SonataEngineVTable,
) -> *mut PlayerHandle {
    clear_error();
    if vtable.is_null() {
        return err_handle("null engine vtable".into());
    }
    let config = match read_config(config_json) {
        Ok(c) => c,
        Err(e) => return err_handle(e),
    };
    let engine = Arc::new(HostedEngine {
        vtable: *vtable,
        sink: Mutex::new(None),
        released: AtomicBool::new(false),
    });
    match Coordinator::with_config(engine.clone(), config) {
        Ok(coordinator) => into_handle(coordinator, Some(engine)),
        Err(e) => err_handle(e.to_string()),
    }
}

/// Stops the player and frees the handle.
#[no_mangle]
pub extern "C" fn sonata_close(handle: *mut PlayerHandle) {
    if !handle.is_null() {
        unsafe {
            let inner = Box::from_raw(handle as *mut PlayerHandleInner);
            if let Err(e) = inner.coordinator.stop() {
                log::warn!("sonata: close: {}", e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Load an item (AudioItem JSON). `play_when_ready` < 0 uses the configured
/// default. Returns 1 on success, 0 on error.
#[no_mangle]
pub extern "C" fn sonata_load(
    handle: *mut PlayerHandle,
    item_json: *const c_char,
    play_when_ready: i32,
) -> i32 {
    clear_error();
    let inner = match inner_ref(handle) {
        Ok(i) => i,
        Err(e) => return err_status(e),
    };
    let json_str = match read_cstr(item_json) {
        Ok(s) => s,
        Err(e) => return err_status(e),
    };
    let value: serde_json::Value = match serde_json::from_str(&json_str) {
        Ok(v) => v,
        Err(e) => return err_status(e.to_string()),
    };
    let item = match AudioItem::from_value(&value) {
        Ok(item) => item,
        Err(e) => return err_status(e.to_string()),
    };
    let result = if play_when_ready < 0 {
        inner.coordinator.load_with_defaults(item)
    } else {
        inner.coordinator.load(item, play_when_ready != 0)
    };
    status(result)
}

#[no_mangle]
pub extern "C" fn sonata_play(handle: *mut PlayerHandle) -> i32 {
    clear_error();
    match inner_ref(handle) {
        Ok(inner) => status(inner.coordinator.play()),
        Err(e) => err_status(e),
    }
}

#[no_mangle]
pub extern "C" fn sonata_pause(handle: *mut PlayerHandle) -> i32 {
    clear_error();
    match inner_ref(handle) {
        Ok(inner) => status(inner.coordinator.pause()),
        Err(e) => err_status(e),
    }
}

#[no_mangle]
pub extern "C" fn sonata_toggle_play(handle: *mut PlayerHandle) -> i32 {
    clear_error();
    match inner_ref(handle) {
        Ok(inner) => status(inner.coordinator.toggle_play()),
        Err(e) => err_status(e),
    }
}

/// Seek to `duration` in the unit given by `unit_code`
/// (0 ns, 1 µs, 2 ms, 3 s, 4 min, 5 h, 6 days).
#[no_mangle]
pub extern "C" fn sonata_seek(handle: *mut PlayerHandle, duration: i64, unit_code: i32) -> i32 {
    clear_error();
    let inner = match inner_ref(handle) {
        Ok(i) => i,
        Err(e) => return err_status(e),
    };
    let Some(unit) = TimeUnit::from_code(unit_code) else {
        return err_status(format!("unknown time unit code {}", unit_code));
    };
    status(inner.coordinator.seek(duration, unit))
}

/// Stop playback for good. The handle stays valid until `sonata_close`.
#[no_mangle]
pub extern "C" fn sonata_stop(handle: *mut PlayerHandle) -> i32 {
    clear_error();
    match inner_ref(handle) {
        Ok(inner) => status(inner.coordinator.stop()),
        Err(e) => err_status(e),
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Current state name, e.g. `"playing"` (caller frees).
#[no_mangle]
pub extern "C" fn sonata_current_state(handle: *mut PlayerHandle) -> *mut c_char {
    clear_error();
    match inner_ref(handle) {
        Ok(inner) => to_cstr(inner.coordinator.current_state().as_str().to_string()),
        Err(e) => err_null(e),
    }
}

/// Current item as JSON (caller frees). NULL without error when none is loaded.
#[no_mangle]
pub extern "C" fn sonata_current_item(handle: *mut PlayerHandle) -> *mut c_char {
    clear_error();
    let inner = match inner_ref(handle) {
        Ok(i) => i,
        Err(e) => return err_null(e),
    };
    match inner.coordinator.current_item() {
        Some(item) => json_to_cstr(&*item),
        None => ptr::null_mut(),
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Subscribe to events. Returns a subscription id, or 0 on error.
#[no_mangle]
pub extern "C" fn sonata_subscribe(handle: *mut PlayerHandle) -> u64 {
    clear_error();
    let inner = match inner_ref(handle) {
        Ok(i) => i,
        Err(e) => {
            set_error(e);
            return 0;
        }
    };
    match inner.coordinator.subscribe() {
        Ok(sub) => {
            let id = sub.id().as_u64();
            inner.subscriptions.lock().insert(id, Arc::new(Mutex::new(sub)));
            id
        }
        Err(e) => {
            set_error(e.to_string());
            0
        }
    }
}

/// Wait up to `timeout_ms` for the next event of subscription `id`.
///
/// Returns event JSON `{"kind": ..., "payload": ...}` (caller frees), or
/// NULL when nothing arrived in time or the stream ended. NULL with an error
/// set means the id is unknown.
#[no_mangle]
pub extern "C" fn sonata_poll_event(handle: *mut PlayerHandle, id: u64, timeout_ms: u64) -> *mut c_char {
    clear_error();
    let inner = match inner_ref(handle) {
        Ok(i) => i,
        Err(e) => return err_null(e),
    };
    let sub = match inner.subscriptions.lock().get(&id) {
        Some(sub) => Arc::clone(sub),
        None => return err_null(format!("unknown subscription {}", id)),
    };
    let event = {
        let sub = sub.lock();
        if timeout_ms == 0 {
            sub.try_recv()
        } else {
            sub.recv_timeout(Duration::from_millis(timeout_ms))
        }
    };
    match event {
        Some(event) => to_cstr(event.to_value().to_string()),
        None => ptr::null_mut(),
    }
}

/// Returns 1 if the subscription existed.
#[no_mangle]
pub extern "C" fn sonata_unsubscribe(handle: *mut PlayerHandle, id: u64) -> i32 {
    clear_error();
    let inner = match inner_ref(handle) {
        Ok(i) => i,
        Err(e) => return err_status(e),
    };
    let known = inner.subscriptions.lock().remove(&id).is_some();
    inner.coordinator.unsubscribe(SubscriptionId::from_u64(id));
    if known {
        1
    } else {
        err_status(format!("unknown subscription {}", id))
    }
}

// ---------------------------------------------------------------------------
// Hosted engine reporting
// ---------------------------------------------------------------------------

fn hosted_sink(handle: *mut PlayerHandle) -> Result<CallbackSink, String> {
    let inner = inner_ref(handle)?;
    let hosted = inner
        .hosted
        .as_ref()
        .ok_or_else(|| "player was not opened with a hosted engine".to_string())?;
    hosted.sink()
}

/// Report an engine state code (1 idle, 2 buffering, 3 ready, 4 ended).
#[no_mangle]
pub extern "C" fn sonata_report_state(handle: *mut PlayerHandle, state_code: i32) -> i32 {
    clear_error();
    let sink = match hosted_sink(handle) {
        Ok(s) => s,
        Err(e) => return err_status(e),
    };
    match EngineState::from_code(state_code) {
        Some(state) => {
            sink.state(state);
            1
        }
        None => {
            log::warn!("sonata: ignoring unknown engine state code {}", state_code);
            err_status(format!("unknown engine state code {}", state_code))
        }
    }
}

#[no_mangle]
pub extern "C" fn sonata_report_loading(handle: *mut PlayerHandle, is_loading: i32) -> i32 {
    clear_error();
    match hosted_sink(handle) {
        Ok(sink) => {
            sink.loading(is_loading != 0);
            1
        }
        Err(e) => err_status(e),
    }
}

#[no_mangle]
pub extern "C" fn sonata_report_playing(handle: *mut PlayerHandle, is_playing: i32) -> i32 {
    clear_error();
    match hosted_sink(handle) {
        Ok(sink) => {
            sink.playing(is_playing != 0);
            1
        }
        Err(e) => err_status(e),
    }
}

/// Report the engine's own play-when-ready flag, e.g. after the user paused
/// from a notification or the host lost audio focus.
#[no_mangle]
pub extern "C" fn sonata_report_play_when_ready(handle: *mut PlayerHandle, play_when_ready: i32) -> i32 {
    clear_error();
    match hosted_sink(handle) {
        Ok(sink) => {
            sink.play_when_ready(play_when_ready != 0);
            1
        }
        Err(e) => err_status(e),
    }
}

/// Report a media item transition (0 repeat, 1 auto, 2 seek, 3 playlist changed).
#[no_mangle]
pub extern "C" fn sonata_report_transition(handle: *mut PlayerHandle, reason_code: i32) -> i32 {
    clear_error();
    let sink = match hosted_sink(handle) {
        Ok(s) => s,
        Err(e) => return err_status(e),
    };
    match EngineTransitionReason::from_code(reason_code) {
        Some(reason) => {
            sink.transition(reason);
            1
        }
        None => {
            log::warn!("sonata: ignoring unknown transition reason {}", reason_code);
            err_status(format!("unknown transition reason code {}", reason_code))
        }
    }
}

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// Returns the FFI API version.
#[no_mangle]
pub extern "C" fn sonata_version() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn inner_ref<'a>(handle: *mut PlayerHandle) -> Result<&'a PlayerHandleInner, String> {
    if handle.is_null() {
        return Err("null player handle".into());
    }
    Ok(unsafe { &*(handle as *mut PlayerHandleInner) })
}

fn read_cstr(ptr: *const c_char) -> Result<String, String> {
    if ptr.is_null() {
        return Err("null string pointer".into());
    }
    unsafe {
        CStr::from_ptr(ptr)
            .to_str()
            .map(String::from)
            .map_err(|_| "invalid utf-8".into())
    }
}

fn status(result: sonata_core::PlayerResult<()>) -> i32 {
    match result {
        Ok(()) => 1,
        Err(e) => err_status(e.to_string()),
    }
}

fn json_to_cstr<T: serde::Serialize>(value: &T) -> *mut c_char {
    match serde_json::to_string(value) {
        Ok(json) => to_cstr(json),
        Err(e) => err_null(e.to_string()),
    }
}

fn to_cstr(s: String) -> *mut c_char {
    CString::new(s)
        .map(|c| c.into_raw())
        .unwrap_or(ptr::null_mut())
}

fn err_null(msg: String) -> *mut c_char {
    set_error(msg);
    ptr::null_mut()
}

fn err_status(msg: String) -> i32 {
    set_error(msg);
    0
}

fn err_handle(msg: String) -> *mut PlayerHandle {
    set_error(msg);
    ptr::null_mut()
}

// ---------------------------------------------------------------------------
// FFI Integration Tests
// ---------------------------------------------------------------------------
