//! Shared, read-only-after-init context passed to every worker (spec.md
//! §9's "global mutable state → explicit context" re-architecture).

use crate::bearerbox::BearerboxLink;
use crate::config::OtaConfig;
use crossbeam_channel::{Receiver, Sender};
use dlr_store::DlrStore;
use sms_proto::{Counter, Message};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use timer_heap::{Queue as TimerQueue, Timer, TimerSet};
use urltrans::{UrlTranslation, UrlTransTable};

/// A message held back by a `deferred=` request (spec.md §4.1's "available
/// to any component requiring deferred events"), carrying whatever
/// translation produced it so the eventual send can still honor its
/// header/footer/split settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredSend {
    pub id: u64,
    pub msg: Message,
    pub translation: Option<UrlTranslation>,
}

/// What the HTTP result loop (C7) needs to reassemble a reply once a
/// GET/POST service call completes: the swapped-address message skeleton
/// and the translation that issued the request.
#[derive(Debug, Clone)]
pub struct Correlation {
    pub skeleton: Message,
    pub translation: UrlTranslation,
}

/// A completed HTTP call, handed from an obey worker (C6) to the result
/// loop (C7) via [`AppState::http_completions`].
#[derive(Debug)]
pub struct HttpCompletion {
    pub correlation_id: String,
    pub status: Option<u16>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Default)]
pub struct Counters {
    pub catenated_sms_counter: Counter,
    pub num_outstanding_requests: Counter,
    pub request_ids: Counter,
    pub deferred_ids: Counter,
}

pub struct AppState {
    pub translations: Arc<UrlTransTable>,
    pub dlr: Arc<DlrStore>,
    pub bearerbox: Arc<BearerboxLink>,
    pub mo_queue: (Sender<Message>, Receiver<Message>),
    pub http_completions: (Sender<HttpCompletion>, Receiver<HttpCompletion>),
    pub correlations: Mutex<HashMap<String, Correlation>>,
    pub http_client: reqwest::blocking::Client,
    pub counters: Counters,
    pub shutting_down: Arc<AtomicBool>,
    /// Mirrors `program_status`'s `running`/`suspended` distinction
    /// (spec.md §4.9): while set, the obey loop keeps draining the MO
    /// queue but takes the discard path for every message instead of
    /// dispatching it.
    pub suspended: AtomicBool,
    pub global_sender: Option<String>,
    pub max_octets: usize,
    pub ota_configs: Vec<OtaConfig>,
    /// The timer set (C1) backing `deferred=` sendsms requests. Each
    /// deferred message gets its own timer whose elapse is published onto
    /// `deferred_queue`; `deferred_timers` keeps the `Timer` handles alive
    /// until they elapse (dropping a `Timer` cancels it).
    pub timers: TimerSet<DeferredSend>,
    pub deferred_queue: Arc<TimerQueue<DeferredSend>>,
    pub deferred_timers: Mutex<HashMap<u64, Timer<DeferredSend>>>,
}

impl AppState {
    pub fn new(
        translations: UrlTransTable,
        dlr: DlrStore,
        bearerbox: BearerboxLink,
        global_sender: Option<String>,
        max_octets: usize,
        ota_configs: Vec<OtaConfig>,
    ) -> Self {
        AppState {
            translations: Arc::new(translations),
            dlr: Arc::new(dlr),
            bearerbox: Arc::new(bearerbox),
            mo_queue: crossbeam_channel::unbounded(),
            http_completions: crossbeam_channel::unbounded(),
            correlations: Mutex::new(HashMap::new()),
            http_client: reqwest::blocking::Client::new(),
            counters: Counters::default(),
            shutting_down: Arc::new(AtomicBool::new(false)),
            suspended: AtomicBool::new(false),
            global_sender,
            max_octets,
            ota_configs,
            timers: TimerSet::create(),
            deferred_queue: Arc::new(TimerQueue::new()),
            deferred_timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn find_ota_config(&self, id: &str) -> Option<&OtaConfig> {
        self.ota_configs.iter().find(|c| c.id == id)
    }

    /// Holds `msg`/`translation` back for `deferred_minutes`, per spec.md
    /// §4.1's generic timer facility. Assigns the pair a fresh id (stamped
    /// onto the returned `DeferredSend`) so the later elapse can be matched
    /// back to its `Timer` handle in `deferred_timers`.
    pub fn schedule_deferred(&self, msg: Message, translation: Option<UrlTranslation>, deferred_minutes: u32) {
        let id = self.counters.deferred_ids.increase();
        let send = DeferredSend { id, msg, translation };
        let timer = self.timers.create_timer(Arc::clone(&self.deferred_queue));
        timer.start(i64::from(deferred_minutes) * 60, send);
        self.deferred_timers.lock().unwrap().insert(id, timer);
    }

    /// Drops the `Timer` handle for an elapsed deferred send. Called by the
    /// deferred-dispatch worker once it has consumed the elapsed data off
    /// `deferred_queue`; the `Timer` is already inactive at that point, so
    /// this just reclaims the slot.
    pub fn forget_deferred(&self, id: u64) {
        self.deferred_timers.lock().unwrap().remove(&id);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.suspended.store(false, Ordering::SeqCst);
    }

    pub fn find_translation(&self, msgdata: &[u8], smsc_id: Option<&str>) -> Option<&UrlTranslation> {
        self.translations.find(msgdata, smsc_id)
    }

    pub fn remember_correlation(&self, id: String, correlation: Correlation) {
        self.correlations.lock().unwrap().insert(id, correlation);
    }

    pub fn take_correlation(&self, id: &str) -> Option<Correlation> {
        self.correlations.lock().unwrap().remove(id)
    }
}
