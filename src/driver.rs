//! Device session and polling core
//!
//! [`AlfenDevice`] owns everything that talks to one wallbox: the single
//! authenticated connection, the property store, the pending-write queue and
//! the tag/transaction facts. All of it is behind interior locks so the device
//! can be shared as `Arc<AlfenDevice>` between the [`Poller`] and whatever
//! handles user writes.
//!
//! Lock order, outermost first: cycle lock (`poll`), then the execution lock
//! (`connection`). The std locks guard plain data and are never held across an
//! `.await`.

use crate::config::{Config, PollingConfig, SessionConfig};
use crate::error::Result;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::logparse::LogBuffer;
use crate::rotation::CategoryRotation;
use crate::session::{LoginRateLimiter, SessionState};
use crate::store::{PropertyStore, UpdateQueue};
use crate::tags::SocketTagFacts;
use crate::transactions::TransactionScanner;
use crate::transport::{ReqwestTransportFactory, Transport, TransportFactory};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::mpsc;

mod auth;
mod fetch;
mod logs;
mod request;
mod runtime;
mod transactions;
pub mod types;
mod writes;

pub use runtime::Poller;
pub use types::{CycleReport, CycleStepDurations, DeviceInfo, DriverState, RefreshRequest};

/// Pause between retries of a failed page fetch
pub(crate) const FETCH_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Consecutive failed page fetches before a category is given up
pub(crate) const FETCH_MAX_FAILURES: u32 = 3;

/// Log pages fetched per log pass (offsets 0..=5)
pub(crate) const LOG_PAGES: u64 = 6;

/// Category fetches slower than this are logged at info
pub(crate) const SLOW_FETCH: Duration = Duration::from_secs(5);

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// State only the update cycle touches; its mutex is the cycle lock
#[derive(Debug)]
pub(crate) struct PollState {
    pub(crate) rotation: CategoryRotation,
    pub(crate) log_counter: u32,
    pub(crate) transaction_counter: u32,
    pub(crate) logs: LogBuffer,
    pub(crate) scanner: TransactionScanner,
}

/// One wallbox
pub struct AlfenDevice {
    host: String,
    /// Friendly name, filled from the device identity by `init` when empty
    name: RwLock<String>,
    device_id: RwLock<Option<String>>,
    log_id: String,
    username: String,
    password: String,
    display_name: String,
    request_timeout: Duration,
    session_config: SessionConfig,
    options: RwLock<PollingConfig>,

    connector: Arc<dyn TransportFactory>,
    /// Execution lock: one request in flight per device
    connection: tokio::sync::Mutex<Box<dyn Transport>>,
    session: Mutex<SessionState>,

    properties: RwLock<PropertyStore>,
    pending: tokio::sync::Mutex<UpdateQueue>,
    tags: Mutex<SocketTagFacts>,
    info: RwLock<Option<DeviceInfo>>,

    /// Cycle lock
    poll: tokio::sync::Mutex<PollState>,
    /// Static categories still to be loaded
    bootstrap_pending: AtomicBool,
    last_cycle: Mutex<Option<CycleReport>>,

    refresh_tx: mpsc::UnboundedSender<RefreshRequest>,
    logger: StructuredLogger,
}

impl AlfenDevice {
    /// Build a device on top of the given connection factory.
    ///
    /// Returns the receiving end of the refresh channel, to be handed to a
    /// [`Poller`].
    pub fn new(
        config: &Config,
        connector: Arc<dyn TransportFactory>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RefreshRequest>)> {
        let device = &config.device;
        let log_id = if device.name.is_empty() {
            device.host.clone()
        } else {
            format!("{}@{}", device.name, device.host)
        };
        let logger = get_logger_with_context(LogContext::new("device").with_device(&log_id));
        let connection = connector.connect()?;
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();

        let limiter = LoginRateLimiter::new(
            config.session.login_max_attempts,
            config.session.login_window(),
        );

        logger.debug(&format!(
            "Device created, rotating {} categories ({} per cycle)",
            config.polling.rotating_categories().len(),
            config.polling.categories_per_cycle
        ));

        Ok((
            Self {
                host: device.host.clone(),
                name: RwLock::new(device.name.clone()),
                device_id: RwLock::new(None),
                log_id,
                username: device.username.clone(),
                password: device.password.clone(),
                display_name: device.display_name.clone(),
                request_timeout: config.polling.request_timeout(),
                session_config: config.session.clone(),
                options: RwLock::new(config.polling.clone()),
                connector,
                connection: tokio::sync::Mutex::new(connection),
                session: Mutex::new(SessionState::new(limiter)),
                properties: RwLock::new(PropertyStore::new()),
                pending: tokio::sync::Mutex::new(UpdateQueue::new()),
                tags: Mutex::new(SocketTagFacts::new()),
                info: RwLock::new(None),
                poll: tokio::sync::Mutex::new(PollState {
                    rotation: CategoryRotation::new(config.polling.categories_per_cycle),
                    log_counter: 0,
                    transaction_counter: 0,
                    logs: LogBuffer::default(),
                    scanner: TransactionScanner::new(),
                }),
                bootstrap_pending: AtomicBool::new(true),
                last_cycle: Mutex::new(None),
                refresh_tx,
                logger,
            },
            refresh_rx,
        ))
    }

    /// Build a device talking HTTPS to `config.device.host`
    pub fn from_config(config: &Config) -> Result<(Self, mpsc::UnboundedReceiver<RefreshRequest>)> {
        let connector = Arc::new(ReqwestTransportFactory::new(
            &config.device.host,
            config.polling.request_timeout(),
        ));
        Self::new(config, connector)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    pub fn name(&self) -> String {
        read(&self.name).clone()
    }

    /// `alfen_<name>`, known after `init`
    pub fn device_id(&self) -> Option<String> {
        read(&self.device_id).clone()
    }

    pub fn info(&self) -> Option<DeviceInfo> {
        read(&self.info).clone()
    }

    pub fn options(&self) -> PollingConfig {
        read(&self.options).clone()
    }

    pub fn is_logged_in(&self) -> bool {
        lock(&self.session).authenticated
    }

    pub fn keep_logout(&self) -> bool {
        lock(&self.session).keep_logout
    }

    pub fn session_last_updated(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        lock(&self.session).last_updated
    }

    /// Forget the authenticated state so the next request logs in first
    pub fn mark_unauthenticated(&self) {
        lock(&self.session).mark_unauthenticated();
    }

    pub fn property(&self, id: &str) -> Option<crate::store::Property> {
        read(&self.properties).get(id).cloned()
    }

    pub fn property_value(&self, id: &str) -> Option<serde_json::Value> {
        read(&self.properties).value(id).cloned()
    }

    pub fn property_count(&self) -> usize {
        read(&self.properties).len()
    }

    pub fn number_of_sockets(&self) -> u32 {
        read(&self.properties).number_of_sockets()
    }

    /// Copy of the per-socket tag and transaction facts
    pub fn tag_facts(&self) -> SocketTagFacts {
        lock(&self.tags).clone()
    }

    pub async fn pending_writes(&self) -> Vec<(String, serde_json::Value)> {
        self.pending.lock().await.snapshot()
    }

    pub fn last_cycle(&self) -> Option<CycleReport> {
        lock(&self.last_cycle).clone()
    }

    /// Ask the poller for a cycle now
    pub fn request_refresh(&self) {
        let _ = self.refresh_tx.send(RefreshRequest::Manual);
    }

    /// Replace the host supplied polling options.
    ///
    /// The static category set depends on the allowlist, so the one-time
    /// bootstrap runs again on the next cycle. Options that fail validation
    /// are rejected and the current ones stay in force.
    pub fn apply_polling_options(&self, options: PollingConfig) -> bool {
        if let Err(e) = options.validate() {
            self.logger
                .warn(&format!("Rejected polling options: {}", e));
            return false;
        }
        self.logger.info(&format!(
            "Polling options changed: {} categories, {} per cycle, {:.1}s delay",
            options.categories.len(),
            options.categories_per_cycle,
            options.category_fetch_delay_secs
        ));
        *write(&self.options) = options;
        self.bootstrap_pending
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let _ = self.refresh_tx.send(RefreshRequest::OptionsChanged);
        true
    }

    pub fn bootstrap_pending(&self) -> bool {
        self.bootstrap_pending
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Error text safe for logs: no password, no host, bounded length
    pub(crate) fn sanitize(&self, message: &str) -> String {
        crate::error::sanitize_message(message, &[&self.password, &self.host])
    }

    /// Redacted JSON dump of the device state
    pub async fn diagnostics(&self) -> serde_json::Value {
        let pending: Vec<serde_json::Value> = self
            .pending_writes()
            .await
            .into_iter()
            .map(|(id, value)| {
                let value = if crate::diagnostics::is_sensitive_property(&id) {
                    crate::diagnostics::hash_value(&value)
                } else {
                    value
                };
                serde_json::json!({"id": id, "value": value})
            })
            .collect();
        let properties = {
            let store = read(&self.properties);
            crate::diagnostics::sanitize_properties(store.iter())
        };
        let options = self.options();
        // Skipped while a cycle holds the state
        let rotation = self.poll.try_lock().ok().map(|poll| poll.rotation.clone());

        serde_json::json!({
            "id": self.device_id(),
            "name": self.name(),
            "info": self.info(),
            "logged_in": self.is_logged_in(),
            "keep_logout": self.keep_logout(),
            "number_socket": self.number_of_sockets(),
            "category_options": options.categories,
            "categories_per_cycle": options.categories_per_cycle,
            "rotation": rotation,
            "bootstrap_pending": self.bootstrap_pending(),
            "last_cycle": self.last_cycle(),
            "pending_writes": pending,
            "properties": properties,
            "latest_tag": lock(&self.tags).redacted_json(),
        })
    }
}
