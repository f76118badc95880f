//! The VEN client: registration, polling, dispatch and reporting.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use openadr_contract::{append_report, AppendOutcome, ContractCodec, ContractState};
use openadr_types::{OutpointKey, ReportEntry, LOOKUP_SERVICE_NAME};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::VenConfig;
use crate::dispatch::{self, Event};
use crate::error::{ReportError, VenError};
use crate::history::ReportHistory;
use crate::ports::{Clock, Ledger, LookupResolver, SuccessorSpend, SystemClock, Vtn};
use crate::recency::RecencyCache;
use crate::wire::{LookupRequest, VenRegistration, VtnReport};

/// Report type used by [`VenClient::submit_load_reduction_report`].
pub const LOAD_REDUCTION: &str = "LOAD_REDUCTION";

/// Behavioural settings of one VEN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenSettings {
    pub ven_id: String,
    pub program_id: String,
    pub poll_interval: Duration,
    pub report_bucket_secs: u64,
    pub recency_capacity: usize,
    pub min_retention_secs: i64,
    pub max_reconcile_attempts: u32,
}

impl VenSettings {
    /// Settings with default polling and retention behaviour.
    pub fn new(ven_id: impl Into<String>, program_id: impl Into<String>) -> Self {
        Self::from_config(&VenConfig::default()).with_identity(ven_id, program_id)
    }

    pub fn from_config(config: &VenConfig) -> Self {
        Self {
            ven_id: config.ven.ven_id.clone(),
            program_id: config.ven.program_id.clone(),
            poll_interval: Duration::from_secs(config.ven.poll_interval_secs),
            report_bucket_secs: config.ven.report_bucket_secs,
            recency_capacity: config.ven.recency_capacity,
            min_retention_secs: config.ven.min_retention_secs,
            max_reconcile_attempts: config.ven.max_reconcile_attempts,
        }
    }

    fn with_identity(mut self, ven_id: impl Into<String>, program_id: impl Into<String>) -> Self {
        self.ven_id = ven_id.into();
        self.program_id = program_id.into();
        self
    }
}

/// The external collaborators of a client.
#[derive(Clone)]
pub struct Ports {
    pub vtn: Arc<dyn Vtn>,
    pub lookup: Arc<dyn LookupResolver>,
    pub ledger: Arc<dyn Ledger>,
    pub clock: Arc<dyn Clock>,
}

impl Ports {
    /// Ports using the system clock.
    pub fn new(
        vtn: Arc<dyn Vtn>,
        lookup: Arc<dyn LookupResolver>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            vtn,
            lookup,
            ledger,
            clock: Arc::new(SystemClock),
        }
    }
}

/// Lifecycle of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Uninitialized,
    Registering,
    Polling,
    Terminated,
}

/// Counts from one completed poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Keys returned by the lookup service.
    pub listed: usize,
    /// Events handed to dispatch.
    pub dispatched: usize,
    /// Keys skipped because they were dispatched before.
    pub already_seen: usize,
    /// Keys recorded without dispatch: other program, or already reported
    /// by this VEN.
    pub ignored: usize,
    /// Keys that could not be resolved; retried next cycle.
    pub failed: usize,
}

/// Result of [`VenClient::poll_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Another cycle was already running.
    Skipped,
    Completed(PollSummary),
}

/// What happened to the ledger record of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnChainOutcome {
    /// A successor output carrying the report was published.
    Appended { successor: OutpointKey },
    /// The event already records this report; nothing was published.
    Duplicate,
}

/// Confirmation of a fully recorded report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportReceipt {
    pub report_id: String,
    pub event_id: String,
    pub on_chain: OnChainOutcome,
}

#[derive(Debug, Clone)]
struct PendingReport {
    key: OutpointKey,
    entry: ReportEntry,
    attempts: u32,
}

enum Disposition {
    Dispatched,
    Ignored,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the in-flight flag when a poll cycle ends.
struct PollGuard<'a>(&'a AtomicBool);

impl<'a> PollGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Inner {
    settings: VenSettings,
    codec: ContractCodec,
    ports: Ports,
    state: Mutex<ClientState>,
    polling: AtomicBool,
    recency: Mutex<RecencyCache>,
    /// Serialises ledger updates so two reports never spend the same output.
    chain_lock: tokio::sync::Mutex<()>,
    pending: Mutex<VecDeque<PendingReport>>,
    history: Mutex<ReportHistory>,
    cancel: CancellationToken,
}

/// A VEN subscribed to one program.
pub struct VenClient {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl VenClient {
    pub fn new(settings: VenSettings, codec: ContractCodec, ports: Ports) -> Self {
        let recency = RecencyCache::new(settings.recency_capacity, settings.min_retention_secs);
        let history = ReportHistory::new(settings.recency_capacity);
        Self {
            inner: Arc::new(Inner {
                settings,
                codec,
                ports,
                state: Mutex::new(ClientState::Uninitialized),
                polling: AtomicBool::new(false),
                recency: Mutex::new(recency),
                chain_lock: tokio::sync::Mutex::new(()),
                pending: Mutex::new(VecDeque::new()),
                history: Mutex::new(history),
                cancel: CancellationToken::new(),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &VenSettings {
        &self.inner.settings
    }

    pub fn state(&self) -> ClientState {
        *lock(&self.inner.state)
    }

    /// Reports whose ledger update is still outstanding.
    pub fn pending_reports(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    /// Registers with the VTN and starts the poll loop.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyInitialized` if registration is in progress or done,
    /// `Terminated` after [`shutdown`](Self::shutdown), and `Registration`
    /// if the VTN rejects the VEN, in which case the client is back to
    /// `Uninitialized` and may be initialized again.
    pub async fn initialize(&self) -> Result<(), VenError> {
        {
            let mut state = lock(&self.inner.state);
            match *state {
                ClientState::Uninitialized => *state = ClientState::Registering,
                ClientState::Registering | ClientState::Polling => {
                    return Err(VenError::AlreadyInitialized)
                }
                ClientState::Terminated => return Err(VenError::Terminated),
            }
        }

        let settings = &self.inner.settings;
        let registration = VenRegistration::for_program(&settings.ven_id, &settings.program_id);
        if let Err(e) = self.inner.ports.vtn.register(&registration).await {
            tracing::error!(ven_id = %settings.ven_id, error = %e, "VEN registration failed");
            let mut state = lock(&self.inner.state);
            if *state == ClientState::Registering {
                *state = ClientState::Uninitialized;
            }
            return Err(VenError::Registration(e));
        }

        {
            let mut state = lock(&self.inner.state);
            if *state != ClientState::Registering {
                return Err(VenError::Terminated);
            }
            *state = ClientState::Polling;
        }

        let handle = tokio::spawn(run_poll_loop(Arc::clone(&self.inner)));
        *lock(&self.task) = Some(handle);

        tracing::info!(
            ven_id = %settings.ven_id,
            program_id = %settings.program_id,
            poll_interval_secs = settings.poll_interval.as_secs(),
            "VEN initialized"
        );
        Ok(())
    }

    /// Stops the poll loop, waiting for an in-flight cycle to finish.
    pub async fn shutdown(&self) {
        *lock(&self.inner.state) = ClientState::Terminated;
        self.inner.cancel.cancel();

        let handle = lock(&self.task).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("poll task join error: {}", e);
            }
        }
        tracing::info!(ven_id = %self.inner.settings.ven_id, "VEN shut down");
    }

    /// Runs one poll cycle.
    ///
    /// # Errors
    ///
    /// Returns `Terminated` after shutdown and `Lookup` if the lookup query
    /// fails. Failures for individual events are logged, not returned.
    pub async fn poll_once(&self) -> Result<PollOutcome, VenError> {
        self.inner.poll_once().await
    }

    /// Sends a report to the VTN, then records it on the event's ledger
    /// output.
    ///
    /// `idempotency_token` becomes the report ID; a fresh one is generated
    /// when `None`. Repeating a call with a token this client has already
    /// used does not resubmit to the VTN: a completed report returns its
    /// original receipt and a report with a pending ledger update retries
    /// that update.
    ///
    /// # Errors
    ///
    /// Returns `Submission` if the VTN did not accept the report (nothing
    /// else happened) and `OnChainPending` if only the ledger update failed
    /// (the update is queued for [`reconcile_pending`](Self::reconcile_pending)).
    pub async fn send_event_report(
        &self,
        key: OutpointKey,
        report_type: &str,
        report_value: &str,
        idempotency_token: Option<String>,
    ) -> Result<ReportReceipt, ReportError> {
        self.inner
            .send_event_report(key, report_type, report_value, idempotency_token)
            .await
    }

    /// Reports a load reduction, in percent, for an event.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` for a non-finite percentage, otherwise as
    /// [`send_event_report`](Self::send_event_report).
    pub async fn submit_load_reduction_report(
        &self,
        key: OutpointKey,
        percentage: f64,
        idempotency_token: Option<String>,
    ) -> Result<ReportReceipt, ReportError> {
        if !percentage.is_finite() {
            return Err(ReportError::InvalidValue(format!(
                "load reduction must be finite, got {percentage}"
            )));
        }
        self.inner
            .send_event_report(key, LOAD_REDUCTION, &percentage.to_string(), idempotency_token)
            .await
    }

    /// Retries outstanding ledger updates; returns how many were completed.
    pub async fn reconcile_pending(&self) -> usize {
        self.inner.reconcile_pending().await
    }
}

async fn run_poll_loop(inner: Arc<Inner>) {
    let mut ticker = tokio::time::interval(inner.settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = inner.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match inner.poll_once().await {
            Ok(PollOutcome::Completed(summary)) => {
                tracing::debug!(
                    listed = summary.listed,
                    dispatched = summary.dispatched,
                    failed = summary.failed,
                    "poll cycle complete"
                );
            }
            Ok(PollOutcome::Skipped) => {
                tracing::debug!("poll cycle already running, skipped");
            }
            Err(VenError::Terminated) => break,
            Err(e) => {
                tracing::warn!("poll cycle failed: {}", e);
            }
        }

        if !lock(&inner.pending).is_empty() {
            inner.reconcile_pending().await;
        }
    }
    tracing::debug!("poll loop stopped");
}

impl Inner {
    fn is_terminated(&self) -> bool {
        *lock(&self.state) == ClientState::Terminated
    }

    async fn poll_once(&self) -> Result<PollOutcome, VenError> {
        if self.is_terminated() {
            return Err(VenError::Terminated);
        }
        let Some(_guard) = PollGuard::acquire(&self.polling) else {
            return Ok(PollOutcome::Skipped);
        };

        let now = self.ports.clock.now();
        let expired = lock(&self.recency).prune(now);
        if expired > 0 {
            tracing::debug!(expired, "pruned expired events from recency cache");
        }

        let request = LookupRequest {
            service: LOOKUP_SERVICE_NAME.to_string(),
            query: serde_json::json!({
                "programID": self.settings.program_id,
                "active": true,
            }),
        };
        let keys = self
            .ports
            .lookup
            .query(&request)
            .await
            .map_err(VenError::Lookup)?;

        let mut summary = PollSummary {
            listed: keys.len(),
            ..PollSummary::default()
        };
        for key in keys {
            if lock(&self.recency).contains(&key, now) {
                summary.already_seen += 1;
                continue;
            }
            match self.process_event(key, now).await {
                Ok(Disposition::Dispatched) => summary.dispatched += 1,
                Ok(Disposition::Ignored) => summary.ignored += 1,
                Err(e) => {
                    tracing::warn!(%key, error = %e, "failed to process event");
                    summary.failed += 1;
                }
            }
        }
        Ok(PollOutcome::Completed(summary))
    }

    async fn process_event(&self, key: OutpointKey, now: i64) -> Result<Disposition, VenError> {
        let (state, _) = self.resolve(key).await?;
        let event = Event::from_state(key, &state);

        if event.program_id != self.settings.program_id {
            tracing::debug!(%key, program_id = %event.program_id, "event belongs to another program");
            self.remember(&event, now);
            return Ok(Disposition::Ignored);
        }
        if event.reported_by(&self.settings.ven_id) {
            tracing::debug!(%key, "event already carries this VEN's report");
            self.remember(&event, now);
            return Ok(Disposition::Ignored);
        }

        tracing::info!(
            event_id = %event.event_id(),
            event_type = %event.event_type,
            start_time = event.start_time,
            duration = event.duration,
            "processing new event"
        );
        if let Some(response) = dispatch::respond(&event) {
            match self
                .send_event_report(key, response.report_type, &response.report_value, None)
                .await
            {
                Ok(receipt) => {
                    tracing::info!(report_id = %receipt.report_id, event_id = %receipt.event_id, "event report recorded");
                }
                Err(e) => {
                    tracing::warn!(event_id = %event.event_id(), error = %e, "event report failed");
                }
            }
        }

        self.remember(&event, now);
        Ok(Disposition::Dispatched)
    }

    fn remember(&self, event: &Event, now: i64) {
        lock(&self.recency).insert(event.key, event.end_time(), now);
    }

    /// Fetches the output at `key` and decodes its state; also returns the
    /// output's satoshis.
    async fn resolve(&self, key: OutpointKey) -> Result<(ContractState, u64), VenError> {
        let tx = self
            .ports
            .ledger
            .fetch_transaction(&key.txid)
            .await
            .map_err(VenError::Ledger)?;
        let output = tx
            .outputs
            .get(key.output_index as usize)
            .ok_or(VenError::OutputMissing(key))?;
        let state = self.codec.decode(&output.locking_script)?;
        Ok((state, output.satoshis))
    }

    async fn send_event_report(
        &self,
        key: OutpointKey,
        report_type: &str,
        report_value: &str,
        idempotency_token: Option<String>,
    ) -> Result<ReportReceipt, ReportError> {
        if self.is_terminated() {
            return Err(ReportError::Terminated);
        }

        if let Some(token) = &idempotency_token {
            let known = lock(&self.history).receipt(token).cloned();
            if let Some(receipt) = known {
                tracing::debug!(report_id = %token, "report already recorded, not resubmitting");
                return Ok(receipt);
            }
            let queued = take_pending(&mut lock(&self.pending), token);
            if let Some(report) = queued {
                tracing::debug!(report_id = %token, "report already accepted by VTN, retrying ledger update");
                return self.finish_on_chain(report.key, report.entry, report.attempts).await;
            }
        }

        let report_id = idempotency_token.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let report = VtnReport::single_value(
            report_type,
            &report_id,
            &self.settings.program_id,
            &key,
            &self.settings.ven_id,
            report_value,
        );
        self.ports
            .vtn
            .submit_report(&report)
            .await
            .map_err(ReportError::Submission)?;
        tracing::info!(report_name = %report.report_name, event_id = %report.event_id, "report accepted by VTN");

        let entry = ReportEntry {
            report_type: report_type.to_string(),
            report_value: report_value.to_string(),
            ven_id: self.settings.ven_id.clone(),
            timestamp: self.ports.clock.now(),
            report_id: Some(report_id),
        };
        self.finish_on_chain(key, entry, 0).await
    }

    /// Phase two of a report the VTN has accepted. `attempts` counts earlier
    /// failed ledger updates.
    async fn finish_on_chain(
        &self,
        key: OutpointKey,
        entry: ReportEntry,
        attempts: u32,
    ) -> Result<ReportReceipt, ReportError> {
        let report_id = entry.report_id.clone().unwrap_or_default();
        let recorded = self.record_on_chain(key, &entry).await;
        match recorded {
            Ok(on_chain) => {
                let receipt = ReportReceipt {
                    report_id,
                    event_id: key.event_id(),
                    on_chain,
                };
                lock(&self.history).record_receipt(receipt.clone());
                Ok(receipt)
            }
            Err(VenError::Payload(source)) => Err(ReportError::PayloadRejected { report_id, source }),
            Err(source) => {
                tracing::warn!(%key, report_id = %report_id, error = %source, "ledger update failed, queued for reconciliation");
                lock(&self.pending).push_back(PendingReport {
                    key,
                    entry,
                    attempts: attempts + 1,
                });
                Err(ReportError::OnChainPending { report_id, source })
            }
        }
    }

    /// Appends `entry` to the event at `key` by publishing a successor
    /// output with the updated payload.
    async fn record_on_chain(
        &self,
        key: OutpointKey,
        entry: &ReportEntry,
    ) -> Result<OnChainOutcome, VenError> {
        let _chain = self.chain_lock.lock().await;

        // Reports land on the newest output of the event this VEN knows of,
        // never on one it has already spent.
        let current = lock(&self.history).latest(key);
        let (state, satoshis) = self.resolve(current).await?;
        let payload = match append_report(&state.payload, entry, self.settings.report_bucket_secs)? {
            AppendOutcome::Duplicate => {
                tracing::debug!(%key, %current, "report already recorded on the event");
                return Ok(OnChainOutcome::Duplicate);
            }
            AppendOutcome::Appended(payload) => payload,
        };

        let locking_script = self.codec.encode(&state.with_payload(payload))?;
        let spend = SuccessorSpend {
            description: format!("OpenADR {} report for {}", entry.report_type, key.event_id()),
            spends: current,
            locking_script,
            satoshis,
        };
        let txid = self
            .ports
            .ledger
            .publish_successor(&spend)
            .await
            .map_err(VenError::Ledger)?;

        let successor = OutpointKey::new(txid, 0);
        lock(&self.history).record_successor(current, successor);
        tracing::info!(%key, spent = %current, %successor, "report recorded on ledger");
        Ok(OnChainOutcome::Appended { successor })
    }

    async fn reconcile_pending(&self) -> usize {
        let queued: Vec<PendingReport> = lock(&self.pending).drain(..).collect();
        let mut reconciled = 0;
        let mut retry = Vec::new();

        for mut report in queued {
            let recorded = self.record_on_chain(report.key, &report.entry).await;
            match recorded {
                Ok(on_chain) => {
                    tracing::info!(key = %report.key, ?on_chain, "pending report reconciled");
                    if let Some(report_id) = report.entry.report_id.clone() {
                        lock(&self.history).record_receipt(ReportReceipt {
                            report_id,
                            event_id: report.key.event_id(),
                            on_chain,
                        });
                    }
                    reconciled += 1;
                }
                Err(VenError::Payload(e)) => {
                    tracing::error!(key = %report.key, error = %e, "event payload rejects reports, dropping pending report");
                }
                Err(e) => {
                    report.attempts += 1;
                    if report.attempts >= self.settings.max_reconcile_attempts {
                        tracing::error!(
                            key = %report.key,
                            attempts = report.attempts,
                            error = %e,
                            "giving up on pending report"
                        );
                    } else {
                        tracing::warn!(key = %report.key, attempts = report.attempts, error = %e, "pending report still failing");
                        retry.push(report);
                    }
                }
            }
        }

        lock(&self.pending).extend(retry);
        reconciled
    }
}

/// Removes the queued report with ID `report_id`, if any.
fn take_pending(pending: &mut VecDeque<PendingReport>, report_id: &str) -> Option<PendingReport> {
    let index = pending
        .iter()
        .position(|p| p.entry.report_id.as_deref() == Some(report_id))?;
    pending.remove(index)
}
