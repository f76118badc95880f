//! VEN client behaviour against in-memory collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use openadr_contract::{ContractCodec, ContractState, Transaction, TxInput, TxOutput};
use openadr_types::{EventType, OutpointKey, ReportEntry, Txid, UnixSeconds};
use openadr_ven::wire::{LookupRequest, VenRegistration, VtnReport};
use openadr_ven::{
    ClientState, Clock, Ledger, LookupResolver, OnChainOutcome, PollOutcome, Ports, ReportError,
    SuccessorSpend, TransportError, VenClient, VenError, VenSettings, Vtn,
};
use tokio::sync::Notify;

const PROGRAM: &str = "residential-demand-response";
const VEN_ID: &str = "VEN-1";

fn unavailable() -> TransportError {
    TransportError::Status {
        status: 503,
        body: "unavailable".to_string(),
    }
}

#[derive(Default)]
struct FakeVtn {
    registrations: Mutex<Vec<VenRegistration>>,
    reports: Mutex<Vec<VtnReport>>,
    reject_registration: AtomicBool,
    reject_reports: AtomicBool,
}

#[async_trait]
impl Vtn for FakeVtn {
    async fn register(&self, registration: &VenRegistration) -> Result<(), TransportError> {
        if self.reject_registration.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                status: 401,
                body: "unknown VEN".to_string(),
            });
        }
        self.registrations.lock().unwrap().push(registration.clone());
        Ok(())
    }

    async fn submit_report(&self, report: &VtnReport) -> Result<(), TransportError> {
        if self.reject_reports.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

#[derive(Default)]
struct FakeLookup {
    keys: Mutex<Vec<OutpointKey>>,
    requests: Mutex<Vec<LookupRequest>>,
    calls: AtomicUsize,
    fail: AtomicBool,
    /// When set, queries signal `entered` and wait for `release`.
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl FakeLookup {
    fn set_keys(&self, keys: Vec<OutpointKey>) {
        *self.keys.lock().unwrap() = keys;
    }
}

#[async_trait]
impl LookupResolver for FakeLookup {
    async fn query(&self, request: &LookupRequest) -> Result<Vec<OutpointKey>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.keys.lock().unwrap().clone())
    }
}

#[derive(Default)]
struct FakeLedger {
    txs: Mutex<HashMap<Txid, Transaction>>,
    published: Mutex<Vec<SuccessorSpend>>,
    fail_publish: AtomicBool,
}

impl FakeLedger {
    fn add(&self, tx: Transaction) -> Txid {
        let txid = tx.txid();
        self.txs.lock().unwrap().insert(txid, tx);
        txid
    }

    fn output_state(&self, key: &OutpointKey) -> ContractState {
        let txs = self.txs.lock().unwrap();
        let script = &txs[&key.txid].outputs[key.output_index as usize].locking_script;
        ContractCodec::default().decode(script).unwrap()
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn fetch_transaction(&self, txid: &Txid) -> Result<Transaction, TransportError> {
        self.txs
            .lock()
            .unwrap()
            .get(txid)
            .cloned()
            .ok_or_else(|| TransportError::Status {
                status: 404,
                body: "no such transaction".to_string(),
            })
    }

    async fn publish_successor(&self, spend: &SuccessorSpend) -> Result<Txid, TransportError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.published.lock().unwrap().push(spend.clone());
        Ok(self.add(Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: spend.spends,
                unlocking_script: vec![],
                sequence: u32::MAX,
            }],
            outputs: vec![TxOutput {
                satoshis: spend.satoshis,
                locking_script: spend.locking_script.clone(),
            }],
            lock_time: 0,
        }))
    }
}

struct FakeClock(AtomicI64);

impl Clock for FakeClock {
    fn now(&self) -> UnixSeconds {
        self.0.load(Ordering::SeqCst)
    }
}

struct Harness {
    client: Arc<VenClient>,
    vtn: Arc<FakeVtn>,
    lookup: Arc<FakeLookup>,
    ledger: Arc<FakeLedger>,
    clock: Arc<FakeClock>,
}

impl Harness {
    fn new() -> Self {
        Self::with_lookup(FakeLookup::default())
    }

    fn with_lookup(lookup: FakeLookup) -> Self {
        let vtn = Arc::new(FakeVtn::default());
        let lookup = Arc::new(lookup);
        let ledger = Arc::new(FakeLedger::default());
        let clock = Arc::new(FakeClock(AtomicI64::new(2000)));

        let ports = Ports {
            vtn: vtn.clone(),
            lookup: lookup.clone(),
            ledger: ledger.clone(),
            clock: clock.clone(),
        };
        let mut settings = VenSettings::new(VEN_ID, PROGRAM);
        settings.min_retention_secs = 0;
        let client = Arc::new(VenClient::new(settings, ContractCodec::default(), ports));

        Self {
            client,
            vtn,
            lookup,
            ledger,
            clock,
        }
    }

    /// Publishes a one-output event transaction and returns its key.
    fn publish(&self, seed: u8, event_type: EventType, program_id: &str, payload: &[u8]) -> OutpointKey {
        let script = ContractCodec::default()
            .encode(&ContractState {
                event_type,
                program_id: program_id.to_string(),
                start_time: 1000,
                duration: 3600,
                payload: payload.to_vec(),
            })
            .unwrap();
        let txid = self.ledger.add(Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutpointKey::new(Txid([seed; 32]), 0),
                unlocking_script: vec![],
                sequence: u32::MAX,
            }],
            outputs: vec![TxOutput {
                satoshis: 1,
                locking_script: script,
            }],
            lock_time: 0,
        });
        OutpointKey::new(txid, 0)
    }

    fn reports(&self) -> Vec<VtnReport> {
        self.vtn.reports.lock().unwrap().clone()
    }

    fn published(&self) -> Vec<SuccessorSpend> {
        self.ledger.published.lock().unwrap().clone()
    }
}

fn completed(outcome: PollOutcome) -> openadr_ven::PollSummary {
    match outcome {
        PollOutcome::Completed(summary) => summary,
        PollOutcome::Skipped => panic!("poll cycle unexpectedly skipped"),
    }
}

// ── polling and dispatch ─────────────────────────────────────────────

#[tokio::test]
async fn simple_event_is_reported_and_recorded() {
    let h = Harness::new();
    let key = h.publish(1, EventType::Simple, PROGRAM, br#"{"level":2,"reason":"peak"}"#);
    h.lookup.set_keys(vec![key]);

    let summary = completed(h.client.poll_once().await.unwrap());
    assert_eq!(summary.listed, 1);
    assert_eq!(summary.dispatched, 1);

    let request = h.lookup.requests.lock().unwrap()[0].clone();
    assert_eq!(request.service, "ls_openADR");
    assert_eq!(request.query, serde_json::json!({"programID": PROGRAM, "active": true}));

    let reports = h.reports();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.event_id, format!("{}-0", key.txid));
    assert_eq!(report.program_id, PROGRAM);
    assert_eq!(report.client_name, VEN_ID);
    assert!(report.report_name.starts_with("SIMPLE_LEVEL_"));
    let value = &report.resources[0].intervals[0].payloads[0];
    assert_eq!(value.kind, "SIMPLE_LEVEL");
    assert_eq!(value.values, vec!["2".to_string()]);

    let published = h.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].spends, key);

    let original = h.ledger.output_state(&key);
    let successor = ContractCodec::default()
        .decode(&published[0].locking_script)
        .unwrap();
    assert_eq!(successor.event_type, original.event_type);
    assert_eq!(successor.program_id, original.program_id);
    assert_eq!(successor.start_time, original.start_time);
    assert_eq!(successor.duration, original.duration);

    let payload: serde_json::Value = serde_json::from_slice(&successor.payload).unwrap();
    assert_eq!(payload["level"], 2);
    assert_eq!(payload["reason"], "peak");
    assert_eq!(payload["reports"][0]["reportType"], "SIMPLE_LEVEL");
    assert_eq!(payload["reports"][0]["reportValue"], "2");
    assert_eq!(payload["reports"][0]["venID"], VEN_ID);
}

#[tokio::test]
async fn fractional_level_is_reported() {
    let h = Harness::new();
    let key = h.publish(1, EventType::Simple, PROGRAM, br#"{"level":2.5}"#);
    h.lookup.set_keys(vec![key]);

    let summary = completed(h.client.poll_once().await.unwrap());
    assert_eq!(summary.dispatched, 1);

    let reports = h.reports();
    assert_eq!(reports.len(), 1);
    let value = &reports[0].resources[0].intervals[0].payloads[0];
    assert_eq!(value.values, vec!["2.5".to_string()]);
}

#[tokio::test]
async fn event_is_dispatched_once() {
    let h = Harness::new();
    let key = h.publish(1, EventType::Simple, PROGRAM, br#"{"level":1}"#);
    h.lookup.set_keys(vec![key]);

    completed(h.client.poll_once().await.unwrap());
    let second = completed(h.client.poll_once().await.unwrap());

    assert_eq!(second.dispatched, 0);
    assert_eq!(second.already_seen, 1);
    assert_eq!(h.reports().len(), 1);
}

#[tokio::test]
async fn own_successor_is_not_redispatched() {
    let h = Harness::new();
    let key = h.publish(1, EventType::Price, PROGRAM, br#"{"price":0.21}"#);
    h.lookup.set_keys(vec![key]);
    completed(h.client.poll_once().await.unwrap());

    assert_eq!(h.published().len(), 1);
    let successor = h
        .ledger
        .txs
        .lock()
        .unwrap()
        .values()
        .find(|tx| tx.inputs[0].previous_output == key)
        .map(|tx| tx.outpoint(0))
        .unwrap();
    h.lookup.set_keys(vec![successor]);

    let summary = completed(h.client.poll_once().await.unwrap());
    assert_eq!(summary.ignored, 1);
    assert_eq!(h.reports().len(), 1);
}

#[tokio::test]
async fn other_program_and_unknown_types_are_not_reported() {
    let h = Harness::new();
    let foreign = h.publish(1, EventType::Simple, "commercial", br#"{"level":3}"#);
    let custom = h.publish(2, EventType::Other("CUSTOM".to_string()), PROGRAM, b"{}");
    h.lookup.set_keys(vec![foreign, custom]);

    let summary = completed(h.client.poll_once().await.unwrap());
    assert_eq!(summary.ignored, 1);
    assert_eq!(summary.dispatched, 1);
    assert!(h.reports().is_empty());

    let again = completed(h.client.poll_once().await.unwrap());
    assert_eq!(again.already_seen, 2);
}

#[tokio::test]
async fn lookup_failure_abandons_cycle_only() {
    let h = Harness::new();
    let key = h.publish(1, EventType::Simple, PROGRAM, br#"{"level":2}"#);
    h.lookup.set_keys(vec![key]);
    h.lookup.fail.store(true, Ordering::SeqCst);

    let err = h.client.poll_once().await.unwrap_err();
    assert!(matches!(err, VenError::Lookup(_)));
    assert!(h.reports().is_empty());

    h.lookup.fail.store(false, Ordering::SeqCst);
    let summary = completed(h.client.poll_once().await.unwrap());
    assert_eq!(summary.dispatched, 1);
}

#[tokio::test]
async fn unresolvable_event_is_retried_next_cycle() {
    let h = Harness::new();
    let missing = OutpointKey::new(Txid([0xee; 32]), 0);
    let key = h.publish(1, EventType::Simple, PROGRAM, br#"{"level":2}"#);
    h.lookup.set_keys(vec![missing, key]);

    let first = completed(h.client.poll_once().await.unwrap());
    assert_eq!(first.failed, 1);
    assert_eq!(first.dispatched, 1);

    let second = completed(h.client.poll_once().await.unwrap());
    assert_eq!(second.failed, 1);
    assert_eq!(second.already_seen, 1);
}

#[tokio::test]
async fn overlapping_poll_is_skipped() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let h = Harness::with_lookup(FakeLookup {
        gate: Some((entered.clone(), release.clone())),
        ..FakeLookup::default()
    });

    let client = h.client.clone();
    let first = tokio::spawn(async move { client.poll_once().await });
    entered.notified().await;

    assert_eq!(h.client.poll_once().await.unwrap(), PollOutcome::Skipped);

    release.notify_one();
    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, PollOutcome::Completed(_)));
    assert_eq!(h.lookup.calls.load(Ordering::SeqCst), 1);
}

// ── reporting ────────────────────────────────────────────────────────

#[tokio::test]
async fn submission_failure_leaves_ledger_untouched() {
    let h = Harness::new();
    let key = h.publish(1, EventType::Simple, PROGRAM, br#"{"level":2}"#);
    h.vtn.reject_reports.store(true, Ordering::SeqCst);

    let err = h
        .client
        .submit_load_reduction_report(key, 20.0, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ReportError::Submission(_)));
    assert!(h.published().is_empty());
    assert_eq!(h.client.pending_reports(), 0);
}

#[tokio::test]
async fn ledger_failure_is_pending_then_reconciled() {
    let h = Harness::new();
    let key = h.publish(1, EventType::Simple, PROGRAM, br#"{"level":2}"#);
    h.ledger.fail_publish.store(true, Ordering::SeqCst);

    let err = h
        .client
        .submit_load_reduction_report(key, 12.5, None)
        .await
        .unwrap_err();
    let pending_id = match err {
        ReportError::OnChainPending { report_id, .. } => report_id,
        other => panic!("expected OnChainPending, got {other:?}"),
    };
    assert_eq!(h.reports().len(), 1, "the VTN already has the report");
    assert_eq!(h.client.pending_reports(), 1);

    assert_eq!(h.client.reconcile_pending().await, 0);
    assert_eq!(h.client.pending_reports(), 1);

    h.ledger.fail_publish.store(false, Ordering::SeqCst);
    assert_eq!(h.client.reconcile_pending().await, 1);
    assert_eq!(h.client.pending_reports(), 0);

    let published = h.published();
    assert_eq!(published.len(), 1);
    let successor = ContractCodec::default()
        .decode(&published[0].locking_script)
        .unwrap();
    let payload: serde_json::Value = serde_json::from_slice(&successor.payload).unwrap();
    assert_eq!(payload["reports"][0]["reportType"], "LOAD_REDUCTION");
    assert_eq!(payload["reports"][0]["reportValue"], "12.5");
    assert_eq!(payload["reports"][0]["reportID"], pending_id.as_str());
    assert_eq!(h.reports().len(), 1, "reconciliation does not resubmit to the VTN");
}

#[tokio::test]
async fn report_already_on_event_is_not_republished() {
    let h = Harness::new();
    let legacy = ReportEntry {
        report_type: "LOAD_REDUCTION".to_string(),
        report_value: "20".to_string(),
        ven_id: VEN_ID.to_string(),
        timestamp: 2000,
        report_id: None,
    };
    let payload = serde_json::to_vec(&serde_json::json!({"level": 2, "reports": [legacy]})).unwrap();
    let key = h.publish(1, EventType::Simple, PROGRAM, &payload);
    h.clock.0.store(2010, Ordering::SeqCst);

    let receipt = h
        .client
        .submit_load_reduction_report(key, 20.0, None)
        .await
        .unwrap();

    assert_eq!(receipt.on_chain, OnChainOutcome::Duplicate);
    assert_eq!(receipt.event_id, key.event_id());
    assert!(h.published().is_empty());
}

fn successor_reports(spend: &SuccessorSpend) -> Vec<serde_json::Value> {
    let state = ContractCodec::default().decode(&spend.locking_script).unwrap();
    let payload: serde_json::Value = serde_json::from_slice(&state.payload).unwrap();
    payload["reports"].as_array().cloned().unwrap_or_default()
}

#[tokio::test]
async fn same_token_is_submitted_and_recorded_once() {
    let h = Harness::new();
    let key = h.publish(1, EventType::Simple, PROGRAM, br#"{"level":2}"#);
    let token = Some("load-shed-1".to_string());

    let first = h
        .client
        .submit_load_reduction_report(key, 20.0, token.clone())
        .await
        .unwrap();
    let second = h
        .client
        .submit_load_reduction_report(key, 20.0, token)
        .await
        .unwrap();

    assert_eq!(first.report_id, "load-shed-1");
    assert_eq!(second, first);
    assert_eq!(h.reports().len(), 1);

    let published = h.published();
    assert_eq!(published.len(), 1);
    let entries = successor_reports(&published[0]);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["reportID"], "load-shed-1");
}

#[tokio::test]
async fn repeated_report_is_recorded_once_on_latest_output() {
    let h = Harness::new();
    let key = h.publish(1, EventType::Simple, PROGRAM, br#"{"level":2}"#);

    let first = h
        .client
        .submit_load_reduction_report(key, 20.0, None)
        .await
        .unwrap();
    let OnChainOutcome::Appended { successor } = first.on_chain else {
        panic!("expected a successor, got {:?}", first.on_chain);
    };

    // Same report under fresh IDs, against the original and the successor.
    let again = h
        .client
        .submit_load_reduction_report(key, 20.0, None)
        .await
        .unwrap();
    let via_successor = h
        .client
        .submit_load_reduction_report(successor, 20.0, None)
        .await
        .unwrap();
    assert_eq!(again.on_chain, OnChainOutcome::Duplicate);
    assert_eq!(via_successor.on_chain, OnChainOutcome::Duplicate);
    assert_eq!(h.published().len(), 1);

    // A different value against the original key spends the successor.
    h.client
        .submit_load_reduction_report(key, 35.0, None)
        .await
        .unwrap();
    let published = h.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[1].spends, successor);

    let entries = successor_reports(&published[1]);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["reportValue"], "20");
    assert_eq!(entries[1]["reportValue"], "35");
}

#[tokio::test]
async fn same_token_retries_pending_ledger_update_without_resubmitting() {
    let h = Harness::new();
    let key = h.publish(1, EventType::Simple, PROGRAM, br#"{"level":2}"#);
    let token = Some("load-shed-2".to_string());
    h.ledger.fail_publish.store(true, Ordering::SeqCst);

    let err = h
        .client
        .submit_load_reduction_report(key, 15.0, token.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::OnChainPending { .. }));
    assert_eq!(h.client.pending_reports(), 1);

    h.ledger.fail_publish.store(false, Ordering::SeqCst);
    let receipt = h
        .client
        .submit_load_reduction_report(key, 15.0, token)
        .await
        .unwrap();

    assert!(matches!(receipt.on_chain, OnChainOutcome::Appended { .. }));
    assert_eq!(h.client.pending_reports(), 0);
    assert_eq!(h.reports().len(), 1);
    assert_eq!(h.published().len(), 1);
}

#[tokio::test]
async fn non_object_payload_rejects_report_without_queueing() {
    let h = Harness::new();
    let key = h.publish(1, EventType::Simple, PROGRAM, b"[1,2,3]");

    let err = h
        .client
        .send_event_report(key, "SIMPLE_LEVEL", "1", None)
        .await
        .unwrap_err();

    assert!(matches!(err, ReportError::PayloadRejected { .. }));
    assert_eq!(h.client.pending_reports(), 0);
}

#[tokio::test]
async fn non_finite_load_reduction_is_rejected() {
    let h = Harness::new();
    let key = h.publish(1, EventType::Simple, PROGRAM, br#"{"level":2}"#);

    let err = h
        .client
        .submit_load_reduction_report(key, f64::NAN, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::InvalidValue(_)));
    assert!(h.reports().is_empty());
}

// ── lifecycle ────────────────────────────────────────────────────────

#[tokio::test]
async fn lifecycle_transitions() {
    let h = Harness::new();
    assert_eq!(h.client.state(), ClientState::Uninitialized);

    h.client.initialize().await.unwrap();
    assert_eq!(h.client.state(), ClientState::Polling);
    let registrations = h.vtn.registrations.lock().unwrap().clone();
    assert_eq!(registrations, vec![VenRegistration::for_program(VEN_ID, PROGRAM)]);

    assert!(matches!(
        h.client.initialize().await,
        Err(VenError::AlreadyInitialized)
    ));

    h.client.shutdown().await;
    assert_eq!(h.client.state(), ClientState::Terminated);
    assert!(matches!(h.client.initialize().await, Err(VenError::Terminated)));
    assert!(matches!(h.client.poll_once().await, Err(VenError::Terminated)));
}

#[tokio::test]
async fn registration_failure_returns_to_uninitialized() {
    let h = Harness::new();
    h.vtn.reject_registration.store(true, Ordering::SeqCst);

    let err = h.client.initialize().await.unwrap_err();
    assert!(matches!(err, VenError::Registration(_)));
    assert_eq!(h.client.state(), ClientState::Uninitialized);
    assert_eq!(h.lookup.calls.load(Ordering::SeqCst), 0, "no poll loop was started");

    h.vtn.reject_registration.store(false, Ordering::SeqCst);
    h.client.initialize().await.unwrap();
    assert_eq!(h.client.state(), ClientState::Polling);
    h.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn poll_loop_ticks_until_shutdown() {
    let h = Harness::new();
    let key = h.publish(1, EventType::Simple, PROGRAM, br#"{"level":2}"#);
    h.lookup.set_keys(vec![key]);

    h.client.initialize().await.unwrap();
    tokio::time::sleep(Duration::from_secs(25)).await;
    h.client.shutdown().await;

    let calls = h.lookup.calls.load(Ordering::SeqCst);
    assert!(calls >= 2, "expected repeated polling, got {calls} calls");
    assert_eq!(h.reports().len(), 1, "event dispatched once across ticks");

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.lookup.calls.load(Ordering::SeqCst), calls, "no polling after shutdown");
}
