//! End-to-end runs of the archive pipeline against an in-memory server.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use flate2::read::GzDecoder;

use pecarchive_core::archive::{archive_name, digest_path_for, verify};
use pecarchive_core::config::ImapSettings;
use pecarchive_core::storage::{INDEX_JSON, SUMMARY_FILE};
use pecarchive_core::{
    Account, ArchiveReader, Config, Connector, ErrorKind, Mailbox, MessageRecord, Orchestrator,
    RawMessage, RetrievalCache, RetryPolicy, RunStatus, RunSummary, SearchQuery,
};

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
}

fn eml(subject: &str) -> Vec<u8> {
    format!(
        "From: Mittente <mittente@pec.it>\r\nTo: ufficio@pec.it\r\nSubject: {subject}\r\nDate: Mon, 15 Jan 2024 09:30:00 +0100\r\n\r\nCorpo del messaggio.\r\n"
    )
    .into_bytes()
}

/// Folder contents for one day, plus the folders whose SELECT is refused.
#[derive(Default)]
struct FakeServer {
    folders: HashMap<String, Vec<RawMessage>>,
    refused: HashSet<String>,
}

impl FakeServer {
    fn standard() -> Self {
        let mut server = Self::default();
        server.folders.insert(
            "INBOX".into(),
            vec![
                RawMessage {
                    uid: 1,
                    body: eml("Ricevuta di consegna"),
                },
                RawMessage {
                    uid: 2,
                    body: eml("Fattura 42"),
                },
            ],
        );
        server.folders.insert(
            "Posta_inviata".into(),
            vec![RawMessage {
                uid: 7,
                body: eml("Invio documenti"),
            }],
        );
        server
    }
}

#[derive(Clone, Copy)]
enum Behavior {
    Serve,
    RefuseLogin,
    Panic,
    /// Any fetch that includes this UID is rejected with NO.
    FailFetch(u32),
    /// This UID is silently left out of fetch responses.
    Omit(u32),
    /// The first session says BYE on the SELECT that follows this folder.
    DropSessionAfter(&'static str),
}

/// Sessions open at once, and the most ever seen.
#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Hands out sessions on a shared fake server; behavior is chosen per
/// username.
struct FakeConnector {
    server: Arc<FakeServer>,
    behaviors: HashMap<String, Behavior>,
    connects: AtomicUsize,
    dropped: AtomicBool,
    latency: Duration,
    gauge: Arc<Gauge>,
    fetches: Arc<Mutex<Vec<Vec<u32>>>>,
}

impl FakeConnector {
    fn new(server: FakeServer) -> Self {
        Self {
            server: Arc::new(server),
            behaviors: HashMap::new(),
            connects: AtomicUsize::new(0),
            dropped: AtomicBool::new(false),
            latency: Duration::ZERO,
            gauge: Arc::default(),
            fetches: Arc::default(),
        }
    }

    fn with(mut self, username: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(username.into(), behavior);
        self
    }

    /// Every SELECT takes this long.
    fn slow(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn fetch_calls(&self) -> Vec<Vec<u32>> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        account: &Account,
        _settings: &ImapSettings,
    ) -> pecarchive_imap::Result<Box<dyn Mailbox>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .behaviors
            .get(&account.username)
            .copied()
            .unwrap_or(Behavior::Serve);
        match behavior {
            Behavior::RefuseLogin => {
                return Err(pecarchive_imap::Error::No(
                    "[AUTHENTICATIONFAILED] invalid credentials".into(),
                ));
            }
            Behavior::Panic => panic!("connector exploded"),
            _ => {}
        }

        let drop_after = match behavior {
            Behavior::DropSessionAfter(folder) if !self.dropped.swap(true, Ordering::SeqCst) => {
                Some(folder)
            }
            _ => None,
        };
        self.gauge.enter();
        Ok(Box::new(FakeMailbox {
            server: Arc::clone(&self.server),
            selected: None,
            behavior,
            drop_after,
            latency: self.latency,
            gauge: Arc::clone(&self.gauge),
            fetches: Arc::clone(&self.fetches),
        }))
    }
}

struct FakeMailbox {
    server: Arc<FakeServer>,
    selected: Option<String>,
    behavior: Behavior,
    drop_after: Option<&'static str>,
    latency: Duration,
    gauge: Arc<Gauge>,
    fetches: Arc<Mutex<Vec<Vec<u32>>>>,
}

impl FakeMailbox {
    fn messages(&self) -> &[RawMessage] {
        self.selected
            .as_ref()
            .and_then(|f| self.server.folders.get(f))
            .map_or(&[], Vec::as_slice)
    }
}

#[async_trait]
impl Mailbox for FakeMailbox {
    async fn select_folder(&mut self, folder: &str) -> pecarchive_imap::Result<u32> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let (Some(after), Some(previous)) = (self.drop_after, self.selected.as_deref())
            && after == previous
        {
            return Err(pecarchive_imap::Error::Bye("server shutting down".into()));
        }
        if self.server.refused.contains(folder) {
            return Err(pecarchive_imap::Error::No("Mailbox does not exist".into()));
        }
        self.selected = Some(folder.to_string());
        Ok(u32::try_from(self.messages().len()).unwrap())
    }

    async fn search_by_date(&mut self, _date: NaiveDate) -> pecarchive_imap::Result<Vec<u32>> {
        Ok(self.messages().iter().map(|m| m.uid).collect())
    }

    async fn fetch_batch(&mut self, uids: &[u32]) -> pecarchive_imap::Result<Vec<RawMessage>> {
        self.fetches.lock().unwrap().push(uids.to_vec());
        if let Behavior::FailFetch(bad) = self.behavior
            && uids.contains(&bad)
        {
            return Err(pecarchive_imap::Error::No("[UNAVAILABLE] cannot read message".into()));
        }
        let omitted = match self.behavior {
            Behavior::Omit(uid) => Some(uid),
            _ => None,
        };
        Ok(self
            .messages()
            .iter()
            .filter(|m| uids.contains(&m.uid) && Some(m.uid) != omitted)
            .cloned()
            .collect())
    }

    async fn disconnect(&mut self) {
        self.gauge.leave();
    }
}

fn account(username: &str) -> Account {
    Account::new(
        username,
        "secret",
        "imap.pec.it",
        vec!["INBOX".into(), "Posta_inviata".into()],
    )
}

fn orchestrator(root: &Path, connector: Arc<FakeConnector>, accounts: Vec<Account>) -> Orchestrator {
    let mut config = Config::new(root, accounts);
    config.retry_policy = RetryPolicy::no_retry();
    Orchestrator::with_connector(&config, connector)
}

fn day_dir(root: &Path, storage_name: &str) -> PathBuf {
    root.join(storage_name).join("2024").join("2024-01-15")
}

fn container_members(archive: &Path) -> Vec<String> {
    let file = std::fs::File::open(archive).unwrap();
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    let mut names: Vec<String> = tar
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn read_index(day: &Path) -> Vec<MessageRecord> {
    serde_json::from_slice(&std::fs::read(day.join(INDEX_JSON)).unwrap()).unwrap()
}

#[tokio::test]
async fn test_clean_run_archives_everything() {
    let tmp = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::new(FakeServer::standard()));
    let orch = orchestrator(tmp.path(), connector, vec![account("mario.rossi@pec.it")]);

    let report = orch.run_for_date(date()).await;
    assert_eq!(report.accounts_processed, 1);
    assert_eq!(report.accounts_successful, 1);
    assert_eq!(report.total_messages, 3);
    assert!(!report.has_errors());

    let day = day_dir(tmp.path(), "mario.rossi");
    let summary = RunSummary::read(&day.join(SUMMARY_FILE)).unwrap();
    assert_eq!(summary.status(), RunStatus::Success);
    assert_eq!(summary.statistics.folders["INBOX"], 2);
    assert_eq!(summary.statistics.folders["Posta_inviata"], 1);

    let records = read_index(&day);
    let keys: Vec<_> = records.iter().map(|r| (r.folder.as_str(), r.uid)).collect();
    assert_eq!(keys, vec![("INBOX", 1), ("INBOX", 2), ("Posta_inviata", 7)]);
    assert_eq!(records[1].subject, "Fattura 42");
    assert_eq!(
        std::fs::read(day.join(&records[1].filepath)).unwrap(),
        eml("Fattura 42")
    );

    let archive = day.join(archive_name("mario.rossi", date()));
    assert!(verify(&archive, &digest_path_for(&archive)));
    let members = container_members(&archive);
    assert!(members.contains(&"INBOX/2_Fattura 42.eml".to_string()));
    assert!(members.contains(&"index.csv".to_string()));
    assert!(!members.iter().any(|m| m.ends_with("summary.json")));
    assert_eq!(
        summary.archive.as_ref().map(|a| a.filename.clone()),
        Some(archive_name("mario.rossi", date()))
    );
}

#[tokio::test]
async fn test_refused_folder_is_recorded_and_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let mut server = FakeServer::standard();
    server.refused.insert("Posta_inviata".into());
    let connector = Arc::new(FakeConnector::new(server));
    let orch = orchestrator(tmp.path(), connector, vec![account("mario.rossi@pec.it")]);

    let report = orch.run_for_date(date()).await;
    assert_eq!(report.accounts_with_errors, 1);
    assert_eq!(report.total_errors, 1);

    let day = day_dir(tmp.path(), "mario.rossi");
    let summary = RunSummary::read(&day.join(SUMMARY_FILE)).unwrap();
    assert_eq!(summary.status(), RunStatus::CompletedWithErrors);
    assert_eq!(summary.error_count(), 1);
    assert_eq!(summary.errors()[0].kind, ErrorKind::Folder);
    assert_eq!(summary.errors()[0].folder.as_deref(), Some("Posta_inviata"));
    assert_eq!(summary.statistics.total_messages, 2);

    let archive = day.join(archive_name("mario.rossi", date()));
    let saved = container_members(&archive)
        .into_iter()
        .filter(|m| m.ends_with(".eml"))
        .count();
    assert_eq!(saved, 2);
}

#[tokio::test]
async fn test_failed_login_retries_then_reports() {
    let tmp = tempfile::tempdir().unwrap();
    let connector = Arc::new(
        FakeConnector::new(FakeServer::standard()).with("mario.rossi@pec.it", Behavior::RefuseLogin),
    );
    let mut config = Config::new(tmp.path(), vec![account("mario.rossi@pec.it")]);
    config.retry_policy = RetryPolicy::new(2, 0.0, 2.0);
    let orch = Orchestrator::with_connector(&config, Arc::clone(&connector) as Arc<dyn Connector>);

    let report = orch.run_for_date(date()).await;
    assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
    assert_eq!(report.accounts_processed, 1);
    assert_eq!(report.accounts_with_errors, 1);
    assert_eq!(report.total_messages, 0);

    let summary =
        RunSummary::read(&day_dir(tmp.path(), "mario.rossi").join(SUMMARY_FILE)).unwrap();
    assert_eq!(summary.error_count(), 1);
    assert_eq!(summary.errors()[0].kind, ErrorKind::Connection);
}

#[tokio::test]
async fn test_panicking_account_does_not_stop_others() {
    let tmp = tempfile::tempdir().unwrap();
    let connector = Arc::new(
        FakeConnector::new(FakeServer::standard()).with("guasto@pec.it", Behavior::Panic),
    );
    let accounts = vec![
        account("guasto@pec.it"),
        account("mario.rossi@pec.it"),
        account("ufficio@pec.it"),
    ];
    let mut config = Config::new(tmp.path(), accounts);
    config.retry_policy = RetryPolicy::no_retry();
    config.concurrency = 2;
    let orch = Orchestrator::with_connector(&config, connector);

    let report = orch.run_for_date(date()).await;
    assert_eq!(report.accounts_processed, 3);
    assert_eq!(report.accounts_successful, 2);
    assert_eq!(report.accounts_with_errors, 1);
    assert_eq!(report.total_messages, 6);

    let failed = report
        .accounts
        .iter()
        .find(|a| a.account == "guasto@pec.it")
        .unwrap();
    assert_eq!(failed.status, RunStatus::CompletedWithErrors);

    let summary = RunSummary::read(&day_dir(tmp.path(), "guasto").join(SUMMARY_FILE)).unwrap();
    assert_eq!(summary.errors()[0].kind, ErrorKind::Orchestration);
}

#[tokio::test]
async fn test_rerun_replaces_outputs() {
    let tmp = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::new(FakeServer::standard()));
    let orch = orchestrator(tmp.path(), connector, vec![account("mario.rossi@pec.it")]);

    orch.run_for_date(date()).await;
    let report = orch.run_for_date(date()).await;
    assert_eq!(report.total_messages, 3);

    let day = day_dir(tmp.path(), "mario.rossi");
    assert_eq!(read_index(&day).len(), 3);
    let containers = std::fs::read_dir(&day)
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .ends_with(".tar.gz")
        })
        .count();
    assert_eq!(containers, 1);
    let archive = day.join(archive_name("mario.rossi", date()));
    assert!(verify(&archive, &digest_path_for(&archive)));
}

#[tokio::test]
async fn test_archived_day_is_queryable_after_cleanup() {
    let tmp = tempfile::tempdir().unwrap();
    let connector = Arc::new(FakeConnector::new(FakeServer::standard()));
    let orch = orchestrator(tmp.path(), connector, vec![account("mario.rossi@pec.it")]);
    orch.run_for_date(date()).await;

    let day = day_dir(tmp.path(), "mario.rossi");
    std::fs::remove_dir_all(day.join("INBOX")).unwrap();

    let cache_dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(RetrievalCache::open(cache_dir.path(), 10 * 1024 * 1024).unwrap());
    let reader = ArchiveReader::new(tmp.path(), cache);

    let results = reader
        .search(&SearchQuery {
            subject: Some("fattura".into()),
            ..SearchQuery::default()
        })
        .unwrap();
    assert_eq!(results.total, 1);
    let hit = &results.hits[0];
    assert_eq!(hit.account, "mario.rossi");

    let body = reader
        .read_message("mario.rossi", "2024-01-15", &hit.message.folder, &hit.message.filename)
        .unwrap();
    assert_eq!(body, eml("Fattura 42"));
}

#[tokio::test]
async fn test_failed_message_is_recorded_and_folder_continues() {
    let tmp = tempfile::tempdir().unwrap();
    let connector = Arc::new(
        FakeConnector::new(FakeServer::standard())
            .with("mario.rossi@pec.it", Behavior::FailFetch(1)),
    );
    let orch = orchestrator(
        tmp.path(),
        Arc::clone(&connector),
        vec![account("mario.rossi@pec.it")],
    );

    let report = orch.run_for_date(date()).await;
    assert_eq!(report.total_messages, 2);
    assert_eq!(report.total_errors, 1);
    assert_eq!(
        connector.fetch_calls(),
        vec![vec![1, 2], vec![1], vec![2], vec![7]]
    );

    let day = day_dir(tmp.path(), "mario.rossi");
    let summary = RunSummary::read(&day.join(SUMMARY_FILE)).unwrap();
    assert_eq!(summary.status(), RunStatus::CompletedWithErrors);
    let error = &summary.errors()[0];
    assert_eq!(error.kind, ErrorKind::Fetch);
    assert_eq!(error.folder.as_deref(), Some("INBOX"));
    assert_eq!(error.uid, Some(1));
    assert!(error.message.contains("cannot read message"));

    let keys: Vec<_> = read_index(&day)
        .iter()
        .map(|r| (r.folder.clone(), r.uid))
        .collect();
    assert_eq!(
        keys,
        vec![("INBOX".to_string(), 2), ("Posta_inviata".to_string(), 7)]
    );
}

#[tokio::test]
async fn test_message_missing_from_response_is_recorded() {
    let tmp = tempfile::tempdir().unwrap();
    let connector = Arc::new(
        FakeConnector::new(FakeServer::standard()).with("mario.rossi@pec.it", Behavior::Omit(2)),
    );
    let orch = orchestrator(tmp.path(), connector, vec![account("mario.rossi@pec.it")]);

    let report = orch.run_for_date(date()).await;
    assert_eq!(report.total_messages, 2);

    let summary =
        RunSummary::read(&day_dir(tmp.path(), "mario.rossi").join(SUMMARY_FILE)).unwrap();
    assert_eq!(summary.error_count(), 1);
    let error = &summary.errors()[0];
    assert_eq!(error.kind, ErrorKind::Fetch);
    assert_eq!(error.uid, Some(2));
    assert!(error.message.contains("message not returned by server"));
}

#[tokio::test]
async fn test_fetches_are_chunked_by_batch_size() {
    let tmp = tempfile::tempdir().unwrap();
    let mut server = FakeServer::standard();
    server.folders.insert(
        "INBOX".into(),
        (1..=5)
            .map(|uid| RawMessage {
                uid,
                body: eml(&format!("Messaggio {uid}")),
            })
            .collect(),
    );
    let connector = Arc::new(FakeConnector::new(server));
    let mut config = Config::new(tmp.path(), vec![account("mario.rossi@pec.it")]);
    config.retry_policy = RetryPolicy::no_retry();
    config.imap.batch_size = 2;
    let orch = Orchestrator::with_connector(&config, Arc::clone(&connector) as Arc<dyn Connector>);

    let report = orch.run_for_date(date()).await;
    assert_eq!(report.total_messages, 6);
    assert!(!report.has_errors());
    assert_eq!(
        connector.fetch_calls(),
        vec![vec![1, 2], vec![3, 4], vec![5], vec![7]]
    );
}

#[tokio::test]
async fn test_lost_session_is_retried_without_duplicates() {
    let tmp = tempfile::tempdir().unwrap();
    let connector = Arc::new(
        FakeConnector::new(FakeServer::standard())
            .with("mario.rossi@pec.it", Behavior::DropSessionAfter("INBOX")),
    );
    let mut config = Config::new(tmp.path(), vec![account("mario.rossi@pec.it")]);
    config.retry_policy = RetryPolicy::new(1, 0.0, 2.0);
    let orch = Orchestrator::with_connector(&config, Arc::clone(&connector) as Arc<dyn Connector>);

    let report = orch.run_for_date(date()).await;
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    assert_eq!(report.total_messages, 3);
    assert!(!report.has_errors());

    let day = day_dir(tmp.path(), "mario.rossi");
    let summary = RunSummary::read(&day.join(SUMMARY_FILE)).unwrap();
    assert_eq!(summary.status(), RunStatus::Success);

    let keys: Vec<_> = read_index(&day)
        .iter()
        .map(|r| (r.folder.clone(), r.uid))
        .collect();
    assert_eq!(
        keys,
        vec![
            ("INBOX".to_string(), 1),
            ("INBOX".to_string(), 2),
            ("Posta_inviata".to_string(), 7),
        ]
    );
}

#[tokio::test]
async fn test_unwritable_day_directory_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("mario.rossi")).unwrap();
    std::fs::write(tmp.path().join("mario.rossi").join("2024"), b"not a directory").unwrap();
    let connector = Arc::new(FakeConnector::new(FakeServer::standard()));
    let orch = orchestrator(
        tmp.path(),
        Arc::clone(&connector),
        vec![account("mario.rossi@pec.it"), account("ufficio@pec.it")],
    );

    let report = orch.run_for_date(date()).await;
    assert_eq!(report.accounts_processed, 2);
    assert_eq!(report.accounts_successful, 1);
    assert_eq!(report.accounts_with_errors, 1);
    assert_eq!(report.total_messages, 3);
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);

    let failed = report
        .accounts
        .iter()
        .find(|a| a.account == "mario.rossi@pec.it")
        .unwrap();
    assert_eq!(failed.status, RunStatus::CompletedWithErrors);
    assert_eq!(failed.messages, 0);
    assert!(!day_dir(tmp.path(), "mario.rossi").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_bounds_concurrent_accounts() {
    let tmp = tempfile::tempdir().unwrap();
    let connector =
        Arc::new(FakeConnector::new(FakeServer::standard()).slow(Duration::from_millis(20)));
    let accounts: Vec<_> = (0..5).map(|i| account(&format!("casella{i}@pec.it"))).collect();
    let mut config = Config::new(tmp.path(), accounts);
    config.retry_policy = RetryPolicy::no_retry();
    config.concurrency = 2;
    let orch = Orchestrator::with_connector(&config, Arc::clone(&connector) as Arc<dyn Connector>);

    let report = orch.run_for_date(date()).await;
    assert_eq!(report.accounts_processed, 5);
    assert_eq!(report.accounts_successful, 5);
    assert_eq!(connector.gauge.peak.load(Ordering::SeqCst), 2);
    assert_eq!(connector.gauge.current.load(Ordering::SeqCst), 0);
}
