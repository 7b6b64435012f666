//! Study logger: watch the study list and record studies from watched researchers.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use notify::{Event as NotifyEvent, EventKind, PollWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::core::study_filter::{StudyRecord, select_new_matches};
use crate::io::seen_store::{LoggedStudies, load_logged_studies, write_logged_studies};
use crate::io::sheet::SheetSink;
use crate::io::study_feed::load_study_cards;

/// Logged-study bookkeeping plus the optional remote sink.
pub struct StudyLogger<S> {
    studies_path: PathBuf,
    store_path: PathBuf,
    targets: Vec<String>,
    sink: Option<S>,
    logged: LoggedStudies,
}

impl<S: SheetSink> StudyLogger<S> {
    /// Load previously logged studies from `store_path`.
    pub fn open(
        studies_path: impl Into<PathBuf>,
        store_path: impl Into<PathBuf>,
        targets: Vec<String>,
        sink: Option<S>,
    ) -> Result<Self> {
        let store_path = store_path.into();
        let logged = load_logged_studies(&store_path)?;
        info!(count = logged.len(), "loaded logged studies");
        Ok(Self {
            studies_path: studies_path.into(),
            store_path,
            targets,
            sink,
            logged,
        })
    }

    pub fn studies_path(&self) -> &Path {
        &self.studies_path
    }

    pub fn logged(&self) -> &LoggedStudies {
        &self.logged
    }

    /// Check the current list once. Returns the studies logged by this check.
    ///
    /// Records are persisted locally before the remote post; a failed post is
    /// logged and never retried.
    pub async fn check(&mut self) -> Result<Vec<StudyRecord>> {
        let cards = load_study_cards(&self.studies_path)?;
        debug!(cards = cards.len(), "checking studies");
        let records = select_new_matches(&cards, &self.targets, &self.logged, &Local::now());
        if records.is_empty() {
            return Ok(records);
        }
        let mut logged = self.logged.clone();
        for record in &records {
            info!(
                id = %record.id,
                researcher = %record.researcher,
                title = %record.title,
                "match found"
            );
            logged.insert(record.id.clone(), record.clone());
        }
        // Commit the batch in memory only once it is on disk.
        write_logged_studies(&self.store_path, &logged)?;
        self.logged = logged;

        if let Some(sink) = &self.sink {
            for record in &records {
                if let Err(err) = sink.append(record).await {
                    error!(id = %record.id, error = %format!("{err:#}"), "sheet logging failed");
                }
            }
        }
        Ok(records)
    }
}

/// Run the logger until `shutdown` resolves.
///
/// Checks once immediately, then after every burst of changes to the study
/// list file once it has been quiet for `debounce`.
pub async fn run_watch<S, F, Q>(
    logger: &mut StudyLogger<S>,
    debounce: Duration,
    mut on_record: F,
    shutdown: Q,
) -> Result<()>
where
    S: SheetSink,
    F: FnMut(&StudyRecord),
    Q: Future<Output = ()>,
{
    let studies_path = logger.studies_path().to_path_buf();
    let watch_dir = studies_path
        .parent()
        .map(Path::to_path_buf)
        .context("study list path has no parent directory")?;

    let (tx, mut rx) = mpsc::channel::<NotifyEvent>(100);
    let mut watcher = PollWatcher::new(
        move |res: Result<NotifyEvent, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.try_send(event);
            }
        },
        notify::Config::default().with_poll_interval(Duration::from_millis(250)),
    )?;
    watcher
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("watch {}", watch_dir.display()))?;
    info!(path = %studies_path.display(), "watching study list");

    run_check(logger, &mut on_record).await;

    tokio::pin!(shutdown);
    let mut deadline: Option<Instant> = None;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Some(event) = rx.recv() => {
                if touches(&event, &studies_path) {
                    deadline = Some(Instant::now() + debounce);
                }
            }
            _ = wait_until(deadline) => {
                deadline = None;
                run_check(logger, &mut on_record).await;
            }
        }
    }
    debug!("study watcher stopped");
    Ok(())
}

async fn run_check<S: SheetSink, F: FnMut(&StudyRecord)>(
    logger: &mut StudyLogger<S>,
    on_record: &mut F,
) {
    match logger.check().await {
        Ok(records) => {
            for record in &records {
                on_record(record);
            }
        }
        Err(err) => warn!(error = %format!("{err:#}"), "study check failed"),
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn touches(event: &NotifyEvent, path: &Path) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|changed| changed == path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;

    #[derive(Clone, Default)]
    struct RecordingSink {
        rows: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl SheetSink for RecordingSink {
        async fn append(&self, record: &StudyRecord) -> Result<()> {
            self.rows.lock().expect("rows").push(record.id.clone());
            if self.fail {
                return Err(anyhow!("sheet offline"));
            }
            Ok(())
        }
    }

    fn write_cards(path: &Path, body: &str) {
        fs::write(path, body).expect("write cards");
    }

    #[tokio::test]
    async fn check_logs_new_matches_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let studies = temp.path().join("studies.json");
        let store = temp.path().join("logged.json");
        write_cards(
            &studies,
            r#"[{"id":"s1","host":"By Katy","title":"One"},{"id":"s2","host":"By Bob"}]"#,
        );
        let sink = RecordingSink::default();
        let mut logger = StudyLogger::open(
            &studies,
            &store,
            vec!["Katy".to_string()],
            Some(sink.clone()),
        )
        .expect("open");

        let first = logger.check().await.expect("check");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, "s1");
        let second = logger.check().await.expect("check");
        assert!(second.is_empty());

        assert_eq!(*sink.rows.lock().expect("rows"), vec!["s1".to_string()]);
        assert!(load_logged_studies(&store).expect("load").contains_key("s1"));
    }

    #[tokio::test]
    async fn reopened_logger_remembers_logged_studies() {
        let temp = tempfile::tempdir().expect("tempdir");
        let studies = temp.path().join("studies.json");
        let store = temp.path().join("logged.json");
        write_cards(&studies, r#"[{"id":"s1","host":"By Katy"}]"#);

        let mut logger: StudyLogger<RecordingSink> =
            StudyLogger::open(&studies, &store, vec!["Katy".to_string()], None).expect("open");
        assert_eq!(logger.check().await.expect("check").len(), 1);

        let mut reopened: StudyLogger<RecordingSink> =
            StudyLogger::open(&studies, &store, vec!["Katy".to_string()], None).expect("open");
        assert_eq!(reopened.logged().len(), 1);
        assert!(reopened.check().await.expect("check").is_empty());
    }

    #[tokio::test]
    async fn failed_post_still_records_locally() {
        let temp = tempfile::tempdir().expect("tempdir");
        let studies = temp.path().join("studies.json");
        let store = temp.path().join("logged.json");
        write_cards(&studies, r#"[{"id":"s1","host":"By Katy"}]"#);
        let sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        let mut logger =
            StudyLogger::open(&studies, &store, vec!["Katy".to_string()], Some(sink))
                .expect("open");

        let records = logger.check().await.expect("check");
        assert_eq!(records.len(), 1);
        assert!(logger.logged().contains_key("s1"));
    }

    #[tokio::test]
    async fn failed_store_write_reports_study_again() {
        let temp = tempfile::tempdir().expect("tempdir");
        let studies = temp.path().join("studies.json");
        let blocker = temp.path().join("blocker");
        let store = blocker.join("logged.json");
        write_cards(&studies, r#"[{"id":"s1","host":"By Katy"}]"#);
        let sink = RecordingSink::default();
        let mut logger = StudyLogger::open(
            &studies,
            &store,
            vec!["Katy".to_string()],
            Some(sink.clone()),
        )
        .expect("open");

        fs::write(&blocker, "not a directory").expect("write blocker");
        assert!(logger.check().await.is_err());
        assert!(logger.logged().is_empty());
        assert!(sink.rows.lock().expect("rows").is_empty());

        fs::remove_file(&blocker).expect("remove blocker");
        let records = logger.check().await.expect("check");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "s1");
        assert_eq!(*sink.rows.lock().expect("rows"), vec!["s1".to_string()]);
        assert!(load_logged_studies(&store).expect("load").contains_key("s1"));
    }

    #[tokio::test]
    async fn watch_runs_initial_check_and_stops_on_shutdown() {
        let temp = tempfile::tempdir().expect("tempdir");
        let studies = temp.path().join("studies.json");
        let store = temp.path().join("logged.json");
        write_cards(&studies, r#"[{"id":"s1","host":"By Katy"}]"#);
        let mut logger: StudyLogger<RecordingSink> =
            StudyLogger::open(&studies, &store, vec!["Katy".to_string()], None).expect("open");

        let mut seen = Vec::new();
        run_watch(
            &mut logger,
            Duration::from_millis(10),
            |record| seen.push(record.id.clone()),
            async {},
        )
        .await
        .expect("watch");

        assert_eq!(seen, vec!["s1".to_string()]);
    }
}
