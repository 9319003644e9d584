use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum WorkerMessage {
    Run(Job),
    Stop,
}

/// Owns the history worker thread; the last `Database` clone to go away
/// stops and joins it.
struct HistoryWorker {
    jobs: mpsc::Sender<WorkerMessage>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for HistoryWorker {
    fn drop(&mut self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let Some(handle) = handle else {
            return;
        };

        if self.jobs.send(WorkerMessage::Stop).is_err() {
            error!("Scan history worker already gone before stop");
        }
        if handle.join().is_err() {
            error!("Scan history worker panicked");
        }
    }
}

fn open_history(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("cannot open scan history at {}", path.display()))?;

    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        error!("Scan history stays in rollback journal mode: {err}");
    }

    run_migrations(&mut conn).context("scan history schema upgrade failed")?;
    Ok(conn)
}

fn serve(mut conn: Connection, inbox: mpsc::Receiver<WorkerMessage>) {
    while let Ok(message) = inbox.recv() {
        match message {
            WorkerMessage::Run(job) => job(&mut conn),
            WorkerMessage::Stop => break,
        }
    }
    debug!("Scan history worker stopped");
}

/// Handle to the scan history database.
///
/// All statements run on one dedicated thread that owns the SQLite
/// connection; clones share that thread.
#[derive(Clone)]
pub struct Database {
    worker: Arc<HistoryWorker>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("cannot create scan history directory {}", parent.display())
            })?;
        }

        let (jobs, inbox) = mpsc::channel::<WorkerMessage>();
        let (opened_tx, opened_rx) = mpsc::channel::<Result<()>>();
        let path = db_path.clone();

        let thread = thread::Builder::new()
            .name("station-db".into())
            .spawn(move || match open_history(&path) {
                Ok(conn) => {
                    if opened_tx.send(Ok(())).is_ok() {
                        serve(conn, inbox);
                    }
                }
                Err(err) => {
                    let _ = opened_tx.send(Err(err));
                }
            })
            .context("cannot start scan history worker")?;

        opened_rx
            .recv()
            .context("scan history worker exited during startup")??;

        info!("Scan history database ready at {}", db_path.display());

        Ok(Self {
            worker: Arc::new(HistoryWorker {
                jobs,
                thread: Mutex::new(Some(thread)),
            }),
        })
    }

    /// Runs `job` on the worker thread and waits for its result.
    pub async fn execute<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let message = WorkerMessage::Run(Box::new(move |conn| {
            // The caller may have given up waiting; the statement still ran.
            let _ = reply_tx.send(job(conn));
        }));

        self.worker
            .jobs
            .send(message)
            .map_err(|_| anyhow!("scan history worker is not running"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("scan history worker dropped the request"))?
    }
}
