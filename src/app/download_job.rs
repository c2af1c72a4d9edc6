//! Async controller around one remote fetch.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::domain::errors::DomainError;
use crate::domain::model::{DownloadProgress, DownloadState};
use crate::ports::RemoteFetcher;

#[derive(Debug)]
pub struct DownloadJobController {
    progress_rx: watch::Receiver<DownloadProgress>,
    cancel: CancellationToken,
    handle: std::sync::Mutex<Option<JoinHandle<Result<PathBuf, DomainError>>>>,
}

impl DownloadJobController {
    /// Kick off a download. URL validation happens before job creation; a
    /// controller always corresponds to an accepted URL.
    pub fn start(
        fetcher: Arc<dyn RemoteFetcher>,
        url: String,
        output_dir: PathBuf,
    ) -> Arc<Self> {
        let (progress_tx, progress_rx) = watch::channel(DownloadProgress::queued());
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let result = fetcher
                .fetch(&url, &output_dir, progress_tx.clone(), task_cancel)
                .await;
            let snapshot = progress_tx.borrow().clone();
            match &result {
                Ok(path) => {
                    info!("download completed: {}", path.display());
                    let _ = progress_tx.send(DownloadProgress {
                        state: DownloadState::Completed,
                        percent: 100.0,
                        output_path: Some(path.clone()),
                        error_message: None,
                        ..snapshot
                    });
                }
                Err(DomainError::Cancelled) => {
                    let _ = progress_tx.send(DownloadProgress {
                        state: DownloadState::Cancelled,
                        error_message: None,
                        ..snapshot
                    });
                }
                Err(e) => {
                    error!("download failed: {e}");
                    let _ = progress_tx.send(DownloadProgress {
                        state: DownloadState::Error,
                        error_message: Some(e.to_string()),
                        ..snapshot
                    });
                }
            }
            result
        });
        Arc::new(Self {
            progress_rx,
            cancel,
            handle: std::sync::Mutex::new(Some(handle)),
        })
    }

    pub fn progress(&self) -> DownloadProgress {
        self.progress_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DownloadProgress> {
        self.progress_rx.clone()
    }

    /// Request cancellation; the fetch tool is killed and its partial file
    /// left in place for a later retry to resume.
    pub fn cancel(&self) {
        info!("download cancellation requested");
        self.cancel.cancel();
    }

    /// Await the download's completion.
    pub async fn wait(&self) -> Result<PathBuf, DomainError> {
        let handle = match self.handle.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let Some(handle) = handle else {
            return Err(DomainError::FetchFail("download already awaited".into()));
        };
        handle
            .await
            .map_err(|e| DomainError::FetchFail(format!("download task panicked: {e}")))?
    }
}
