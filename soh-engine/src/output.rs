//! Output destinations for batch results.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Where one kind of batch result is sent.
///
/// Every output of a pipeline receives the same shared result set, so adding
/// outputs never triggers recomputation.
#[derive(Debug)]
pub enum Output<T> {
    /// Append records to a file as newline-delimited JSON.
    File(PathBuf),

    /// Send each batch's result set through a channel.
    ///
    /// Use `Output::channel()` to create this variant and get the receiver.
    Channel(mpsc::Sender<Arc<[T]>>),
}

impl<T> Output<T>
where
    T: Serialize + Send + Sync + 'static,
{
    /// Create a file output.
    ///
    /// # Example
    ///
    /// ```rust
    /// use soh_engine::Output;
    /// use soh_types::StationSoh;
    ///
    /// let output: Output<StationSoh> = Output::file("station-soh.ndjson");
    /// ```
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Output::File(path.into())
    }

    /// Create a channel output and return both the output and receiver.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Arc<[T]>>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Output::Channel(tx), rx)
    }

    /// Emit one batch's results to this output.
    ///
    /// A channel whose receiver is gone is treated as a successful no-op.
    pub(crate) async fn emit(&self, records: &Arc<[T]>) -> std::io::Result<()> {
        match self {
            Output::File(path) => {
                let mut lines = Vec::new();
                for record in records.iter() {
                    serde_json::to_writer(&mut lines, record)?;
                    lines.push(b'\n');
                }
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?;
                file.write_all(&lines).await?;
                file.flush().await?;
            }
            Output::Channel(tx) => {
                let _ = tx.send(records.clone()).await;
            }
        }
        Ok(())
    }
}
