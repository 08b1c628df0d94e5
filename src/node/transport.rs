//! Output side of the line-delimited JSON transport.

use std::{fmt, pin::Pin};

use maelstrom_protocol::Message;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use crate::error::NodeResult;

type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Serialized writer shared by every task of a node.
///
/// Each message is encoded up front and written as one `line + "\n"` while
/// the lock is held, so concurrent senders never interleave bytes.
pub struct OutputSink {
    writer: Mutex<BoxedWriter>,
}

impl OutputSink {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + 'static,
    {
        Self {
            writer: Mutex::new(Box::pin(writer)),
        }
    }

    pub async fn write_message(&self, msg: &Message) -> NodeResult<()> {
        let mut line = msg.encode()?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink").finish_non_exhaustive()
    }
}
