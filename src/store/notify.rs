//! Default notification sink: logs the message instead of sending it.
//!
//! Real deployments substitute a transport-backed implementation; the
//! contract stays fire-and-forget either way.

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use super::Notifier;

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, subject: &str, message: &str) -> Result<()> {
        warn!(subject, message, "failure notification");
        Ok(())
    }
}
