use anyhow::Result;
use async_trait::async_trait;
use chat::MessageSink;
use storage::Store;
use tracing::warn;

/// Forwards to the real sink and records every delivered message in
/// `raw_events`.
pub struct AuditedSink {
    inner: Box<dyn MessageSink>,
    store: Store,
    run_id: String,
}

impl AuditedSink {
    pub fn new(inner: Box<dyn MessageSink>, store: Store, run_id: String) -> Self {
        Self {
            inner,
            store,
            run_id,
        }
    }
}

impl AuditedSink {
    async fn record(&self, kind: &str, text: &str) {
        let payload = serde_json::json!({ "text": text });
        if let Err(err) = self
            .store
            .log_event(&self.run_id, "chat", kind, &payload.to_string())
            .await
        {
            warn!(error = ?err, "failed to record sent message");
        }
    }
}

#[async_trait]
impl MessageSink for AuditedSink {
    async fn send(&self, text: &str) -> Result<()> {
        self.inner.send(text).await?;
        self.record("message", text).await;
        Ok(())
    }

    async fn send_preformatted(&self, text: &str) -> Result<()> {
        self.inner.send_preformatted(text).await?;
        self.record("table", text).await;
        Ok(())
    }
}
