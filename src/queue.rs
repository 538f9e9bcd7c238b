//! Connection-aware outbound send queue.
//!
//! Replies are executed immediately while the chat transport is ready and
//! buffered FIFO otherwise. The queue is unbounded by design (the upstream
//! behavior this bridge preserves); sustained growth is logged so a long
//! disconnection is at least visible.

use crate::transport::ChatTransport;
use std::collections::VecDeque;

const GROWTH_WARN_EVERY: usize = 50;

/// A deferred outbound send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundTask {
    pub to: String,
    pub text: String,
}

/// FIFO queue of outbound sends, gated by chat-transport readiness.
#[derive(Debug, Default)]
pub struct SendQueue {
    ready: bool,
    pending: VecDeque<OutboundTask>,
}

impl SendQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the readiness gate. Flushing on a false→true transition is the
    /// lifecycle manager's job, not a side effect of this setter.
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Send now when ready, otherwise buffer. Send failures are logged and
    /// never propagate: a failed reply must not derail message handling.
    pub async fn enqueue(&mut self, chat: &dyn ChatTransport, task: OutboundTask) {
        if self.ready {
            if let Err(err) = chat.send_text(&task.to, &task.text).await {
                tracing::error!("failed to send message to {}: {err}", task.to);
            }
            return;
        }

        self.pending.push_back(task);
        tracing::info!("message queued until the chat transport is ready");
        if self.pending.len() % GROWTH_WARN_EVERY == 0 {
            tracing::warn!(
                "send queue has {} buffered messages while disconnected",
                self.pending.len()
            );
        }
    }

    /// Drain the buffer in insertion order, awaiting each send before the
    /// next starts. A failed task is logged and skipped; the rest of the
    /// flush continues.
    pub async fn flush(&mut self, chat: &dyn ChatTransport) {
        while let Some(task) = self.pending.pop_front() {
            if let Err(err) = chat.send_text(&task.to, &task.text).await {
                tracing::error!("failed to flush queued message to {}: {err}", task.to);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingChat {
        sent: Mutex<Vec<(String, String)>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl ChatTransport for RecordingChat {
        async fn send_text(&self, to: &str, text: &str) -> anyhow::Result<()> {
            if self.fail_on.as_deref() == Some(text) {
                anyhow::bail!("simulated send failure");
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_owned(), text.to_owned()));
            Ok(())
        }

        async fn connect(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn task(text: &str) -> OutboundTask {
        OutboundTask {
            to: "user@s.whatsapp.net".to_owned(),
            text: text.to_owned(),
        }
    }

    #[tokio::test]
    async fn sends_immediately_when_ready() {
        let chat = RecordingChat::default();
        let mut queue = SendQueue::new();
        queue.set_ready(true);

        queue.enqueue(&chat, task("hello")).await;

        assert_eq!(queue.pending_len(), 0);
        assert_eq!(chat.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn buffers_while_not_ready() {
        let chat = RecordingChat::default();
        let mut queue = SendQueue::new();

        queue.enqueue(&chat, task("one")).await;
        queue.enqueue(&chat, task("two")).await;

        assert_eq!(queue.pending_len(), 2);
        assert!(chat.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn flush_preserves_insertion_order_without_loss() {
        let chat = RecordingChat::default();
        let mut queue = SendQueue::new();

        for i in 0..5 {
            queue.enqueue(&chat, task(&format!("msg-{i}"))).await;
        }
        queue.set_ready(true);
        queue.flush(&chat).await;

        let sent = chat.sent.lock().unwrap();
        let texts: Vec<&str> = sent.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(texts, ["msg-0", "msg-1", "msg-2", "msg-3", "msg-4"]);
        assert_eq!(queue.pending_len(), 0);
    }

    #[tokio::test]
    async fn one_failed_task_does_not_abort_the_flush() {
        let chat = RecordingChat {
            fail_on: Some("bad".to_owned()),
            ..Default::default()
        };
        let mut queue = SendQueue::new();

        queue.enqueue(&chat, task("first")).await;
        queue.enqueue(&chat, task("bad")).await;
        queue.enqueue(&chat, task("last")).await;
        queue.set_ready(true);
        queue.flush(&chat).await;

        let sent = chat.sent.lock().unwrap();
        let texts: Vec<&str> = sent.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(texts, ["first", "last"]);
        assert_eq!(queue.pending_len(), 0);
    }
}
