//! Request/reply rendezvous between a job waiting for human input and the trigger that
//! receives it.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;

use crate::context::Ctx;
use crate::error::{CoreError, CoreResult};

struct Pending {
    id: u64,
    reply: oneshot::Sender<String>,
}

/// At most one in-flight question per key.
pub struct Conversation<K> {
    pending: Mutex<HashMap<K, Pending>>,
    next_id: AtomicU64,
}

impl<K: Eq + Hash + Clone + Display> Default for Conversation<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone + Display> Conversation<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// ## Summary
    /// Registers a question under `key`, delivers it with `deliver`, and waits for the answer.
    ///
    /// The registration is removed when this call returns, whatever the outcome.
    ///
    /// ## Errors
    /// Returns [`CoreError::DuplicateQuestion`] if a question is already pending for `key`,
    /// the delivery error, or [`CoreError::Cancelled`] if `ctx` is cancelled while waiting.
    pub async fn ask<F, Fut>(&self, ctx: &Ctx, key: K, deliver: F) -> CoreResult<String>
    where
        F: FnOnce(Ctx, K) -> Fut,
        Fut: Future<Output = CoreResult<()>>,
    {
        let (id, reply) = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if pending.contains_key(&key) {
                return Err(CoreError::DuplicateQuestion(key.to_string()));
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = oneshot::channel();
            pending.insert(key.clone(), Pending { id, reply: tx });
            (id, rx)
        };

        let _registration = Registration {
            conversation: self,
            key: key.clone(),
            id,
        };

        tracing::debug!(key = %key, "Question registered");
        deliver(ctx.clone(), key).await?;

        ctx.run(reply)
            .await?
            .map_err(|_abandoned| CoreError::AskFailed("question was abandoned".to_owned()))
    }

    /// ## Summary
    /// Delivers `value` to the question pending under `key`.
    ///
    /// ## Errors
    /// Returns [`CoreError::NoQuestion`] when nothing is pending for `key`; callers use this to
    /// tell a reply apart from a new command.
    pub fn answer(&self, key: &K, value: String) -> CoreResult<()> {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .ok_or_else(|| CoreError::NoQuestion(key.to_string()))?;

        pending
            .reply
            .send(value)
            .map_err(|_value| CoreError::NoQuestion(key.to_string()))
    }

    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

struct Registration<'a, K: Eq + Hash> {
    conversation: &'a Conversation<K>,
    key: K,
    id: u64,
}

impl<K: Eq + Hash> Drop for Registration<'_, K> {
    fn drop(&mut self) {
        let mut pending = self
            .conversation
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if pending.get(&self.key).is_some_and(|p| p.id == self.id) {
            pending.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    async fn wait_pending(conversation: &Conversation<i64>, key: i64) {
        while !conversation.is_pending(&key) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_ask_and_answer_rendezvous() {
        let conversation = Arc::new(Conversation::<i64>::new());
        let asker = Arc::clone(&conversation);

        let handle = tokio::spawn(async move {
            asker
                .ask(&Ctx::background(), 42, |_ctx, _key| async { Ok(()) })
                .await
        });

        wait_pending(&conversation, 42).await;
        conversation.answer(&42, "1234".to_owned()).unwrap();

        assert_eq!(handle.await.unwrap(), Ok("1234".to_owned()));
        assert!(!conversation.is_pending(&42));
    }

    #[test_log::test]
    fn test_stray_answer_reports_no_question() {
        let conversation = Conversation::<i64>::new();
        assert_eq!(
            conversation.answer(&7, "hello".to_owned()),
            Err(CoreError::NoQuestion("7".to_owned()))
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_duplicate_question_fails() {
        let conversation = Arc::new(Conversation::<i64>::new());
        let asker = Arc::clone(&conversation);
        let root = Ctx::background();
        let (ctx, cancel) = root.child();

        let first = tokio::spawn(async move { asker.ask(&ctx, 1, |_, _| async { Ok(()) }).await });
        wait_pending(&conversation, 1).await;

        let second = conversation
            .ask(&Ctx::background(), 1, |_, _| async { Ok(()) })
            .await;
        assert_eq!(second, Err(CoreError::DuplicateQuestion("1".to_owned())));

        cancel.cancel();
        assert_eq!(first.await.unwrap(), Err(CoreError::Cancelled));
    }

    #[test_log::test(tokio::test)]
    async fn test_cancelled_ask_removes_registration() {
        let conversation = Arc::new(Conversation::<i64>::new());
        let asker = Arc::clone(&conversation);
        let (ctx, cancel) = Ctx::background().child();

        let handle = tokio::spawn(async move { asker.ask(&ctx, 5, |_, _| async { Ok(()) }).await });
        wait_pending(&conversation, 5).await;
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), Err(CoreError::Cancelled));
        assert!(!conversation.is_pending(&5));
        assert!(matches!(
            conversation.answer(&5, "late".to_owned()),
            Err(CoreError::NoQuestion(_))
        ));
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_delivery_unregisters() {
        let conversation = Conversation::<i64>::new();
        let result = conversation
            .ask(&Ctx::background(), 9, |_, _| async {
                Err(CoreError::AskFailed("chat unreachable".to_owned()))
            })
            .await;

        assert!(matches!(result, Err(CoreError::AskFailed(_))));
        assert!(!conversation.is_pending(&9));
    }
}
