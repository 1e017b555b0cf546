//! Pending-request table: correlates request ids with waiting callers.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;

use wsbus_core::ClientError;

pub(crate) type Waiter = oneshot::Sender<Result<Value, ClientError>>;

/// Each entry is removed exactly once, which is what makes every request
/// resolve exactly once.
#[derive(Default)]
pub(crate) struct PendingRequests {
    waiters: HashMap<String, Waiter>,
}

impl PendingRequests {
    pub fn insert(&mut self, id: String, waiter: Waiter) {
        self.waiters.insert(id, waiter);
    }

    /// Complete a request with its response payload. `false` if unmatched.
    pub fn resolve(&mut self, id: &str, data: Value) -> bool {
        self.complete(id, Ok(data))
    }

    /// Fail a request with the server's error payload. `false` if unmatched.
    pub fn reject(&mut self, id: &str, data: Value) -> bool {
        let err = ClientError::RequestFailure {
            id: id.to_string(),
            data,
        };
        self.complete(id, Err(err))
    }

    /// Drop a request whose caller stopped waiting.
    pub fn cancel(&mut self, id: &str) -> bool {
        self.waiters.remove(id).is_some()
    }

    /// Fail every outstanding request with `err`. Returns how many failed.
    pub fn fail_all(&mut self, err: &ClientError) -> usize {
        let n = self.waiters.len();
        for (_, waiter) in self.waiters.drain() {
            let _ = waiter.send(Err(err.clone()));
        }
        n
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    fn complete(&mut self, id: &str, result: Result<Value, ClientError>) -> bool {
        match self.waiters.remove(id) {
            Some(waiter) => {
                // The caller may have given up already; the entry is gone either way.
                let _ = waiter.send(result);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wsbus_core::ErrorKind;

    #[test]
    fn resolve_once() {
        let mut table = PendingRequests::default();
        let (tx, mut rx) = oneshot::channel();
        table.insert("r1".into(), tx);

        assert!(table.resolve("r1", json!("ok")));
        assert!(!table.resolve("r1", json!("again")));
        assert!(!table.reject("r1", json!("late")));
        assert_eq!(rx.try_recv().unwrap().unwrap(), json!("ok"));
    }

    #[test]
    fn reject_carries_server_payload() {
        let mut table = PendingRequests::default();
        let (tx, mut rx) = oneshot::channel();
        table.insert("r1".into(), tx);
        assert!(table.reject("r1", json!({"code": 404})));

        match rx.try_recv().unwrap() {
            Err(ClientError::RequestFailure { id, data }) => {
                assert_eq!(id, "r1");
                assert_eq!(data["code"], 404);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fail_all_drains_table() {
        let mut table = PendingRequests::default();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        table.insert("a".into(), tx1);
        table.insert("b".into(), tx2);

        assert_eq!(table.fail_all(&ClientError::Closed), 2);
        assert_eq!(table.len(), 0);
        assert_eq!(rx1.try_recv().unwrap().unwrap_err().kind(), ErrorKind::Closed);
        assert_eq!(rx2.try_recv().unwrap().unwrap_err().kind(), ErrorKind::Closed);
        assert_eq!(table.fail_all(&ClientError::Closed), 0);
    }

    #[test]
    fn cancelled_request_is_unmatched() {
        let mut table = PendingRequests::default();
        let (tx, _rx) = oneshot::channel();
        table.insert("r".into(), tx);
        assert!(table.cancel("r"));
        assert!(!table.resolve("r", json!(1)));
    }
}
