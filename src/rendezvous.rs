//! Form Rendezvous: a per-id, single-shot, one-producer/one-consumer channel
//! kept in a guarded map, as the design notes call for directly.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};

use crate::model::FormData;

enum Slot {
    /// `waitForFormData` is parked here; `provideFormData` fulfils it.
    Waiting(oneshot::Sender<FormData>),
    /// `provideFormData` arrived first; buffered until `waitForFormData`
    /// collects it (or a repeat wait returns it again).
    Buffered(FormData),
    /// Already delivered to its waiter. Kept so a late `wait_for` still
    /// returns the same data instead of an empty map.
    Consumed(FormData),
}

#[derive(Clone, Default)]
pub struct RendezvousTable {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl RendezvousTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend until `id`'s form data arrives, or return immediately if it
    /// was already provided (including a value buffered before this call).
    pub async fn wait_for(&self, id: &str) -> FormData {
        let rx = {
            let mut slots = self.slots.lock().await;
            match slots.remove(id) {
                Some(Slot::Buffered(data)) => {
                    slots.insert(id.to_string(), Slot::Consumed(data.clone()));
                    return data;
                }
                Some(Slot::Consumed(data)) => {
                    slots.insert(id.to_string(), Slot::Consumed(data.clone()));
                    return data;
                }
                Some(Slot::Waiting(_)) | None => {
                    let (tx, rx) = oneshot::channel();
                    slots.insert(id.to_string(), Slot::Waiting(tx));
                    rx
                }
            }
        };
        rx.await.unwrap_or_default()
    }

    /// Fulfil `id` with `data`. A second call for an id that has already been
    /// fulfilled is ignored.
    pub async fn provide(&self, id: &str, data: FormData) {
        let mut slots = self.slots.lock().await;
        match slots.remove(id) {
            Some(Slot::Waiting(tx)) => {
                let _ = tx.send(data.clone());
                slots.insert(id.to_string(), Slot::Consumed(data));
            }
            Some(previous @ (Slot::Buffered(_) | Slot::Consumed(_))) => {
                // Already fulfilled once; ignore the second delivery.
                slots.insert(id.to_string(), previous);
            }
            None => {
                slots.insert(id.to_string(), Slot::Buffered(data));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_then_provide_delivers_data() {
        let table = RendezvousTable::new();
        let waiter = {
            let table = table.clone();
            tokio::spawn(async move { table.wait_for("x").await })
        };
        tokio::task::yield_now().await;
        let mut data = FormData::new();
        data.insert("name".into(), serde_json::json!("X"));
        table.provide("x", data.clone()).await;
        assert_eq!(waiter.await.unwrap(), data);
    }

    #[tokio::test]
    async fn provide_before_wait_is_buffered() {
        let table = RendezvousTable::new();
        let mut data = FormData::new();
        data.insert("name".into(), serde_json::json!("Y"));
        table.provide("y", data.clone()).await;
        let received = table.wait_for("y").await;
        assert_eq!(received, data);
    }

    #[tokio::test]
    async fn late_wait_on_a_consumed_id_returns_the_stored_value_again() {
        let table = RendezvousTable::new();
        let mut data = FormData::new();
        data.insert("name".into(), serde_json::json!("late"));
        table.provide("late-id", data.clone()).await;
        let first_wait = table.wait_for("late-id").await;
        let second_wait = table.wait_for("late-id").await;
        assert_eq!(first_wait, data);
        assert_eq!(second_wait, data);
    }

    #[tokio::test]
    async fn second_provide_is_ignored() {
        let table = RendezvousTable::new();
        let mut first = FormData::new();
        first.insert("a".into(), serde_json::json!(1));
        let mut second = FormData::new();
        second.insert("a".into(), serde_json::json!(2));

        table.provide("z", first.clone()).await;
        table.provide("z", second).await;
        let received = table.wait_for("z").await;
        assert_eq!(received, first);
    }
}
