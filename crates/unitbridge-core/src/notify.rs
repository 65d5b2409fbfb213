//! Per-unit notification pass.

use crate::collab::Messenger;
use crate::error::EnumerationError;
use crate::inventory::InventoryCache;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Summary of one check pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub units: usize,
    /// Units whose update notification failed (skipped, pass continued).
    pub failed_units: Vec<String>,
    pub list_refreshed: bool,
}

/// Walks the cached inventory and hands each unit to the messenger.
pub struct NotificationPipeline {
    inventory: Arc<InventoryCache>,
    messenger: Arc<dyn Messenger>,
    running: Mutex<()>,
}

impl NotificationPipeline {
    pub fn new(inventory: Arc<InventoryCache>, messenger: Arc<dyn Messenger>) -> Self {
        Self {
            inventory,
            messenger,
            running: Mutex::new(()),
        }
    }

    /// Notify every unit in name order, then refresh the aggregate list.
    ///
    /// Overlapping calls run one after another. A failing unit is logged
    /// and skipped; only an enumeration failure aborts the pass.
    pub async fn check(&self) -> Result<CheckReport, EnumerationError> {
        let _running = self.running.lock().await;
        let snapshot = self.inventory.get().await?;

        let mut report = CheckReport {
            units: snapshot.len(),
            ..CheckReport::default()
        };

        for entry in snapshot.iter() {
            if let Err(e) = self.messenger.send_unit_update(entry).await {
                tracing::warn!(unit = %entry.name, error = %e, "unit update failed");
                report.failed_units.push(entry.name.clone());
            }
        }

        match self.messenger.refresh_unit_list(&snapshot).await {
            Ok(()) => report.list_refreshed = true,
            Err(e) => tracing::warn!(error = %e, "unit list refresh failed"),
        }

        tracing::info!(
            units = report.units,
            failed = report.failed_units.len(),
            "unit checks finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::collab::{ChannelId, HostUnits};
    use crate::error::MessageError;
    use crate::inventory::{DEFAULT_INVENTORY_TTL, InventoryEntry, Snapshot};
    use futures_util::future::BoxFuture;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Call {
        Update(String),
        List(Vec<String>),
        Text(ChannelId, String),
    }

    /// Messenger that records every call in order.
    #[derive(Default)]
    pub(crate) struct RecordingMessenger {
        pub calls: StdMutex<Vec<Call>>,
        pub fail_units: Vec<String>,
        pub delay: Option<Duration>,
    }

    impl RecordingMessenger {
        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Messenger for RecordingMessenger {
        fn send_unit_update<'a>(
            &'a self,
            entry: &'a InventoryEntry,
        ) -> BoxFuture<'a, Result<(), MessageError>> {
            Box::pin(async move {
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                self.calls.lock().unwrap().push(Call::Update(entry.name.clone()));
                if self.fail_units.contains(&entry.name) {
                    return Err(MessageError::Delivery("rate limited".into()));
                }
                Ok(())
            })
        }

        fn refresh_unit_list<'a>(
            &'a self,
            snapshot: &'a Snapshot,
        ) -> BoxFuture<'a, Result<(), MessageError>> {
            Box::pin(async move {
                let names = snapshot.names().map(str::to_string).collect();
                self.calls.lock().unwrap().push(Call::List(names));
                Ok(())
            })
        }

        fn send_text<'a>(
            &'a self,
            channel: ChannelId,
            text: &'a str,
        ) -> BoxFuture<'a, Result<(), MessageError>> {
            Box::pin(async move {
                self.calls
                    .lock()
                    .unwrap()
                    .push(Call::Text(channel, text.to_string()));
                Ok(())
            })
        }
    }

    pub(crate) struct ListedUnits(pub Vec<&'static str>);

    impl HostUnits for ListedUnits {
        fn enumerate_units(&self) -> Result<Vec<InventoryEntry>, EnumerationError> {
            Ok(self.0.iter().map(|n| InventoryEntry::new(*n, "1.0")).collect())
        }
    }

    struct BrokenUnits;

    impl HostUnits for BrokenUnits {
        fn enumerate_units(&self) -> Result<Vec<InventoryEntry>, EnumerationError> {
            Err(EnumerationError::new("registry unavailable"))
        }
    }

    fn pipeline(
        host: Arc<dyn HostUnits>,
        messenger: Arc<RecordingMessenger>,
    ) -> NotificationPipeline {
        let cache = Arc::new(InventoryCache::new(host, DEFAULT_INVENTORY_TTL));
        NotificationPipeline::new(cache, messenger)
    }

    fn update(name: &str) -> Call {
        Call::Update(name.to_string())
    }

    fn list(names: &[&str]) -> Call {
        Call::List(names.iter().map(|n| n.to_string()).collect())
    }

    #[tokio::test]
    async fn units_are_notified_in_order_before_list_refresh() {
        let messenger = Arc::new(RecordingMessenger::default());
        let pipeline = pipeline(Arc::new(ListedUnits(vec!["B", "A", "C"])), messenger.clone());

        let report = pipeline.check().await.unwrap();

        assert_eq!(
            messenger.calls(),
            vec![update("A"), update("B"), update("C"), list(&["A", "B", "C"])]
        );
        assert_eq!(report.units, 3);
        assert!(report.failed_units.is_empty());
        assert!(report.list_refreshed);
    }

    #[tokio::test]
    async fn failing_unit_is_skipped() {
        let messenger = Arc::new(RecordingMessenger {
            fail_units: vec!["B".to_string()],
            ..Default::default()
        });
        let pipeline = pipeline(Arc::new(ListedUnits(vec!["C", "B", "A"])), messenger.clone());

        let report = pipeline.check().await.unwrap();

        assert_eq!(report.failed_units, vec!["B".to_string()]);
        assert_eq!(
            messenger.calls(),
            vec![update("A"), update("B"), update("C"), list(&["A", "B", "C"])]
        );
    }

    #[tokio::test]
    async fn enumeration_failure_aborts_before_any_message() {
        let messenger = Arc::new(RecordingMessenger::default());
        let pipeline = pipeline(Arc::new(BrokenUnits), messenger.clone());

        assert!(pipeline.check().await.is_err());
        assert!(messenger.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_checks_do_not_interleave() {
        let messenger = Arc::new(RecordingMessenger {
            delay: Some(Duration::from_millis(10)),
            ..Default::default()
        });
        let pipeline = Arc::new(pipeline(Arc::new(ListedUnits(vec!["B", "A"])), messenger.clone()));

        let first = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.check().await }
        });
        let second = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.check().await }
        });
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let pass = vec![update("A"), update("B"), list(&["A", "B"])];
        let expected: Vec<Call> = pass.iter().chain(pass.iter()).cloned().collect();
        assert_eq!(messenger.calls(), expected);
    }
}
