use super::{LedgerResult, OperationLedger, OperationRecord};
use async_trait::async_trait;
use dashmap::DashMap;

/// Process-local ledger; records do not survive a restart.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    records: DashMap<String, OperationRecord>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl OperationLedger for InMemoryLedger {
    async fn put(&self, instance_id: &str, record: &OperationRecord) -> LedgerResult<()> {
        self.records.insert(instance_id.to_string(), record.clone());
        Ok(())
    }

    async fn get(&self, instance_id: &str) -> LedgerResult<Option<OperationRecord>> {
        Ok(self.records.get(instance_id).map(|r| r.value().clone()))
    }

    async fn delete(&self, instance_id: &str) -> LedgerResult<()> {
        self.records.remove(instance_id);
        Ok(())
    }
}
