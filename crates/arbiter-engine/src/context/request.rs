use std::collections::BTreeMap;

use uuid::Uuid;

use arbiter_core::model::RequestRecord;

/// Caller metadata for one arbitration.
///
/// The correlation id ties the returned decision, its ledger block and its
/// log lines together; a fresh one is generated unless the caller sets it.
#[derive(Debug, Clone)]
pub struct RequestCtx {
    pub correlation_id: Uuid,
    pub request_id: Option<String>,
    pub tenant: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl Default for RequestCtx {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestCtx {
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            request_id: None,
            tenant: None,
            labels: BTreeMap::new(),
        }
    }

    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = id;
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Ledger view of this context.
    pub fn to_record(&self) -> RequestRecord {
        RequestRecord {
            request_id: self.request_id.clone(),
            tenant: self.tenant.clone(),
            labels: self.labels.clone(),
        }
    }
}
