//! Request context for correlating the steps of one authorization attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Correlation data carried through one request.
///
/// The access gate creates one per authorization attempt; chain reads,
/// predicate calls, and capacity charges made inside its span are tagged
/// with the same ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Unique request identifier.
    pub request_id: Uuid,
    /// Correlation ID shared by related requests.
    pub correlation_id: Uuid,
    /// Parent request ID if this is a sub-request.
    pub parent_id: Option<Uuid>,
    /// When the request started.
    pub started_at: DateTime<Utc>,
    /// Component that created the context.
    pub source: String,
    /// Operation being performed.
    pub operation: Option<String>,
    /// Requesting wallet, as a display string.
    pub requester: Option<String>,
    /// Resource being accessed.
    pub resource: Option<String>,
    /// Additional metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RequestContext {
    /// Create a new request context.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            request_id: id,
            correlation_id: id,
            parent_id: None,
            started_at: Utc::now(),
            source: source.into(),
            operation: None,
            requester: None,
            resource: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Create a child context that inherits correlation info.
    #[must_use]
    pub fn child(&self, source: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            correlation_id: self.correlation_id,
            parent_id: Some(self.request_id),
            started_at: Utc::now(),
            source: source.into(),
            operation: None,
            requester: self.requester.clone(),
            resource: self.resource.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Set the correlation ID.
    #[must_use]
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = id;
        self
    }

    /// Set the operation name.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Set the requester.
    #[must_use]
    pub fn with_requester(mut self, requester: impl ToString) -> Self {
        self.requester = Some(requester.to_string());
        self
    }

    /// Set the resource.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Add metadata.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Milliseconds since the request started.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    /// A tracing span tagged with this context.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            correlation_id = %self.correlation_id,
            source = %self.source,
            operation = self.operation.as_deref(),
            requester = self.requester.as_deref(),
            resource = self.resource.as_deref(),
        )
    }

    /// First eight characters of the request id.
    #[must_use]
    pub fn short_id(&self) -> String {
        self.request_id.simple().to_string().chars().take(8).collect()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new("unknown")
    }
}

/// Enters a request span and logs completion when dropped.
pub struct RequestGuard {
    context: RequestContext,
    _span: tracing::span::EnteredSpan,
}

impl RequestGuard {
    /// Enter the context's span.
    #[must_use]
    pub fn new(context: RequestContext) -> Self {
        let span = context.span().entered();
        tracing::debug!("request started");
        Self {
            context,
            _span: span,
        }
    }

    /// The request context.
    #[must_use]
    pub fn context(&self) -> &RequestContext {
        &self.context
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        tracing::debug!(elapsed_ms = self.context.elapsed_ms(), "request completed");
    }
}
