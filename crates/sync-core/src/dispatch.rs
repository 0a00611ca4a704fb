//! Event dispatch.
//!
//! A [`Dispatcher`] owns the table → handler bindings. For each event it
//! runs every handler bound to the event's table, in binding order, each on
//! its own freshly bound directory connection which is always unbound
//! afterwards, whether the handler succeeded or not.

use crate::directory::{DirectoryConnector, DirectoryCredentials};
use crate::error::{SyncError, SyncResult};
use crate::event::{ChangeEvent, RawChangeEvent};
use crate::handlers::SyncHandler;
use crate::source::RelationalSource;
use std::sync::Arc;
use tracing::{debug, warn};

/// A handler attached to one source table.
#[derive(Clone)]
pub struct Binding {
    pub table: String,
    pub handler: Arc<dyn SyncHandler>,
}

impl Binding {
    pub fn new(table: impl Into<String>, handler: Arc<dyn SyncHandler>) -> Self {
        Self {
            table: table.into(),
            handler,
        }
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("table", &self.table)
            .field("handler", &self.handler.name())
            .finish()
    }
}

pub struct Dispatcher {
    connector: Arc<dyn DirectoryConnector>,
    credentials: DirectoryCredentials,
    bindings: Vec<Binding>,
}

impl Dispatcher {
    pub fn new(
        connector: Arc<dyn DirectoryConnector>,
        credentials: DirectoryCredentials,
        bindings: Vec<Binding>,
    ) -> Self {
        Self {
            connector,
            credentials,
            bindings,
        }
    }

    /// Handlers bound to `table`, in binding order.
    pub fn handlers_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a Binding> + 'a {
        self.bindings.iter().filter(move |b| b.table == table)
    }

    /// Run every handler bound to the event's table.
    ///
    /// Stops at the first failing handler. Returns how many handlers ran.
    pub async fn dispatch(
        &self,
        event: &ChangeEvent,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<usize> {
        let mut handled = 0;
        for binding in self.handlers_for(event.source_table()) {
            debug!(
                "{} event on {} -> {} handler",
                event.kind(),
                event.source_table(),
                binding.handler.name()
            );
            handle_event(
                binding.handler.as_ref(),
                event,
                self.connector.as_ref(),
                &self.credentials,
                source,
            )
            .await?;
            handled += 1;
        }

        if handled == 0 {
            debug!("no handler bound to table {}", event.source_table());
        }
        Ok(handled)
    }

    /// Validate a wire-format event, then [`dispatch`](Self::dispatch) it.
    pub async fn dispatch_raw(
        &self,
        raw: RawChangeEvent,
        source: &mut dyn RelationalSource,
    ) -> SyncResult<usize> {
        let event = ChangeEvent::try_from(raw)?;
        self.dispatch(&event, source).await
    }
}

/// Handle one event with one handler on a connection scoped to this call.
///
/// The connection is unbound on every exit path. An unbind failure is
/// logged and never replaces the handler's own result.
pub async fn handle_event(
    handler: &dyn SyncHandler,
    event: &ChangeEvent,
    connector: &dyn DirectoryConnector,
    credentials: &DirectoryCredentials,
    source: &mut dyn RelationalSource,
) -> SyncResult<()> {
    let mut conn = connector
        .bind(credentials)
        .await
        .map_err(|e| SyncError::Bind {
            url: credentials.url.clone(),
            bind_dn: credentials.bind_dn.clone(),
            source: e.into(),
        })?;

    let result = handler.handle(event, conn.as_mut(), source).await;

    if let Err(e) = conn.unbind().await {
        warn!("failed to unbind from {}: {e:#}", credentials.url);
    }
    result
}
