//! Per-request transaction boundary.

use serde::{Deserialize, Serialize};

use structures_graph::{GraphSession, GraphStore};

use crate::error::Result;

/// Whether an operation runs inside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxMode {
    Transactional,
    ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    NoTransaction,
    Open,
    Committed,
    RolledBack,
}

/// One session, and at most one transaction, for the lifetime of a request.
///
/// [`finish`](Self::finish) commits or rolls back by status and always
/// closes the session. A scope dropped without `finish` leaves its
/// transaction uncommitted.
pub struct RequestScope {
    session: Box<dyn GraphSession>,
    state: TxState,
}

impl RequestScope {
    pub async fn open(store: &dyn GraphStore, mode: TxMode) -> Result<Self> {
        let mut session = store.session().await?;
        let state = match mode {
            TxMode::ReadOnly => TxState::NoTransaction,
            TxMode::Transactional => {
                if let Err(e) = session.begin().await {
                    if let Err(close) = session.close().await {
                        tracing::warn!(error = %close, "Failed to close session after begin error");
                    }
                    return Err(e.into());
                }
                tracing::debug!("Transaction opened");
                TxState::Open
            }
        };
        Ok(Self { session, state })
    }

    pub fn session(&mut self) -> &mut dyn GraphSession {
        self.session.as_mut()
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Commit when `status < 400`, roll back otherwise, then close.
    pub async fn finish(mut self, status: u16) -> Result<TxState> {
        let outcome = match self.state {
            TxState::Open if status < 400 => {
                self.session.commit().await.map(|_| TxState::Committed)
            }
            TxState::Open => self.session.rollback().await.map(|_| TxState::RolledBack),
            other => Ok(other),
        };
        let closed = self.session.close().await;

        match &outcome {
            Ok(TxState::Committed) => tracing::debug!(status, "Transaction committed"),
            Ok(TxState::RolledBack) => tracing::info!(status, "Transaction rolled back"),
            Err(e) => tracing::error!(status, error = %e, "Failed to finish transaction"),
            _ => {}
        }

        let state = outcome?;
        closed?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use structures_core::{NodeId, NodeKind, Properties, Relation};
    use structures_graph::{GraphError, MemoryGraph, NewNode, NodeRecord};
    use crate::error::AccessError;

    async fn write_one(graph: &MemoryGraph, status: u16) -> TxState {
        let mut scope = RequestScope::open(graph, TxMode::Transactional).await.unwrap();
        assert_eq!(scope.state(), TxState::Open);
        scope
            .session()
            .create_node(NewNode::new(NodeKind::User, Properties::new()))
            .await
            .unwrap();
        scope.finish(status).await.unwrap()
    }

    #[tokio::test]
    async fn success_commits() {
        let graph = MemoryGraph::new();
        assert_eq!(write_one(&graph, 201).await, TxState::Committed);
        assert_eq!(graph.node_count().await, 1);
    }

    #[tokio::test]
    async fn client_error_rolls_back() {
        let graph = MemoryGraph::new();
        assert_eq!(write_one(&graph, 403).await, TxState::RolledBack);
        assert_eq!(graph.node_count().await, 0);
    }

    /// A store whose sessions fail every call.
    struct Unreachable;

    struct DeadSession;

    fn down() -> GraphError {
        GraphError::Connection("connection refused".into())
    }

    #[async_trait]
    impl GraphStore for Unreachable {
        async fn session(&self) -> std::result::Result<Box<dyn GraphSession>, GraphError> {
            Ok(Box::new(DeadSession))
        }

        async fn bootstrap(&self, _root: &NodeId) -> std::result::Result<(), GraphError> {
            Err(down())
        }
    }

    #[async_trait]
    impl GraphSession for DeadSession {
        async fn begin(&mut self) -> std::result::Result<(), GraphError> {
            Err(down())
        }

        async fn commit(&mut self) -> std::result::Result<(), GraphError> {
            Err(down())
        }

        async fn rollback(&mut self) -> std::result::Result<(), GraphError> {
            Err(down())
        }

        fn in_transaction(&self) -> bool {
            false
        }

        async fn close(&mut self) -> std::result::Result<(), GraphError> {
            Err(down())
        }

        async fn get_node(
            &mut self,
            _id: &NodeId,
        ) -> std::result::Result<Option<NodeRecord>, GraphError> {
            Err(down())
        }

        async fn outgoing(
            &mut self,
            _id: &NodeId,
            _relation: Relation,
        ) -> std::result::Result<Vec<NodeRecord>, GraphError> {
            Err(down())
        }

        async fn incoming(
            &mut self,
            _id: &NodeId,
            _relation: Relation,
        ) -> std::result::Result<Vec<NodeRecord>, GraphError> {
            Err(down())
        }

        async fn create_node(
            &mut self,
            _node: NewNode,
        ) -> std::result::Result<NodeRecord, GraphError> {
            Err(down())
        }

        async fn set_properties(
            &mut self,
            _id: &NodeId,
            _properties: &Properties,
        ) -> std::result::Result<Option<NodeRecord>, GraphError> {
            Err(down())
        }

        async fn create_relation(
            &mut self,
            _from: &NodeId,
            _relation: Relation,
            _to: &NodeId,
        ) -> std::result::Result<(), GraphError> {
            Err(down())
        }

        async fn delete_relation(
            &mut self,
            _from: &NodeId,
            _relation: Relation,
            _to: &NodeId,
        ) -> std::result::Result<u64, GraphError> {
            Err(down())
        }

        async fn replace_relation(
            &mut self,
            _from: &NodeId,
            _relation: Relation,
            _to: &NodeId,
        ) -> std::result::Result<u64, GraphError> {
            Err(down())
        }
    }

    #[tokio::test]
    async fn begin_failure_reports_begin_error_when_close_also_fails() {
        let err = match RequestScope::open(&Unreachable, TxMode::Transactional).await {
            Ok(_) => panic!("scope opened on an unreachable store"),
            Err(e) => e,
        };
        assert!(matches!(err, AccessError::Graph(GraphError::Connection(_))));
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn read_only_scope_has_no_transaction() {
        let graph = MemoryGraph::with_root(&NodeId::from("root")).await;
        let mut scope = RequestScope::open(&graph, TxMode::ReadOnly).await.unwrap();
        assert!(!scope.session().in_transaction());
        assert_eq!(scope.finish(200).await.unwrap(), TxState::NoTransaction);
    }
}
