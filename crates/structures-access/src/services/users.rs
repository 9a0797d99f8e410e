use structures_core::types::{NewUser, User};
use structures_core::{AccessKind, NodeId, NodeKind};
use structures_graph::{GraphSession, NodeRecord};

use crate::error::Result;
use crate::mutator::{existing, visible};
use crate::services::{text, ServiceContext};

const KIND: NodeKind = NodeKind::User;

/// Users and their grants. Grant management is not itself access-checked.
#[derive(Debug, Clone)]
pub struct UserService {
    ctx: ServiceContext,
}

impl UserService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Create a user together with the initial grants.
    pub async fn create(&self, session: &mut dyn GraphSession, dto: NewUser) -> Result<User> {
        let node = self.ctx.mutator.create_user(session, dto.properties()).await?;
        self.ctx
            .mutator
            .grant(session, &node.id, AccessKind::Read, &dto.read)
            .await?;
        self.ctx
            .mutator
            .grant(session, &node.id, AccessKind::Write, &dto.write)
            .await?;
        to_resource(session, node).await
    }

    pub async fn get(&self, session: &mut dyn GraphSession, id: &NodeId) -> Result<User> {
        let node = visible(session, KIND, id).await?;
        to_resource(session, node).await
    }

    /// Soft-delete; a deleted user holds no grants.
    pub async fn delete(&self, session: &mut dyn GraphSession, id: &NodeId) -> Result<()> {
        existing(session, KIND, id).await?;
        self.ctx.mutator.soft_delete(session, KIND, id).await
    }

    pub async fn add_access(
        &self,
        session: &mut dyn GraphSession,
        id: &NodeId,
        access: AccessKind,
        targets: &[NodeId],
    ) -> Result<User> {
        visible(session, KIND, id).await?;
        self.ctx.mutator.grant(session, id, access, targets).await?;
        self.get(session, id).await
    }

    pub async fn remove_access(
        &self,
        session: &mut dyn GraphSession,
        id: &NodeId,
        access: AccessKind,
        target: &NodeId,
    ) -> Result<User> {
        visible(session, KIND, id).await?;
        self.ctx.mutator.revoke(session, id, access, target).await?;
        self.get(session, id).await
    }
}

async fn to_resource(session: &mut dyn GraphSession, node: NodeRecord) -> Result<User> {
    let mut read = Vec::new();
    for target in session.outgoing(&node.id, AccessKind::Read.grant_relation()).await? {
        read.push(target.id);
    }
    let mut write = Vec::new();
    for target in session.outgoing(&node.id, AccessKind::Write.grant_relation()).await? {
        write.push(target.id);
    }
    read.sort();
    write.sort();

    Ok(User {
        name: text(&node, "name"),
        read,
        write,
        id: node.id,
    })
}
