//! Set arithmetic between the local revision tree and a remote listing.

use super::dto::RevisionDto;
use crate::revision::Revision;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Local revisions by id, collected in pre-order.
pub fn build_local_index(root: &Arc<Revision>) -> HashMap<Uuid, Arc<Revision>> {
    root.preorder()
        .into_iter()
        .map(|revision| (revision.id(), revision))
        .collect()
}

/// What one side has and the other lacks.
#[derive(Debug, Default)]
pub struct SyncPlan {
    /// In remote listing order.
    pub remote_only: Vec<RevisionDto>,
    /// In local pre-order.
    pub local_only: Vec<Arc<Revision>>,
}

impl SyncPlan {
    pub fn compute(local_root: &Arc<Revision>, remote: &[RevisionDto]) -> Self {
        let local = local_root.preorder();
        let local_ids: HashSet<Uuid> = local.iter().map(|r| r.id()).collect();
        let remote_ids: HashSet<Uuid> = remote.iter().map(|dto| dto.id).collect();

        Self {
            remote_only: remote
                .iter()
                .filter(|dto| !local_ids.contains(&dto.id))
                .cloned()
                .collect(),
            local_only: local
                .into_iter()
                .filter(|revision| !remote_ids.contains(&revision.id()))
                .collect(),
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        self.remote_only.is_empty() && self.local_only.is_empty()
    }
}

/// A shallow subtree built from remote summaries, to be grafted under
/// `parent_id`.
#[derive(Debug)]
pub struct RemoteBranch {
    pub parent_id: Option<Uuid>,
    pub root: Arc<Revision>,
}

/// Links remote-only summaries into shallow subtrees. A summary becomes a
/// branch root when its parent is not part of the batch.
pub fn construct_remote_branches(dtos: &[RevisionDto]) -> Vec<RemoteBranch> {
    let nodes: HashMap<Uuid, Arc<Revision>> = dtos
        .iter()
        .map(|dto| {
            (
                dto.id,
                Arc::new(Revision::shallow(dto.id, dto.message.clone(), dto.timestamp)),
            )
        })
        .collect();

    let mut branches = Vec::new();

    for dto in dtos {
        let Some(node) = nodes.get(&dto.id) else {
            continue;
        };

        match dto.parent_id.and_then(|parent_id| nodes.get(&parent_id)) {
            Some(parent) if parent.id() != dto.id => parent.add_child(Arc::clone(node)),
            Some(_) => warn!("Revision {} lists itself as its parent", dto.id),
            None => branches.push(RemoteBranch {
                parent_id: dto.parent_id,
                root: Arc::clone(node),
            }),
        }
    }

    branches
}

/// Roots of the local-only subtrees: revisions whose parent is absent or not
/// local-only itself.
pub fn construct_new_local_trees(revisions: &[Arc<Revision>]) -> Vec<Arc<Revision>> {
    let ids: HashSet<Uuid> = revisions.iter().map(|r| r.id()).collect();

    revisions
        .iter()
        .filter(|revision| match revision.parent() {
            Some(parent) => !ids.contains(&parent.id()),
            None => true,
        })
        .cloned()
        .collect()
}

/// Upload order: each root before its descendants, descendants in tree
/// order, restricted to `include`.
pub fn push_order(roots: &[Arc<Revision>], include: &HashSet<Uuid>) -> Vec<Arc<Revision>> {
    roots
        .iter()
        .flat_map(|root| root.preorder())
        .filter(|revision| include.contains(&revision.id()))
        .collect()
}
