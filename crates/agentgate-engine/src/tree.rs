//! Tree coordinator: tracks the work-order tree rooted at a work
//! order with no `parent_id`, derives tree-level status from node statuses,
//! and decides when a parent's children have converged enough to integrate.
//!
//! Updates for a single root are read-modify-write against the persisted
//! tree file and must be serialized; a per-root mutex guards that.

use agentgate_core::{Error, Id, IntegrationStatus, Result, Tree, WorkOrder, WorkOrderStatus};
use agentgate_store::ArtifactStore;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Owns the in-memory per-root locks guarding tree read-modify-write cycles.
/// The trees themselves live on disk via `ArtifactStore`; this type adds
/// only the serialization and the status-propagation rules.
pub struct TreeCoordinator {
    store: ArtifactStore,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TreeCoordinator {
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, root_id: &Id) -> Arc<Mutex<()>> {
        self.locks
            .entry(root_id.as_ref().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Create a new tree for a root work order. `work_order.parent_id` must
    /// be `None`.
    pub async fn create_root(&self, work_order: &WorkOrder) -> Result<Tree> {
        if work_order.parent_id.is_some() {
            return Err(Error::Validation(
                "create_root called with a non-root work order".to_string(),
            ));
        }
        let lock = self.lock_for(&work_order.root_id);
        let _guard = lock.lock().await;

        let tree = Tree::new_root(work_order.id.clone());
        self.store.write_tree(&tree).await?;
        info!(root_id = %work_order.id, "tree created");
        Ok(tree)
    }

    /// Append a child node under `parent_id`, linking it into the parent's
    /// `child_ids`.
    pub async fn add_child(&self, child: &WorkOrder) -> Result<Tree> {
        let parent_id = child
            .parent_id
            .clone()
            .ok_or_else(|| Error::Validation("add_child called with a root work order".to_string()))?;

        let lock = self.lock_for(&child.root_id);
        let _guard = lock.lock().await;

        let mut tree = self
            .store
            .try_read_tree(child.root_id.as_ref())
            .await?
            .ok_or_else(|| Error::NotFound(format!("tree {}", child.root_id)))?;

        if !tree.nodes.contains_key(&parent_id) {
            return Err(Error::NotFound(format!("tree node {parent_id}")));
        }

        let node = agentgate_core::TreeNode {
            work_order_id: child.id.clone(),
            parent_id: Some(parent_id.clone()),
            child_ids: Vec::new(),
            status: child.status,
            depth: child.depth,
            sibling_index: child.sibling_index,
            created_at: child.created_at,
            completed_at: None,
            integration_status: None,
            integration_work_order_id: None,
        };
        tree.nodes.insert(child.id.clone(), node);
        if let Some(parent) = tree.nodes.get_mut(&parent_id) {
            parent.child_ids.push(child.id.clone());
        }

        self.store.write_tree(&tree).await?;
        info!(root_id = %child.root_id, parent_id = %parent_id, child_id = %child.id, "tree node added");
        Ok(tree)
    }

    /// Record a status change for `work_order_id` within the tree rooted at
    /// `root_id`, recomputing the tree-level status. Returns the updated
    /// tree, or `Ok(None)` if no tree exists yet for that root (a status
    /// change arriving before the tree was created is silently dropped;
    /// callers persist work-order status independently of the tree).
    pub async fn update_status(
        &self,
        root_id: &Id,
        work_order_id: &Id,
        status: WorkOrderStatus,
        completed_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Option<Tree>> {
        let lock = self.lock_for(root_id);
        let _guard = lock.lock().await;

        let Some(mut tree) = self.store.try_read_tree(root_id.as_ref()).await? else {
            return Ok(None);
        };
        let Some(node) = tree.nodes.get_mut(work_order_id) else {
            return Ok(None);
        };
        node.status = status;
        if status.is_terminal() {
            node.completed_at = completed_at.or(Some(chrono::Utc::now()));
        }
        let parent_id = node.parent_id.clone();

        self.store.write_tree(&tree).await?;

        if let Some(parent_id) = parent_id {
            if tree.are_all_children_complete(&parent_id) {
                self.try_trigger_integration(&mut tree, &parent_id).await?;
            }
        }

        info!(root_id = %root_id, work_order_id = %work_order_id, status = ?status, tree_status = ?tree.status(), "tree node status updated");
        Ok(Some(tree))
    }

    /// A no-op unless every child of `parent_id` succeeded. When they
    /// all did, marks the parent's integration as pending and persists the
    /// tree; the caller is responsible for actually launching the
    /// integration work order and later calling `record_integration_result`.
    async fn try_trigger_integration(&self, tree: &mut Tree, parent_id: &Id) -> Result<()> {
        if !tree.all_children_succeeded(parent_id) {
            return Ok(());
        }
        let Some(parent) = tree.nodes.get_mut(parent_id) else {
            return Ok(());
        };
        if parent.integration_status.is_some() {
            return Ok(());
        }
        parent.integration_status = Some(IntegrationStatus::Pending);
        parent.status = WorkOrderStatus::Integrating;
        self.store.write_tree(tree).await?;
        info!(parent_id = %parent_id, "integration triggered: all children succeeded");
        Ok(())
    }

    /// Record the outcome of an integration work order once it runs, and
    /// the parent work order id assigned to perform it.
    pub async fn record_integration(
        &self,
        root_id: &Id,
        parent_id: &Id,
        integration_work_order_id: Id,
        integration_status: IntegrationStatus,
    ) -> Result<Option<Tree>> {
        let lock = self.lock_for(root_id);
        let _guard = lock.lock().await;

        let Some(mut tree) = self.store.try_read_tree(root_id.as_ref()).await? else {
            return Ok(None);
        };
        let Some(node) = tree.nodes.get_mut(parent_id) else {
            return Ok(None);
        };
        node.integration_work_order_id = Some(integration_work_order_id);
        node.integration_status = Some(integration_status);
        if integration_status == IntegrationStatus::Succeeded {
            node.status = WorkOrderStatus::Succeeded;
            node.completed_at = Some(chrono::Utc::now());
        } else if integration_status == IntegrationStatus::Failed {
            node.status = WorkOrderStatus::Failed;
            node.completed_at = Some(chrono::Utc::now());
        }

        self.store.write_tree(&tree).await?;
        Ok(Some(tree))
    }

    pub async fn get(&self, root_id: &Id) -> Result<Option<Tree>> {
        self.store.try_read_tree(root_id.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgate_core::{GatePlan, Id as CoreId, WorkspaceSource};
    use agentgate_store::Layout;

    fn coordinator() -> (tempfile::TempDir, TreeCoordinator) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(Layout::new(dir.path()));
        (dir, TreeCoordinator::new(store))
    }

    fn root_work_order() -> WorkOrder {
        WorkOrder::new_root(
            "root task",
            WorkspaceSource::Local { path: "/tmp/x".to_string() },
            3,
            600,
            GatePlan::default(),
        )
    }

    #[tokio::test]
    async fn create_root_persists_a_single_node_tree() {
        let (_dir, coord) = coordinator();
        let root = root_work_order();
        let tree = coord.create_root(&root).await.unwrap();
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.status(), agentgate_core::TreeStatus::Active);
    }

    #[tokio::test]
    async fn adding_children_links_parent_and_child() {
        let (_dir, coord) = coordinator();
        let root = root_work_order();
        coord.create_root(&root).await.unwrap();

        let child = WorkOrder::new_child(
            &root,
            0,
            "child task",
            WorkspaceSource::Local { path: "/tmp/y".to_string() },
            3,
            600,
            GatePlan::default(),
        );
        let tree = coord.add_child(&child).await.unwrap();
        assert_eq!(tree.node_count(), 2);
        assert_eq!(tree.nodes[&root.id].child_ids, vec![child.id.clone()]);
    }

    #[tokio::test]
    async fn all_children_succeeding_triggers_integration() {
        let (_dir, coord) = coordinator();
        let root = root_work_order();
        coord.create_root(&root).await.unwrap();

        let child = WorkOrder::new_child(
            &root,
            0,
            "child task",
            WorkspaceSource::Local { path: "/tmp/y".to_string() },
            3,
            600,
            GatePlan::default(),
        );
        coord.add_child(&child).await.unwrap();

        let tree = coord
            .update_status(&root.id, &child.id, WorkOrderStatus::Succeeded, None)
            .await
            .unwrap()
            .unwrap();
        let parent = &tree.nodes[&root.id];
        assert_eq!(parent.integration_status, Some(IntegrationStatus::Pending));
        assert_eq!(parent.status, WorkOrderStatus::Integrating);
    }

    #[tokio::test]
    async fn one_child_failing_marks_tree_failed_without_integrating() {
        let (_dir, coord) = coordinator();
        let root = root_work_order();
        coord.create_root(&root).await.unwrap();

        let child_a = WorkOrder::new_child(
            &root, 0, "a",
            WorkspaceSource::Local { path: "/tmp/a".to_string() },
            3, 600, GatePlan::default(),
        );
        let child_b = WorkOrder::new_child(
            &root, 1, "b",
            WorkspaceSource::Local { path: "/tmp/b".to_string() },
            3, 600, GatePlan::default(),
        );
        coord.add_child(&child_a).await.unwrap();
        coord.add_child(&child_b).await.unwrap();

        coord
            .update_status(&root.id, &child_a.id, WorkOrderStatus::Succeeded, None)
            .await
            .unwrap();
        let tree = coord
            .update_status(&root.id, &child_b.id, WorkOrderStatus::Failed, None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(tree.status(), agentgate_core::TreeStatus::Failed);
        assert_eq!(tree.nodes[&root.id].integration_status, None);
    }

    #[tokio::test]
    async fn update_status_on_unknown_root_returns_none() {
        let (_dir, coord) = coordinator();
        let result = coord
            .update_status(&CoreId::new(), &CoreId::new(), WorkOrderStatus::Running, None)
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
