//! Optimistic mutation pipeline
//!
//! Every write to the board goes through [`MutationPipeline`]:
//!
//! 1. plan the mutation against the current board and swap the next board
//!    into the store (synchronous, under the store lock),
//! 2. persist the change through the remote service with retries,
//! 3. on success, report the activity and chain any ruler follow-up;
//!    on failure, put the touched entities back the way they were.
//!
//! An entity touched by a mutation stays gated until that mutation settles.
//! A second mutation touching a gated entity is rejected, never queued.

use crate::activity::{self, ActivitySink, NullActivitySink};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::mutation::{with_columns, with_items, EntityKey, Mutation, MutationPlan};
use crate::reindex;
use crate::remote::{ColumnPatch, ItemPatch, RemoteBoardService, RemoteError};
use crate::retry::RetryPolicy;
use crate::ruler::RulerRule;
use crate::store::BoardStore;
use crate::types::{
    ActivityEvent, BoardSnapshot, Column, ColumnId, Item, ItemId, ItemStatus, MutationId,
    ProjectId,
};
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

/// What happened to a mutation that was accepted by the pipeline
#[derive(Debug)]
pub struct MutationOutcome {
    pub op_id: MutationId,
    /// Canonical op string (e.g., "move item")
    pub op: &'static str,
    pub target: EntityKey,
    pub automated: bool,
    /// False when the mutation turned out to be a no-op
    pub changed: bool,
    /// Retries spent across all remote writes
    pub retries: u32,
    pub duration_ms: u64,
    /// Follow-up mutations issued by the ruler automation
    pub automation: Vec<AutomationOutcome>,
}

/// Result of one automation follow-up
#[derive(Debug)]
pub enum AutomationOutcome {
    Committed(Box<MutationOutcome>),
    /// The follow-up was rejected or rolled back; the primary mutation stands
    Failed { mutation: Mutation, error: SyncError },
}

impl AutomationOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }
}

/// A single call against the remote service
#[derive(Debug, Clone)]
enum RemoteWrite {
    InsertColumn(Column),
    DeleteColumn(ColumnId),
    ColumnPosition {
        id: ColumnId,
        position: usize,
    },
    ColumnRuler {
        id: ColumnId,
        is_ruler: bool,
    },
    BulkColumns(Vec<ColumnPatch>),
    InsertItem(Item),
    DeleteItem(ItemId),
    ItemPlacement {
        id: ItemId,
        column_id: Option<ColumnId>,
        position: usize,
    },
    ItemStatus {
        id: ItemId,
        status: ItemStatus,
    },
    BulkItems(Vec<ItemPatch>),
}

impl RemoteWrite {
    fn name(&self) -> &'static str {
        match self {
            Self::InsertColumn(_) => "insert_column",
            Self::DeleteColumn(_) => "delete_column",
            Self::ColumnPosition { .. } => "update_column_position",
            Self::ColumnRuler { .. } => "update_column_ruler",
            Self::BulkColumns(_) => "bulk_update_columns",
            Self::InsertItem(_) => "insert_item",
            Self::DeleteItem(_) => "delete_item",
            Self::ItemPlacement { .. } => "update_item_placement",
            Self::ItemStatus { .. } => "update_item_status",
            Self::BulkItems(_) => "bulk_update_items",
        }
    }

    /// The write that undoes this one, given the board before the mutation
    fn inverse(&self, before: &BoardSnapshot) -> Option<Self> {
        match self {
            Self::InsertColumn(column) => Some(Self::DeleteColumn(column.id.clone())),
            Self::DeleteColumn(id) => before.find_column(id).cloned().map(Self::InsertColumn),
            Self::ColumnPosition { id, .. } => {
                before.find_column(id).map(|c| Self::ColumnPosition {
                    id: id.clone(),
                    position: c.position,
                })
            }
            Self::ColumnRuler { id, .. } => before.find_column(id).map(|c| Self::ColumnRuler {
                id: id.clone(),
                is_ruler: c.is_ruler,
            }),
            Self::BulkColumns(patches) => Some(Self::BulkColumns(
                patches
                    .iter()
                    .filter_map(|p| before.find_column(&p.id).map(|c| p.revert(c)))
                    .collect(),
            )),
            Self::InsertItem(item) => Some(Self::DeleteItem(item.id.clone())),
            Self::DeleteItem(id) => before.find_item(id).cloned().map(Self::InsertItem),
            Self::ItemPlacement { id, column_id, .. } => {
                before.find_item(id).map(|i| Self::ItemPlacement {
                    id: id.clone(),
                    column_id: column_id.as_ref().map(|_| i.column_id.clone()),
                    position: i.position,
                })
            }
            Self::ItemStatus { id, .. } => before.find_item(id).map(|i| Self::ItemStatus {
                id: id.clone(),
                status: i.status,
            }),
            Self::BulkItems(patches) => Some(Self::BulkItems(
                patches
                    .iter()
                    .filter_map(|p| before.find_item(&p.id).map(|i| p.revert(i)))
                    .collect(),
            )),
        }
    }
}

/// A container whose ordering an unsettled mutation may still change
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Container {
    Project(ProjectId),
    Column(ColumnId),
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Project(id) => write!(f, "project {id}"),
            Self::Column(id) => write!(f, "column {id} ordering"),
        }
    }
}

/// Entities and containers held by unsettled mutations
#[derive(Debug, Default)]
struct Gate {
    entities: HashSet<EntityKey>,
    containers: HashSet<Container>,
}

impl Gate {
    /// The first held entity or container, if any
    fn busy(&self, keys: &[EntityKey], containers: &[Container]) -> Option<String> {
        keys.iter()
            .find(|k| self.entities.contains(*k))
            .map(ToString::to_string)
            .or_else(|| {
                containers
                    .iter()
                    .find(|c| self.containers.contains(*c))
                    .map(ToString::to_string)
            })
    }
}

/// Releases gated entities and containers when dropped
struct GateGuard<'a> {
    gate: &'a Mutex<Gate>,
    keys: Vec<EntityKey>,
    containers: Vec<Container>,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        for key in &self.keys {
            gate.entities.remove(key);
        }
        for container in &self.containers {
            gate.containers.remove(container);
        }
    }
}

enum BeginError {
    Rejected(SyncError),
    NoOp,
}

/// Applies mutations optimistically and reconciles them with the remote service
pub struct MutationPipeline {
    store: Arc<BoardStore>,
    remote: Arc<dyn RemoteBoardService>,
    retry: RetryPolicy,
    activity: Arc<dyn ActivitySink>,
    activity_enabled: bool,
    ruler: RulerRule,
    in_flight: Mutex<Gate>,
}

impl MutationPipeline {
    /// Create a pipeline with default retry and automation settings
    pub fn new(store: Arc<BoardStore>, remote: Arc<dyn RemoteBoardService>) -> Self {
        Self::with_config(store, remote, &SyncConfig::default())
    }

    /// Create a pipeline from loaded configuration
    pub fn with_config(
        store: Arc<BoardStore>,
        remote: Arc<dyn RemoteBoardService>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            store,
            remote,
            retry: RetryPolicy::new(config.retry.clone()),
            activity: Arc::new(NullActivitySink),
            activity_enabled: config.activity.enabled,
            ruler: RulerRule::new(config.ruler.clone()),
            in_flight: Mutex::new(Gate::default()),
        }
    }

    /// Report committed mutations to `sink`
    pub fn with_activity_sink(mut self, sink: Arc<dyn ActivitySink>) -> Self {
        self.activity = sink;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<BoardStore> {
        &self.store
    }

    /// Whether a mutation touching `key` has not settled yet
    pub fn is_updating(&self, key: &EntityKey) -> bool {
        self.gate().entities.contains(key)
    }

    /// Entities currently gated by unsettled mutations
    pub fn updating(&self) -> BTreeSet<EntityKey> {
        self.gate().entities.iter().cloned().collect()
    }

    /// Plan `mutation` and apply it to the store immediately.
    ///
    /// Rejections (validation, missing entities, gated entities, invariant
    /// violations) are returned before anything is applied. Besides the
    /// entities it touches, an unsettled mutation holds the columns and
    /// projects whose ordering it changes, so no other plan can renumber
    /// siblings that a rollback would put back. The returned
    /// [`PendingMutation`] must be settled to persist the change; dropping it
    /// unsettled rolls the change back.
    pub fn begin(&self, mutation: impl Into<Mutation>) -> Result<PendingMutation<'_>> {
        let mutation = mutation.into();
        let id = MutationId::new();
        let started = Instant::now();
        let target = mutation.target();

        let mut planned: Option<(MutationPlan, Vec<EntityKey>, Vec<Container>)> = None;
        let applied = self.store.try_update(|current| {
            let plan = mutation.plan(current).map_err(BeginError::Rejected)?;

            let mut gate = self.gate();
            let mut keys: Vec<EntityKey> = plan.touched.iter().cloned().collect();
            if !plan.touched.contains(&target) {
                keys.push(target.clone());
            }
            let (projects, columns) = plan.containers(current);
            let containers: Vec<Container> = projects
                .into_iter()
                .map(Container::Project)
                .chain(columns.into_iter().map(Container::Column))
                .collect();
            if let Some(entity) = gate.busy(&keys, &containers) {
                return Err(BeginError::Rejected(SyncError::EntityBusy { entity }));
            }
            if plan.is_noop() {
                return Err(BeginError::NoOp);
            }

            gate.entities.extend(keys.iter().cloned());
            gate.containers.extend(containers.iter().cloned());
            let next = plan.next.clone();
            planned = Some((plan, keys, containers));
            Ok(next)
        });

        let op = mutation.op_string();
        let (plan, snapshot, guard) = match applied {
            Ok(snapshot) => {
                let Some((plan, keys, containers)) = planned else {
                    return Err(SyncError::invariant(
                        "store applied a plan that was never recorded",
                    ));
                };
                debug!(mutation = %id, op, touched = plan.touched.len(), "applied optimistically");
                let guard = GateGuard {
                    gate: &self.in_flight,
                    keys,
                    containers,
                };
                (Some(plan), Some(snapshot), Some(guard))
            }
            Err(BeginError::NoOp) => {
                debug!(op, target = %target, "no-op mutation");
                (None, None, None)
            }
            Err(BeginError::Rejected(error)) => {
                debug!(op, target = %target, %error, "mutation rejected");
                return Err(error);
            }
        };

        Ok(PendingMutation {
            pipeline: self,
            id,
            mutation,
            started,
            plan,
            snapshot,
            guard,
        })
    }

    /// Apply a mutation end to end: optimistic apply, remote write, rollback
    /// on failure, then any ruler follow-up.
    #[tracing::instrument(skip_all)]
    pub async fn apply(&self, mutation: impl Into<Mutation>) -> Result<MutationOutcome> {
        self.begin(mutation)?.settle().await
    }

    fn gate(&self) -> std::sync::MutexGuard<'_, Gate> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue every remote write the plan needs, in order. On failure the
    /// writes that already landed are compensated (best effort).
    async fn persist(&self, plan: &MutationPlan, before: &BoardSnapshot) -> Result<u32> {
        let writes = self.remote_writes(plan);
        let mut retries = 0;

        for (index, write) in writes.iter().enumerate() {
            match self.execute(write).await {
                Ok(used) => retries += used,
                Err(error) => {
                    self.compensate(&writes[..index], before).await;
                    return Err(error.into());
                }
            }
        }
        Ok(retries)
    }

    fn remote_writes(&self, plan: &MutationPlan) -> Vec<RemoteWrite> {
        let mut writes: Vec<RemoteWrite> = plan
            .inserted_columns
            .iter()
            .cloned()
            .map(RemoteWrite::InsertColumn)
            .collect();
        writes.extend(plan.inserted_items.iter().cloned().map(RemoteWrite::InsertItem));

        if self.remote.supports_bulk() {
            if !plan.column_patches.is_empty() {
                writes.push(RemoteWrite::BulkColumns(plan.column_patches.clone()));
            }
            if !plan.item_patches.is_empty() {
                writes.push(RemoteWrite::BulkItems(plan.item_patches.clone()));
            }
        } else {
            for patch in &plan.column_patches {
                if let Some(is_ruler) = patch.is_ruler {
                    writes.push(RemoteWrite::ColumnRuler {
                        id: patch.id.clone(),
                        is_ruler,
                    });
                }
                if let Some(position) = patch.position {
                    writes.push(RemoteWrite::ColumnPosition {
                        id: patch.id.clone(),
                        position,
                    });
                }
            }
            for patch in &plan.item_patches {
                if patch.is_placement() {
                    let position = patch
                        .position
                        .or_else(|| plan.next.find_item(&patch.id).map(|i| i.position))
                        .unwrap_or_default();
                    writes.push(RemoteWrite::ItemPlacement {
                        id: patch.id.clone(),
                        column_id: patch.column_id.clone(),
                        position,
                    });
                }
                if let Some(status) = patch.status {
                    writes.push(RemoteWrite::ItemStatus {
                        id: patch.id.clone(),
                        status,
                    });
                }
            }
        }

        writes.extend(plan.deleted_items.iter().cloned().map(RemoteWrite::DeleteItem));
        writes.extend(plan.deleted_columns.iter().cloned().map(RemoteWrite::DeleteColumn));
        writes
    }

    async fn execute(&self, write: &RemoteWrite) -> std::result::Result<u32, RemoteError> {
        let remote = &self.remote;
        let retried = self
            .retry
            .retry(write.name(), || async move {
                match write {
                    RemoteWrite::InsertColumn(column) => remote.insert_column(column).await,
                    RemoteWrite::DeleteColumn(id) => remote.delete_column(id).await,
                    RemoteWrite::ColumnPosition { id, position } => {
                        remote.update_column_position(id, *position).await
                    }
                    RemoteWrite::ColumnRuler { id, is_ruler } => {
                        remote.update_column_ruler(id, *is_ruler).await
                    }
                    RemoteWrite::BulkColumns(patches) => remote.bulk_update_columns(patches).await,
                    RemoteWrite::InsertItem(item) => remote.insert_item(item).await,
                    RemoteWrite::DeleteItem(id) => remote.delete_item(id).await,
                    RemoteWrite::ItemPlacement {
                        id,
                        column_id,
                        position,
                    } => {
                        remote
                            .update_item_placement(id, column_id.as_ref(), *position)
                            .await
                    }
                    RemoteWrite::ItemStatus { id, status } => {
                        remote.update_item_status(id, *status).await
                    }
                    RemoteWrite::BulkItems(patches) => remote.bulk_update_items(patches).await,
                }
            })
            .await?;
        Ok(retried.retries)
    }

    async fn compensate(&self, landed: &[RemoteWrite], before: &BoardSnapshot) {
        for write in landed.iter().rev() {
            let Some(inverse) = write.inverse(before) else {
                continue;
            };
            if let Err(error) = self.execute(&inverse).await {
                warn!(write = inverse.name(), %error, "compensating write failed");
            }
        }
    }

    /// Put every entity the plan touched back to its pre-mutation state.
    ///
    /// When nothing else has changed the store since the plan was applied,
    /// this restores `before` exactly. Otherwise only the touched entities are
    /// restored and their containers are re-normalized.
    fn rollback(&self, plan: &MutationPlan, before: &Arc<BoardSnapshot>) {
        let _ = self.store.try_update(|current| {
            if **current == plan.next {
                return Ok::<_, std::convert::Infallible>((**before).clone());
            }
            Ok(restore_touched(current, before, &plan.touched))
        });
    }

    /// Chain ruler follow-ups after a committed plan
    async fn run_automation(
        &self,
        mut outcome: MutationOutcome,
        plan: &MutationPlan,
    ) -> MutationOutcome {
        let follow_ups = self.ruler.follow_ups(plan, &self.store.snapshot());
        for follow_up in follow_ups {
            let mutation = Mutation::from(follow_up);
            let result = match self.begin(mutation.clone()) {
                Ok(pending) => pending.commit().await.map(|(outcome, _)| outcome),
                Err(error) => Err(error),
            };
            outcome.automation.push(match result {
                Ok(committed) => AutomationOutcome::Committed(Box::new(committed)),
                Err(error) => {
                    warn!(target = %mutation.target(), %error, "ruler automation failed");
                    AutomationOutcome::Failed { mutation, error }
                }
            });
        }
        outcome
    }
}

impl std::fmt::Debug for MutationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationPipeline")
            .field("store", &self.store)
            .field("retry", &self.retry)
            .field("ruler", &self.ruler)
            .field("in_flight", &self.updating())
            .finish()
    }
}

/// Restore `touched` entities from `before` on top of `current`, then
/// re-normalize positions in every container they belong to.
fn restore_touched(
    current: &BoardSnapshot,
    before: &BoardSnapshot,
    touched: &BTreeSet<EntityKey>,
) -> BoardSnapshot {
    let mut board = current.clone();
    let mut projects: BTreeSet<ProjectId> = BTreeSet::new();
    let mut columns: BTreeSet<ColumnId> = BTreeSet::new();

    for key in touched {
        match key {
            EntityKey::Column(id) => {
                let original = before.find_column(id).cloned();
                if let Some(column) = board.find_column(id).or(original.as_ref()) {
                    projects.insert(column.project_id.clone());
                }
                board.columns.retain(|c| &c.id != id);
                board.columns.extend(original);
            }
            EntityKey::Item(id) => {
                let original = before.find_item(id).cloned();
                if let Some(item) = board.find_item(id) {
                    columns.insert(item.column_id.clone());
                }
                if let Some(item) = &original {
                    columns.insert(item.column_id.clone());
                }
                board.items.retain(|i| &i.id != id);
                board.items.extend(original);
            }
        }
    }

    for project in &projects {
        let normalized = reindex::reindex(board.project_columns(project));
        board = with_columns(&board, normalized);
    }
    for column in &columns {
        let normalized = reindex::reindex(board.column_items(column));
        board = with_items(&board, normalized);
    }
    board
}

/// A mutation applied to the store whose remote write has not happened yet
pub struct PendingMutation<'a> {
    pipeline: &'a MutationPipeline,
    id: MutationId,
    mutation: Mutation,
    started: Instant,
    plan: Option<MutationPlan>,
    snapshot: Option<Arc<BoardSnapshot>>,
    guard: Option<GateGuard<'a>>,
}

impl PendingMutation<'_> {
    pub fn id(&self) -> &MutationId {
        &self.id
    }

    pub fn mutation(&self) -> &Mutation {
        &self.mutation
    }

    /// The plan that was applied, `None` for a no-op
    pub fn plan(&self) -> Option<&MutationPlan> {
        self.plan.as_ref()
    }

    /// Whether applying the mutation changed nothing
    pub fn is_noop(&self) -> bool {
        self.plan.is_none()
    }

    /// Persist the change, rolling back on failure, then run the ruler
    /// automation for a committed status change.
    pub async fn settle(self) -> Result<MutationOutcome> {
        let pipeline = self.pipeline;
        let (outcome, plan) = self.commit().await?;
        match plan {
            Some(plan) if pipeline.ruler.is_enabled() => {
                Ok(pipeline.run_automation(outcome, &plan).await)
            }
            _ => Ok(outcome),
        }
    }

    /// Persist the change without running automation
    async fn commit(mut self) -> Result<(MutationOutcome, Option<MutationPlan>)> {
        let result = match (&self.plan, &self.snapshot) {
            (Some(plan), Some(before)) => Some(self.pipeline.persist(plan, before).await),
            _ => None,
        };

        let plan = self.plan.take();
        let snapshot = self.snapshot.take();
        let guard = self.guard.take();

        let Some(result) = result else {
            return Ok((self.outcome(false, 0), None));
        };
        let (Some(plan), Some(before)) = (plan, snapshot) else {
            return Err(SyncError::invariant("pending mutation lost its plan"));
        };

        match result {
            Ok(retries) => {
                drop(guard);
                let outcome = self.outcome(true, retries);
                info!(
                    mutation = %outcome.op_id,
                    op = outcome.op,
                    target = %outcome.target,
                    automated = outcome.automated,
                    retries,
                    duration_ms = outcome.duration_ms,
                    "mutation committed"
                );
                self.pipeline.report(&self.mutation, &plan);
                Ok((outcome, Some(plan)))
            }
            Err(error) => {
                self.pipeline.rollback(&plan, &before);
                drop(guard);
                warn!(
                    mutation = %self.id,
                    op = self.mutation.op_string(),
                    target = %self.mutation.target(),
                    %error,
                    "remote write failed, rolled back"
                );
                Err(error)
            }
        }
    }

    fn outcome(&self, changed: bool, retries: u32) -> MutationOutcome {
        MutationOutcome {
            op_id: self.id.clone(),
            op: self.mutation.op_string(),
            target: self.mutation.target(),
            automated: self.mutation.automated(),
            changed,
            retries,
            duration_ms: self.started.elapsed().as_millis() as u64,
            automation: Vec::new(),
        }
    }
}

impl Drop for PendingMutation<'_> {
    fn drop(&mut self) {
        if let (Some(plan), Some(before)) = (&self.plan, &self.snapshot) {
            warn!(
                mutation = %self.id,
                op = self.mutation.op_string(),
                "pending mutation dropped before settling, rolling back"
            );
            self.pipeline.rollback(plan, before);
        }
    }
}

impl std::fmt::Debug for PendingMutation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingMutation")
            .field("id", &self.id)
            .field("mutation", &self.mutation)
            .field("noop", &self.is_noop())
            .finish()
    }
}

impl MutationPipeline {
    fn report(&self, mutation: &Mutation, plan: &MutationPlan) {
        if !self.activity_enabled {
            return;
        }
        let target = match &plan.target {
            EntityKey::Column(id) => id.to_string(),
            EntityKey::Item(id) => id.to_string(),
        };
        let payload = serde_json::json!({
            "op": mutation.op_string(),
            "input": serde_json::to_value(mutation).unwrap_or_default(),
            "column_patches": serde_json::to_value(&plan.column_patches).unwrap_or_default(),
            "item_patches": serde_json::to_value(&plan.item_patches).unwrap_or_default(),
        });
        activity::emit(
            self.activity.as_ref(),
            ActivityEvent::new(plan.kind, target, payload, mutation.automated()),
        );
    }
}
