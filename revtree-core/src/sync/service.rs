//! Background sync workers.
//!
//! Every started operation runs on its own thread. At most one operation of a
//! kind runs at a time; completion is reported as a [`SyncEvent`] on the
//! channel returned by [`SyncService::new`].

use super::dto::{ProjectUpdate, RevisionDto};
use super::reconcile::{construct_new_local_trees, construct_remote_branches, push_order, SyncPlan};
use super::transport::{SyncTransport, TransportError};
use crate::revision::Revision;
use crate::version_control::VersionControl;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncKind {
    Pull,
    Push,
    Clone,
    Delete,
}

impl SyncKind {
    pub fn as_str(&self) -> &str {
        match self {
            SyncKind::Pull => "pull",
            SyncKind::Push => "push",
            SyncKind::Clone => "clone",
            SyncKind::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullMode {
    /// Splice shallow nodes only.
    FetchOnly,
    /// Splice, then fetch every missing payload.
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    FetchDone,
    SyncDone { nothing_to_sync: bool },
    PushDone { pushed: usize },
    CloneDone,
    ProjectMissing,
    DeleteDone,
    Cancelled,
    Failed(Vec<String>),
}

impl From<TransportError> for SyncOutcome {
    fn from(e: TransportError) -> Self {
        SyncOutcome::Failed(e.errors)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub kind: SyncKind,
    pub project_id: Uuid,
    pub outcome: SyncOutcome,
}

/// Which project a sync operation works on.
#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub vcs: Arc<VersionControl>,
    pub project_id: Uuid,
    pub project_title: String,
    /// Restricts payload transfer to these revisions; empty means all.
    pub only: Vec<Uuid>,
}

impl SyncTarget {
    pub fn new(vcs: Arc<VersionControl>, project_id: Uuid, project_title: impl Into<String>) -> Self {
        Self {
            vcs,
            project_id,
            project_title: project_title.into(),
            only: Vec::new(),
        }
    }

    pub fn with_only(mut self, only: Vec<Uuid>) -> Self {
        self.only = only;
        self
    }

    fn wants(&self, id: Uuid) -> bool {
        self.only.is_empty() || self.only.contains(&id)
    }
}

/// Everything a worker body needs.
#[derive(Clone)]
pub struct SyncContext {
    pub transport: Arc<dyn SyncTransport>,
    pub target: SyncTarget,
}

impl SyncContext {
    pub fn new(transport: Arc<dyn SyncTransport>, target: SyncTarget) -> Self {
        Self { transport, target }
    }

    fn vcs(&self) -> &VersionControl {
        &self.target.vcs
    }

    fn project_id(&self) -> Uuid {
        self.target.project_id
    }
}

/// Fetches the remote listing and grafts remote-only revisions as shallow
/// nodes; in [`PullMode::Full`] it then fills in their payloads.
pub fn run_pull(ctx: &SyncContext, mode: PullMode, cancel: &AtomicBool) -> SyncOutcome {
    let project = match ctx.transport.fetch_project(ctx.project_id()) {
        Ok(Some(project)) => project,
        Ok(None) => {
            ctx.vcs().update_remote_sync_cache(&[]);
            return SyncOutcome::ProjectMissing;
        }
        Err(e) => {
            warn!("Failed to fetch project {}: {}", ctx.project_id(), e);
            ctx.vcs().update_remote_sync_cache(&[]);
            return e.into();
        }
    };

    ctx.vcs().update_remote_sync_cache(&project.revisions);

    let plan = SyncPlan::compute(&ctx.vcs().root(), &project.revisions);
    let remote_ids: HashSet<Uuid> = project.revisions.iter().map(|dto| dto.id).collect();

    if plan.is_up_to_date() && pending_payloads(ctx, &remote_ids).is_empty() {
        debug!("Project {} is up to date", ctx.project_id());
        return match mode {
            PullMode::FetchOnly => SyncOutcome::FetchDone,
            PullMode::Full => SyncOutcome::SyncDone {
                nothing_to_sync: true,
            },
        };
    }

    splice_remote_revisions(ctx, &plan.remote_only);

    if mode == PullMode::FetchOnly {
        return SyncOutcome::FetchDone;
    }

    if let Err(outcome) = backfill_payloads(ctx, &remote_ids, cancel) {
        return outcome;
    }

    info!(
        "Pulled {} revisions into project {}",
        plan.remote_only.len(),
        ctx.project_id()
    );
    SyncOutcome::SyncDone {
        nothing_to_sync: false,
    }
}

/// Uploads local-only revisions root first, then points the remote head at
/// the local heading revision. A missing remote project is created.
pub fn run_push(ctx: &SyncContext, cancel: &AtomicBool) -> SyncOutcome {
    let update = |head: Option<Uuid>| ProjectUpdate {
        title: ctx.target.project_title.clone(),
        head,
    };

    let (remote_revisions, remote_head) = match ctx.transport.fetch_project(ctx.project_id()) {
        Ok(Some(project)) => (project.revisions, project.head),
        Ok(None) => {
            info!("Creating project {} on the remote", ctx.project_id());
            // the head reference is set once all revisions are pushed
            if let Err(e) = ctx.transport.put_project(ctx.project_id(), &update(None)) {
                return e.into();
            }
            (Vec::new(), None)
        }
        Err(e) => {
            ctx.vcs().update_remote_sync_cache(&[]);
            return e.into();
        }
    };

    ctx.vcs().update_remote_sync_cache(&remote_revisions);

    let plan = SyncPlan::compute(&ctx.vcs().root(), &remote_revisions);
    let mut remote_ids: HashSet<Uuid> = remote_revisions.iter().map(|dto| dto.id).collect();

    let include: HashSet<Uuid> = plan
        .local_only
        .iter()
        .filter(|revision| {
            if revision.is_shallow() {
                warn!("Not pushing {}: payload was never fetched", revision.id());
                return false;
            }
            ctx.target.wants(revision.id())
        })
        .map(|revision| revision.id())
        .collect();

    let roots = construct_new_local_trees(&plan.local_only);
    let mut pushed = 0;

    for revision in push_order(&roots, &include) {
        if cancel.load(Ordering::SeqCst) {
            info!("Push of project {} cancelled", ctx.project_id());
            return SyncOutcome::Cancelled;
        }

        if let Err(e) = ctx
            .transport
            .put_revision(ctx.project_id(), &RevisionDto::from_revision(&revision))
        {
            error!("Failed to push revision {}: {}", revision.id(), e);
            return e.into();
        }

        ctx.vcs().update_local_sync_cache(&revision);
        remote_ids.insert(revision.id());
        pushed += 1;
    }

    let heading = ctx.vcs().heading_revision().id();
    let head = if remote_ids.contains(&heading) {
        Some(heading)
    } else {
        remote_head
    };

    if let Err(e) = ctx.transport.put_project(ctx.project_id(), &update(head)) {
        error!("Failed to update project {}: {}", ctx.project_id(), e);
        return e.into();
    }

    info!("Pushed {} revisions of project {}", pushed, ctx.project_id());
    SyncOutcome::PushDone { pushed }
}

/// Replaces a pristine local tree with the remote one and moves the head to
/// the remote head revision. Materializing the project is left to the caller.
pub fn run_clone(ctx: &SyncContext, cancel: &AtomicBool) -> SyncOutcome {
    if !ctx.vcs().root().is_empty() {
        return SyncOutcome::Failed(vec![format!(
            "cannot clone project {} into a non-empty history",
            ctx.project_id()
        )]);
    }

    let project = match ctx.transport.fetch_project(ctx.project_id()) {
        Ok(Some(project)) => project,
        Ok(None) => return SyncOutcome::ProjectMissing,
        Err(e) => return e.into(),
    };

    ctx.vcs().update_remote_sync_cache(&project.revisions);
    splice_remote_revisions(ctx, &project.revisions);

    let remote_ids: HashSet<Uuid> = project.revisions.iter().map(|dto| dto.id).collect();
    if let Err(outcome) = backfill_payloads(ctx, &remote_ids, cancel) {
        return outcome;
    }

    let target = project
        .head
        .and_then(|head| ctx.vcs().find_revision(head))
        .unwrap_or_else(|| ctx.vcs().root());

    if let Err(e) = ctx.vcs().move_head(&target) {
        // a lone remote root with no items is still a valid clone
        debug!("Head stays at {}: {}", ctx.vcs().heading_revision().id(), e);
    }

    info!(
        "Cloned project {} ({} revisions)",
        ctx.project_id(),
        project.revisions.len()
    );
    SyncOutcome::CloneDone
}

pub fn run_delete(ctx: &SyncContext) -> SyncOutcome {
    match ctx.transport.delete_project(ctx.project_id()) {
        Ok(()) => {
            ctx.vcs().update_remote_sync_cache(&[]);
            info!("Deleted project {} from the remote", ctx.project_id());
            SyncOutcome::DeleteDone
        }
        Err(e) => e.into(),
    }
}

fn splice_remote_revisions(ctx: &SyncContext, remote_only: &[RevisionDto]) {
    for branch in construct_remote_branches(remote_only) {
        let id = branch.root.id();
        if ctx.vcs().append_subtree(branch.root, branch.parent_id) {
            debug!("Spliced remote subtree {}", id);
        }
    }
}

// Shallow nodes the remote can fill in, parents first.
fn pending_payloads(ctx: &SyncContext, remote_ids: &HashSet<Uuid>) -> Vec<Arc<Revision>> {
    ctx.vcs()
        .revisions()
        .into_iter()
        .filter(|revision| revision.is_shallow() && remote_ids.contains(&revision.id()))
        .filter(|revision| ctx.target.wants(revision.id()))
        .collect()
}

fn backfill_payloads(
    ctx: &SyncContext,
    remote_ids: &HashSet<Uuid>,
    cancel: &AtomicBool,
) -> Result<(), SyncOutcome> {
    for revision in pending_payloads(ctx, remote_ids) {
        if cancel.load(Ordering::SeqCst) {
            info!("Sync of project {} cancelled", ctx.project_id());
            return Err(SyncOutcome::Cancelled);
        }

        let dto = ctx
            .transport
            .fetch_revision(ctx.project_id(), revision.id())
            .map_err(|e| {
                error!("Failed to fetch revision {}: {}", revision.id(), e);
                SyncOutcome::from(e)
            })?;

        let payload = dto.verified_payload().map_err(|message| {
            error!("Malformed revision {}: {}", revision.id(), message);
            SyncOutcome::Failed(vec![message])
        })?;

        ctx.vcs()
            .update_shallow_revision_data(revision.id(), &payload.items);
    }

    Ok(())
}

struct Worker {
    handle: JoinHandle<()>,
    cancel: Arc<AtomicBool>,
    // set before the completion event is sent
    done: Arc<AtomicBool>,
}

impl Worker {
    fn is_running(&self) -> bool {
        !self.done.load(Ordering::SeqCst) && !self.handle.is_finished()
    }
}

/// Starts sync operations on background threads.
pub struct SyncService {
    transport: Arc<dyn SyncTransport>,
    events: UnboundedSender<SyncEvent>,
    // one worker per kind and project
    workers: Mutex<HashMap<(SyncKind, Uuid), Worker>>,
}

impl SyncService {
    pub fn new(transport: Arc<dyn SyncTransport>) -> (Self, UnboundedReceiver<SyncEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let service = Self {
            transport,
            events,
            workers: Mutex::new(HashMap::new()),
        };
        (service, receiver)
    }

    pub fn fetch(&self, target: SyncTarget) -> bool {
        self.start(SyncKind::Pull, target, |ctx, cancel| {
            run_pull(ctx, PullMode::FetchOnly, cancel)
        })
    }

    pub fn pull(&self, target: SyncTarget) -> bool {
        self.start(SyncKind::Pull, target, |ctx, cancel| {
            run_pull(ctx, PullMode::Full, cancel)
        })
    }

    pub fn push(&self, target: SyncTarget) -> bool {
        self.start(SyncKind::Push, target, run_push)
    }

    pub fn clone_project(&self, target: SyncTarget) -> bool {
        self.start(SyncKind::Clone, target, run_clone)
    }

    pub fn delete_project(&self, target: SyncTarget) -> bool {
        self.start(SyncKind::Delete, target, |ctx, _| run_delete(ctx))
    }

    pub fn is_running(&self, kind: SyncKind, project_id: Uuid) -> bool {
        self.workers
            .lock()
            .get(&(kind, project_id))
            .map(Worker::is_running)
            .unwrap_or(false)
    }

    /// Asks the running `kind` worker of a project to stop at its next
    /// checkpoint.
    pub fn cancel(&self, kind: SyncKind, project_id: Uuid) {
        if let Some(worker) = self.workers.lock().get(&(kind, project_id)) {
            worker.cancel.store(true, Ordering::SeqCst);
        }
    }

    fn start<F>(&self, kind: SyncKind, target: SyncTarget, job: F) -> bool
    where
        F: FnOnce(&SyncContext, &AtomicBool) -> SyncOutcome + Send + 'static,
    {
        let project_id = target.project_id;
        let key = (kind, project_id);
        let mut workers = self.workers.lock();

        if let Some(worker) = workers.get(&key) {
            if worker.is_running() {
                debug!(
                    "Failed to start {} worker for {}, already running",
                    kind, project_id
                );
                return false;
            }
        }

        if let Some(finished) = workers.remove(&key) {
            if finished.handle.join().is_err() {
                warn!("Previous {} worker panicked", kind);
            }
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let finished = Arc::clone(&done);
        let ctx = SyncContext::new(Arc::clone(&self.transport), target);
        let events = self.events.clone();

        let spawned = thread::Builder::new()
            .name(format!("revtree-{}", kind))
            .spawn(move || {
                let outcome = job(&ctx, &flag);
                finished.store(true, Ordering::SeqCst);
                let event = SyncEvent {
                    kind,
                    project_id,
                    outcome,
                };
                if events.send(event).is_err() {
                    debug!("Nobody is listening for {} results", kind);
                }
            });

        match spawned {
            Ok(handle) => {
                workers.insert(
                    key,
                    Worker {
                        handle,
                        cancel,
                        done,
                    },
                );
                true
            }
            Err(e) => {
                error!("Failed to spawn {} worker: {}", kind, e);
                false
            }
        }
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        let workers: Vec<Worker> = self.workers.lock().drain().map(|(_, w)| w).collect();

        for worker in &workers {
            worker.cancel.store(true, Ordering::SeqCst);
        }

        for worker in workers {
            if worker.handle.join().is_err() {
                warn!("Sync worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{document_registry, DEFAULT_TYPES, TRACK};
    use crate::project::Project;
    use crate::sync::dto::ProjectDto;
    use crate::sync::local::StorageTransport;
    use crate::sync::transport::TransportResult;
    use crate::tracked::{ItemRegistry, TrackedItemsSource};
    use serde_json::json;
    use std::collections::BTreeSet;

    fn registry() -> Arc<ItemRegistry> {
        Arc::new(document_registry(DEFAULT_TYPES))
    }

    fn ids(vcs: &VersionControl) -> BTreeSet<Uuid> {
        vcs.revisions().iter().map(|r| r.id()).collect()
    }

    fn target(vcs: &Arc<VersionControl>, project_id: Uuid) -> SyncTarget {
        SyncTarget::new(Arc::clone(vcs), project_id, "Demo")
    }

    /// A project with `n` commits touching one track.
    fn history(n: usize) -> (Project, Arc<VersionControl>) {
        let registry = registry();
        let mut project = Project::new("Demo", Arc::clone(&registry));
        let vcs = Arc::new(VersionControl::new(registry));
        let id = project.add_document(TRACK, "Bass", &[]).unwrap();

        for i in 0..n {
            project.set_field(id, "step", json!(i)).unwrap();
            vcs.commit_all(&project, &format!("step {}", i)).unwrap();
        }

        (project, vcs)
    }

    fn pushed(transport: &Arc<StorageTransport>, vcs: &Arc<VersionControl>, project_id: Uuid) {
        let ctx = SyncContext::new(transport.clone(), target(vcs, project_id));
        let outcome = run_push(&ctx, &AtomicBool::new(false));
        assert!(matches!(outcome, SyncOutcome::PushDone { .. }), "{:?}", outcome);
    }

    fn cloned(transport: &Arc<StorageTransport>, project_id: Uuid) -> Arc<VersionControl> {
        let vcs = Arc::new(VersionControl::new(registry()));
        let ctx = SyncContext::new(transport.clone(), target(&vcs, project_id));
        assert_eq!(run_clone(&ctx, &AtomicBool::new(false)), SyncOutcome::CloneDone);
        vcs
    }

    #[test]
    fn test_push_creates_project_and_clone_restores_it() {
        let transport = Arc::new(StorageTransport::in_memory().unwrap());
        let (project, vcs) = history(2);
        let project_id = project.id();

        pushed(&transport, &vcs, project_id);
        let remote = transport.fetch_project(project_id).unwrap().unwrap();
        assert_eq!(remote.revisions.len(), 3);
        assert_eq!(remote.head, Some(vcs.heading_revision().id()));

        let copy = cloned(&transport, project_id);
        assert_eq!(ids(&copy), ids(&vcs));
        assert_eq!(copy.root().id(), vcs.root().id());
        assert_eq!(copy.heading_revision().id(), vcs.heading_revision().id());
        assert!(copy.revisions().iter().all(|r| !r.is_shallow()));
        assert_eq!(copy.calculate_hash().unwrap(), vcs.calculate_hash().unwrap());

        let mut materialized = Project::new("Copy", registry());
        let heading = copy.heading_revision();
        copy.checkout(&mut materialized, &heading).unwrap();
        assert_eq!(materialized.num_tracked_items(), 1);
    }

    #[test]
    fn test_pull_converges_and_keeps_local_nodes() {
        let transport = Arc::new(StorageTransport::in_memory().unwrap());
        let (mut upstream_project, upstream) = history(1);
        let project_id = upstream_project.id();
        pushed(&transport, &upstream, project_id);

        let local = cloned(&transport, project_id);
        let mut local_project = Project::new("Demo", registry());
        let heading = local.heading_revision();
        local.checkout(&mut local_project, &heading).unwrap();
        local_project.add_document(TRACK, "Keys", &[]).unwrap();
        local.commit_all(&local_project, "local work").unwrap();

        let bass = upstream_project.resolve("Bass").unwrap();
        upstream_project.set_field(bass, "step", json!(99)).unwrap();
        upstream.commit_all(&upstream_project, "remote work").unwrap();
        pushed(&transport, &upstream, project_id);

        let before: Vec<(Uuid, Option<Uuid>, Vec<Uuid>)> = local
            .revisions()
            .iter()
            .map(|r| {
                (
                    r.id(),
                    r.parent().map(|p| p.id()),
                    r.children().iter().map(|c| c.id()).collect(),
                )
            })
            .collect();

        let ctx = SyncContext::new(transport.clone(), target(&local, project_id));
        let outcome = run_pull(&ctx, PullMode::Full, &AtomicBool::new(false));
        assert_eq!(outcome, SyncOutcome::SyncDone { nothing_to_sync: false });

        let union: BTreeSet<Uuid> = ids(&local).union(&ids(&upstream)).copied().collect();
        assert_eq!(ids(&local), union);

        for (id, parent, children) in before {
            let node = local.find_revision(id).unwrap();
            assert_eq!(node.parent().map(|p| p.id()), parent);
            let now: Vec<Uuid> = node.children().iter().map(|c| c.id()).collect();
            assert!(children.iter().all(|c| now.contains(c)));
        }
        assert!(local.revisions().iter().all(|r| !r.is_shallow()));
    }

    #[test]
    fn test_pull_on_equal_state_is_a_no_op() {
        let transport = Arc::new(StorageTransport::in_memory().unwrap());
        let (project, upstream) = history(2);
        pushed(&transport, &upstream, project.id());
        let local = cloned(&transport, project.id());

        let root = local.root();
        let nodes = local.revisions();

        let ctx = SyncContext::new(transport.clone(), target(&local, project.id()));
        let outcome = run_pull(&ctx, PullMode::Full, &AtomicBool::new(false));

        assert_eq!(outcome, SyncOutcome::SyncDone { nothing_to_sync: true });
        assert!(Arc::ptr_eq(&root, &local.root()));
        for (before, after) in nodes.iter().zip(local.revisions().iter()) {
            assert!(Arc::ptr_eq(before, after));
        }
    }

    #[test]
    fn test_fetch_only_leaves_shallow_nodes() {
        let transport = Arc::new(StorageTransport::in_memory().unwrap());
        let (mut project, upstream) = history(1);
        pushed(&transport, &upstream, project.id());
        let local = cloned(&transport, project.id());

        let bass = project.resolve("Bass").unwrap();
        project.set_field(bass, "step", json!(7)).unwrap();
        let new_remote = upstream.commit_all(&project, "more").unwrap();
        pushed(&transport, &upstream, project.id());

        let ctx = SyncContext::new(transport.clone(), target(&local, project.id()));
        assert_eq!(
            run_pull(&ctx, PullMode::FetchOnly, &AtomicBool::new(false)),
            SyncOutcome::FetchDone
        );
        assert!(local.find_revision(new_remote.id()).unwrap().is_shallow());

        assert_eq!(
            run_pull(&ctx, PullMode::Full, &AtomicBool::new(false)),
            SyncOutcome::SyncDone { nothing_to_sync: false }
        );
        assert!(!local.find_revision(new_remote.id()).unwrap().is_shallow());
    }

    #[test]
    fn test_cancelled_pull_keeps_splices_for_retry() {
        let transport = Arc::new(StorageTransport::in_memory().unwrap());
        let (project, upstream) = history(3);
        pushed(&transport, &upstream, project.id());

        let local = Arc::new(VersionControl::new(registry()));
        let ctx = SyncContext::new(transport.clone(), target(&local, project.id()));

        let outcome = run_pull(&ctx, PullMode::Full, &AtomicBool::new(true));
        assert_eq!(outcome, SyncOutcome::Cancelled);
        assert_eq!(ids(&local), ids(&upstream));
        assert!(local.revisions().iter().all(|r| r.is_shallow()));

        let outcome = run_pull(&ctx, PullMode::Full, &AtomicBool::new(false));
        assert_eq!(outcome, SyncOutcome::SyncDone { nothing_to_sync: false });
        assert!(local.revisions().iter().all(|r| !r.is_shallow()));
    }

    /// Records uploads and injects failures.
    struct ScriptedTransport {
        inner: StorageTransport,
        uploads: Mutex<Vec<RevisionDto>>,
        fail_revision_fetch: bool,
        tamper_payloads: bool,
        gate: Mutex<()>,
    }

    impl ScriptedTransport {
        fn new() -> Self {
            Self {
                inner: StorageTransport::in_memory().unwrap(),
                uploads: Mutex::new(Vec::new()),
                fail_revision_fetch: false,
                tamper_payloads: false,
                gate: Mutex::new(()),
            }
        }
    }

    impl SyncTransport for ScriptedTransport {
        fn fetch_project(&self, project_id: Uuid) -> TransportResult<Option<ProjectDto>> {
            drop(self.gate.lock());
            self.inner.fetch_project(project_id)
        }

        fn put_project(&self, project_id: Uuid, update: &ProjectUpdate) -> TransportResult<()> {
            self.inner.put_project(project_id, update)
        }

        fn fetch_revision(&self, project_id: Uuid, revision_id: Uuid) -> TransportResult<RevisionDto> {
            if self.fail_revision_fetch {
                return Err(TransportError::from_list(vec![
                    "500".to_string(),
                    "backend unavailable".to_string(),
                ]));
            }

            let mut dto = self.inner.fetch_revision(project_id, revision_id)?;
            if self.tamper_payloads {
                if let Some(payload) = dto.data.as_mut() {
                    payload.items.clear();
                }
            }
            Ok(dto)
        }

        fn put_revision(&self, project_id: Uuid, revision: &RevisionDto) -> TransportResult<()> {
            self.uploads.lock().push(revision.clone());
            self.inner.put_revision(project_id, revision)
        }

        fn delete_project(&self, project_id: Uuid) -> TransportResult<()> {
            self.inner.delete_project(project_id)
        }
    }

    #[test]
    fn test_push_uploads_parents_before_children() {
        let transport = Arc::new(ScriptedTransport::new());
        let (mut project, vcs) = history(2);

        let branch_point = vcs.revisions()[1].clone();
        vcs.checkout(&mut project, &branch_point).unwrap();
        project.add_document(TRACK, "Side", &[]).unwrap();
        vcs.commit_all(&project, "side branch").unwrap();

        let ctx = SyncContext::new(transport.clone(), target(&vcs, project.id()));
        assert_eq!(
            run_push(&ctx, &AtomicBool::new(false)),
            SyncOutcome::PushDone { pushed: 4 }
        );

        let uploads = transport.uploads.lock();
        let order: Vec<Uuid> = uploads.iter().map(|dto| dto.id).collect();
        let expected: Vec<Uuid> = vcs.revisions().iter().map(|r| r.id()).collect();
        assert_eq!(order, expected);
        assert_eq!(uploads[0].parent_id, None);

        for (position, dto) in uploads.iter().enumerate() {
            if let Some(parent) = dto.parent_id {
                assert!(order[..position].contains(&parent));
            }
        }
        drop(uploads);

        let again = run_push(&ctx, &AtomicBool::new(false));
        assert_eq!(again, SyncOutcome::PushDone { pushed: 0 });
    }

    #[test]
    fn test_failed_payload_fetch_keeps_spliced_nodes() {
        let mut transport = ScriptedTransport::new();
        transport.fail_revision_fetch = true;
        let transport = Arc::new(transport);

        let (project, upstream) = history(2);
        let setup = SyncContext::new(transport.clone(), target(&upstream, project.id()));
        assert!(matches!(
            run_push(&setup, &AtomicBool::new(false)),
            SyncOutcome::PushDone { .. }
        ));

        let local = Arc::new(VersionControl::new(registry()));
        let ctx = SyncContext::new(transport.clone(), target(&local, project.id()));
        let outcome = run_pull(&ctx, PullMode::Full, &AtomicBool::new(false));

        assert_eq!(
            outcome,
            SyncOutcome::Failed(vec!["500".to_string(), "backend unavailable".to_string()])
        );
        assert_eq!(ids(&local), ids(&upstream));
        assert!(local.revisions().iter().all(|r| r.is_shallow()));
    }

    #[test]
    fn test_tampered_payload_is_reported() {
        let mut transport = ScriptedTransport::new();
        transport.tamper_payloads = true;
        let transport = Arc::new(transport);

        let (project, upstream) = history(1);
        let setup = SyncContext::new(transport.clone(), target(&upstream, project.id()));
        run_push(&setup, &AtomicBool::new(false));

        let local = Arc::new(VersionControl::new(registry()));
        let ctx = SyncContext::new(transport.clone(), target(&local, project.id()));

        match run_pull(&ctx, PullMode::Full, &AtomicBool::new(false)) {
            SyncOutcome::Failed(errors) => assert!(errors[0].contains("hash mismatch")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_missing_project_and_delete() {
        let transport = Arc::new(StorageTransport::in_memory().unwrap());
        let (project, vcs) = history(1);
        let ctx = SyncContext::new(transport.clone(), target(&vcs, project.id()));

        assert_eq!(
            run_pull(&ctx, PullMode::Full, &AtomicBool::new(false)),
            SyncOutcome::ProjectMissing
        );
        let fresh = Arc::new(VersionControl::new(registry()));
        let clone_ctx = SyncContext::new(transport.clone(), target(&fresh, project.id()));
        assert_eq!(
            run_clone(&clone_ctx, &AtomicBool::new(false)),
            SyncOutcome::ProjectMissing
        );

        pushed(&transport, &vcs, project.id());
        assert_eq!(run_delete(&ctx), SyncOutcome::DeleteDone);
        assert!(transport.fetch_project(project.id()).unwrap().is_none());
        assert!(matches!(run_delete(&ctx), SyncOutcome::Failed(_)));
    }

    #[test]
    fn test_clone_into_non_empty_history_fails() {
        let transport = Arc::new(StorageTransport::in_memory().unwrap());
        let (project, vcs) = history(1);
        pushed(&transport, &vcs, project.id());

        let ctx = SyncContext::new(transport.clone(), target(&vcs, project.id()));
        assert!(matches!(
            run_clone(&ctx, &AtomicBool::new(false)),
            SyncOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_service_runs_one_worker_per_kind() {
        let transport = Arc::new(ScriptedTransport::new());
        let (project, vcs) = history(1);
        let (service, mut events) = SyncService::new(transport.clone());

        let gate = transport.gate.lock();
        assert!(service.push(target(&vcs, project.id())));
        assert!(service.is_running(SyncKind::Push, project.id()));
        assert!(!service.push(target(&vcs, project.id())));
        drop(gate);

        let event = events.blocking_recv().unwrap();
        assert_eq!(event.kind, SyncKind::Push);
        assert_eq!(event.outcome, SyncOutcome::PushDone { pushed: 2 });

        assert!(service.pull(target(&vcs, project.id())));
        let event = events.blocking_recv().unwrap();
        assert_eq!(event.kind, SyncKind::Pull);
        assert_eq!(event.outcome, SyncOutcome::SyncDone { nothing_to_sync: true });

        assert!(service.push(target(&vcs, project.id())));
        let event = events.blocking_recv().unwrap();
        assert_eq!(event.outcome, SyncOutcome::PushDone { pushed: 0 });
    }

    #[test]
    fn test_service_runs_same_kind_for_two_projects() {
        let transport = Arc::new(ScriptedTransport::new());
        let (first, first_vcs) = history(1);
        let (second, second_vcs) = history(2);
        let (service, mut events) = SyncService::new(transport.clone());

        let gate = transport.gate.lock();
        assert!(service.push(target(&first_vcs, first.id())));
        assert!(service.push(target(&second_vcs, second.id())));
        assert!(service.is_running(SyncKind::Push, first.id()));
        assert!(service.is_running(SyncKind::Push, second.id()));
        assert!(!service.push(target(&first_vcs, first.id())));
        drop(gate);

        let mut reported = vec![
            events.blocking_recv().unwrap(),
            events.blocking_recv().unwrap(),
        ];
        reported.sort_by_key(|event| event.project_id != first.id());

        assert_eq!(reported[0].project_id, first.id());
        assert_eq!(reported[0].outcome, SyncOutcome::PushDone { pushed: 2 });
        assert_eq!(reported[1].project_id, second.id());
        assert_eq!(reported[1].outcome, SyncOutcome::PushDone { pushed: 3 });
    }

    #[test]
    fn test_cancelled_worker_reports_cancellation() {
        let transport = Arc::new(ScriptedTransport::new());
        let (project, upstream) = history(2);
        let setup = SyncContext::new(transport.clone(), target(&upstream, project.id()));
        run_push(&setup, &AtomicBool::new(false));

        let local = Arc::new(VersionControl::new(registry()));
        let (service, mut events) = SyncService::new(transport.clone());

        let gate = transport.gate.lock();
        assert!(service.pull(target(&local, project.id())));
        service.cancel(SyncKind::Pull, project.id());
        drop(gate);

        let event = events.blocking_recv().unwrap();
        assert_eq!(event.outcome, SyncOutcome::Cancelled);
        assert_eq!(ids(&local), ids(&upstream));
    }
}
