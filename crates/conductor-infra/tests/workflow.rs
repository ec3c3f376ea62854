//! Drives the `rollout` fixture through the reconciler with in-memory
//! adapters. Step controllers are played by the test: they report progress
//! by writing a `workflow-finish` condition into the target's status, and a
//! human approves the promotion step by setting `spec.approved`.

use std::path::PathBuf;
use std::time::Duration;

use conductor_core::controller::{Reconcile, ReconcileAction, Reconciler};
use conductor_core::event::EventBus;
use conductor_core::repository::{
    ApplicationRepository, ObjectReader, ObjectStore, RevisionRepository,
};
use conductor_core::workflow::TypedStepRenderer;
use conductor_infra::applier::ObjectStoreApplier;
use conductor_infra::config::load_controller_config;
use conductor_infra::loader::{load_application, load_bundle};
use conductor_infra::renderer::StaticComponentRenderer;
use conductor_infra::store::{
    InMemoryApplicationRepository, InMemoryObjectStore, InMemoryRevisionRepository,
};
use conductor_types::application::{AppKey, Application};
use conductor_types::condition::find_condition;
use conductor_types::labels::{CONDITION_WORKFLOW, REASON_FAILED, REASON_SUCCEEDED};
use conductor_types::object::ObjectKey;
use conductor_types::workflow::{WorkflowState, WorkflowStepPhase};
use serde_json::json;

type ShopReconciler = Reconciler<
    InMemoryObjectStore,
    InMemoryRevisionRepository,
    InMemoryApplicationRepository,
    StaticComponentRenderer,
    ObjectStoreApplier<InMemoryObjectStore>,
    TypedStepRenderer,
>;

struct Cluster {
    store: InMemoryObjectStore,
    revisions: InMemoryRevisionRepository,
    apps: InMemoryApplicationRepository,
    reconciler: ShopReconciler,
    key: AppKey,
}

fn testdata(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join(path)
}

async fn cluster() -> Cluster {
    let config = load_controller_config(&testdata("rollout/conductor.toml")).await;
    assert_eq!(config.requeue_after(), Duration::from_secs(10));

    let app = load_application(&testdata("rollout/app.yaml")).await.unwrap();
    let bundle = load_bundle(&testdata("rollout/bundle.yaml")).await.unwrap();

    let store = InMemoryObjectStore::new();
    let revisions = InMemoryRevisionRepository::new();
    let apps = InMemoryApplicationRepository::new();
    let key = apps.upsert(&app).key();

    let reconciler = Reconciler::new(
        &config,
        store.clone(),
        revisions.clone(),
        apps.clone(),
        StaticComponentRenderer::from_bundle(bundle),
        ObjectStoreApplier::new(store.clone()),
        TypedStepRenderer::new(config.workflow.clone()),
        EventBus::default(),
    );
    Cluster {
        store,
        revisions,
        apps,
        reconciler,
        key,
    }
}

fn step_key(kind: &str, name: &str) -> ObjectKey {
    ObjectKey::new("rollouts.example.io/v1", kind, "default", name)
}

/// Play the step controller: record a terminal condition for `observed`.
async fn report(store: &InMemoryObjectStore, key: &ObjectKey, reason: &str, observed: i64) {
    let mut live = store.get(key).await.unwrap();
    live.set_path(
        "status.conditions",
        json!([{
            "type": "workflow-finish",
            "status": "True",
            "reason": reason,
            "message": json!({ "observedGeneration": observed }).to_string(),
        }]),
    )
    .unwrap();
    store.update(&live).await.unwrap();
}

impl Cluster {
    async fn pass(&self) -> ReconcileAction {
        self.reconciler.reconcile(&self.key).await.unwrap()
    }

    async fn app(&self) -> Application {
        self.apps.get(&self.key).await.unwrap()
    }
}

#[tokio::test]
async fn test_rollout_with_manual_approval() {
    let cluster = cluster().await;
    let green = step_key("BlueGreen", "shop-0-blue-green-rollout");
    let shift = step_key("TrafficShift", "shop-1-traffic-shift");
    let promote = step_key("Promotion", "shop-2-rollout-promotion");

    // First pass: artifact persisted, first step dispatched, nothing else.
    let action = cluster.pass().await;
    assert_eq!(action, ReconcileAction::RequeueAfter(Duration::from_secs(10)));
    let artifact = cluster
        .revisions
        .get_artifact("default", "shop-v1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(artifact.resources.len(), 1);
    let deployment = ObjectKey::new("apps/v1", "Deployment", "default", "frontend");
    assert!(cluster.store.get(&deployment).await.unwrap_err().is_not_found());

    let dispatched = cluster.store.get(&green).await.unwrap();
    assert_eq!(dispatched.get_path("spec.replicas"), Some(&json!(2)));
    assert!(cluster.store.get(&shift).await.unwrap_err().is_not_found());

    let status = cluster.app().await.status.workflow.unwrap();
    assert_eq!(status.app_revision, "shop-v1");
    assert_eq!(status.state, WorkflowState::Running);
    assert_eq!(status.steps.len(), 1);
    assert_eq!(status.steps[0].phase, WorkflowStepPhase::Running);

    // Steps advance strictly in order as their controllers report.
    report(&cluster.store, &green, REASON_SUCCEEDED, 1).await;
    cluster.pass().await;
    assert!(cluster.store.get(&shift).await.is_ok());
    assert!(cluster.store.get(&promote).await.unwrap_err().is_not_found());

    report(&cluster.store, &shift, REASON_SUCCEEDED, 1).await;
    cluster.pass().await;
    let promotion = cluster.store.get(&promote).await.unwrap();
    assert_eq!(promotion.generation(), Some(1));
    assert_eq!(promotion.get_path("spec.manualApproval"), Some(&json!(true)));

    // Waiting for a human leaves the application status untouched.
    let before = cluster.app().await;
    let action = cluster.pass().await;
    assert_eq!(action, ReconcileAction::RequeueAfter(Duration::from_secs(10)));
    assert_eq!(
        cluster.app().await.metadata.resource_version,
        before.metadata.resource_version
    );

    // A human approves; the spec write bumps the target's generation.
    let mut approved = cluster.store.get(&promote).await.unwrap();
    approved.set_path("spec.approved", json!(true)).unwrap();
    let approved = cluster.store.update(&approved).await.unwrap();
    assert_eq!(approved.generation(), Some(2));

    // A report for the pre-approval generation is stale.
    report(&cluster.store, &promote, REASON_SUCCEEDED, 1).await;
    let action = cluster.pass().await;
    assert_eq!(action, ReconcileAction::RequeueAfter(Duration::from_secs(10)));
    let status = cluster.app().await.status.workflow.unwrap();
    assert_eq!(status.steps[2].phase, WorkflowStepPhase::Running);
    assert_eq!(status.steps[2].applied_generation, Some(2));

    // Re-dispatch kept the approval the desired object does not carry.
    let live = cluster.store.get(&promote).await.unwrap();
    assert_eq!(live.get_path("spec.approved"), Some(&json!(true)));
    assert_eq!(live.generation(), Some(2));

    report(&cluster.store, &promote, REASON_SUCCEEDED, 2).await;
    assert_eq!(cluster.pass().await, ReconcileAction::Done);

    let app = cluster.app().await;
    let status = app.status.workflow.as_ref().unwrap();
    assert_eq!(status.state, WorkflowState::Succeeded);
    assert!(
        status
            .steps
            .iter()
            .all(|s| s.phase == WorkflowStepPhase::Succeeded)
    );
    let workflow = find_condition(&app.status.conditions, CONDITION_WORKFLOW).unwrap();
    assert!(workflow.status.is_true());
    assert_eq!(workflow.reason, REASON_SUCCEEDED);

    // Finished workflows stay finished and quiet.
    assert_eq!(cluster.pass().await, ReconcileAction::Done);
    assert_eq!(
        cluster.app().await.metadata.resource_version,
        app.metadata.resource_version
    );
}

#[tokio::test]
async fn test_rollout_step_failure_halts_workflow() {
    let cluster = cluster().await;
    let green = step_key("BlueGreen", "shop-0-blue-green-rollout");
    let shift = step_key("TrafficShift", "shop-1-traffic-shift");

    cluster.pass().await;
    report(&cluster.store, &green, REASON_FAILED, 1).await;
    assert_eq!(cluster.pass().await, ReconcileAction::Done);

    let app = cluster.app().await;
    let status = app.status.workflow.unwrap();
    assert_eq!(status.state, WorkflowState::Failed);
    assert_eq!(status.steps[0].phase, WorkflowStepPhase::Failed);
    assert!(cluster.store.get(&shift).await.unwrap_err().is_not_found());

    let workflow = find_condition(&app.status.conditions, CONDITION_WORKFLOW).unwrap();
    assert!(!workflow.status.is_true());
    assert_eq!(workflow.reason, REASON_FAILED);
}

#[tokio::test]
async fn test_spec_change_restarts_workflow_on_new_revision() {
    let cluster = cluster().await;
    let green = step_key("BlueGreen", "shop-0-blue-green-rollout");

    cluster.pass().await;
    report(&cluster.store, &green, REASON_SUCCEEDED, 1).await;
    cluster.pass().await;

    // The user edits the first step; a new revision starts from step 0.
    let mut app = cluster.app().await;
    if let Some(workflow) = app.spec.workflow.as_mut() {
        workflow.steps[0].properties = json!({ "component": "frontend", "replicas": 4 });
    }
    cluster.apps.upsert(&app);
    cluster.pass().await;

    let app = cluster.app().await;
    assert_eq!(app.status.latest_revision.unwrap().name, "shop-v2");
    let status = app.status.workflow.unwrap();
    assert_eq!(status.app_revision, "shop-v2");
    assert_eq!(status.steps.len(), 1);
    assert_eq!(status.steps[0].phase, WorkflowStepPhase::Running);
    assert_eq!(status.steps[0].applied_generation, Some(2));

    let green = cluster.store.get(&green).await.unwrap();
    assert_eq!(green.get_path("spec.replicas"), Some(&json!(4)));
}

#[tokio::test]
async fn test_new_revision_retries_failed_step() {
    let cluster = cluster().await;
    let green = step_key("BlueGreen", "shop-0-blue-green-rollout");
    let shift = step_key("TrafficShift", "shop-1-traffic-shift");

    cluster.pass().await;
    report(&cluster.store, &green, REASON_FAILED, 1).await;
    assert_eq!(cluster.pass().await, ReconcileAction::Done);

    // The user fixes the failed step; its previous report must not count.
    let mut app = cluster.app().await;
    if let Some(workflow) = app.spec.workflow.as_mut() {
        workflow.steps[0].properties = json!({ "component": "frontend", "replicas": 3 });
    }
    cluster.apps.upsert(&app);
    let action = cluster.pass().await;
    assert_eq!(action, ReconcileAction::RequeueAfter(Duration::from_secs(10)));

    let app = cluster.app().await;
    let status = app.status.workflow.unwrap();
    assert_eq!(status.app_revision, "shop-v2");
    assert_eq!(status.state, WorkflowState::Running);
    assert_eq!(status.steps[0].phase, WorkflowStepPhase::Running);
    assert_eq!(status.steps[0].message, None);
    let workflow = find_condition(&app.status.conditions, CONDITION_WORKFLOW).unwrap();
    assert!(!workflow.status.is_true());
    assert_eq!(workflow.reason, "Running");

    report(&cluster.store, &green, REASON_SUCCEEDED, 2).await;
    cluster.pass().await;
    assert!(cluster.store.get(&shift).await.is_ok());
}
