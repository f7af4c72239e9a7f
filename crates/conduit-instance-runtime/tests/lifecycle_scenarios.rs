use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use conduit_entity::{Entity, EntityRegistry, EntityType, InMemoryEntityRegistry};
use conduit_instance_runtime::{
    CompletionAck, CompletionNotification, DelayedRetryQueue, InMemoryAuditLog,
    InMemoryExecutionEngine, Instance, InstanceRequest, InstanceStatus, LifecycleDispatcher,
    RequestContext, RetryBackoff, RetryEscalationTrigger, RetryHandoff, RetryPolicy,
    RetryScheduler, TemplateLogResolver, WindowResolver,
};

fn day(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, day, 0, 0, 0).unwrap()
}

fn registry() -> Arc<InMemoryEntityRegistry> {
    let registry = InMemoryEntityRegistry::new();
    registry
        .register(
            Entity::new(EntityType::Process, "demo-process")
                .with_cluster("east", day(1, 1), day(2, 1))
                .with_cluster("west", day(1, 15), day(3, 1)),
        )
        .expect("register demo-process");
    Arc::new(registry)
}

fn engine() -> Arc<InMemoryExecutionEngine> {
    Arc::new(InMemoryExecutionEngine::with_instances(vec![
        Instance::new(
            EntityType::Process,
            "demo-process",
            "east",
            day(1, 20),
            InstanceStatus::Running,
        )
        .with_workflow_id("wf-20"),
        Instance::new(
            EntityType::Process,
            "demo-process",
            "east",
            day(1, 21),
            InstanceStatus::Failed,
        )
        .with_workflow_id("wf-21"),
    ]))
}

struct Fixture {
    engine: Arc<InMemoryExecutionEngine>,
    audit: Arc<InMemoryAuditLog>,
    dispatcher: LifecycleDispatcher<InMemoryExecutionEngine>,
}

fn fixture() -> Fixture {
    let engine = engine();
    let audit = Arc::new(InMemoryAuditLog::new());
    let dispatcher = LifecycleDispatcher::new(
        engine.clone(),
        registry(),
        Arc::new(TemplateLogResolver::new("http://logs.test/")),
        audit.clone(),
        ["corp"],
    );
    Fixture {
        engine,
        audit,
        dispatcher,
    }
}

#[test]
fn range_covered_by_both_clusters_resolves_to_first() {
    let registry = registry();
    let range = WindowResolver::new(registry.as_ref())
        .validate_params(
            "process",
            "demo-process",
            "2024-01-20T00:00Z",
            Some("2024-01-21T00:00Z"),
        )
        .expect("range validates");
    assert_eq!(range.cluster, "east");
    assert_eq!(range.start, day(1, 20));
    assert_eq!(range.end, day(1, 21));
}

#[test]
fn range_outside_every_cluster_reports_first_cluster_error() {
    let registry = registry();
    let err = WindowResolver::new(registry.as_ref())
        .validate_params(
            "process",
            "demo-process",
            "2024-03-05T00:00Z",
            Some("2024-03-06T00:00Z"),
        )
        .expect_err("outside both windows");
    assert_eq!(err.code(), "end_after_window");
    assert_eq!(
        err.to_string(),
        "End date 2024-03-06T00:00Z is after PROCESS end 2024-02-01T00:00Z on cluster east"
    );

    let entity = registry
        .resolve(EntityType::Process, "demo-process")
        .expect("resolve");
    let errors = WindowResolver::new(registry.as_ref())
        .resolve_range(entity, day(3, 5), Some(day(3, 6)))
        .expect_err("ordered errors");
    assert_eq!(errors.len(), 2);
}

#[test]
fn kill_without_end_targets_one_second_window() {
    let f = fixture();
    let ctx = RequestContext::new("req-kill").with_requester("ops");
    let req =
        InstanceRequest::new("PROCESS", "demo-process", "corp").with_start("2024-01-20T00:00Z");

    let result = f.dispatcher.kill(&ctx, &req).expect("kill");
    assert_eq!(result.message, "KILL applied to 1 instance(s)");
    assert_eq!(result.instances.len(), 1);
    assert_eq!(result.instances[0].nominal_time, day(1, 20));

    let snapshot = f.engine.snapshot();
    assert_eq!(snapshot[0].status, InstanceStatus::Killed);
    assert_eq!(snapshot[1].status, InstanceStatus::Failed);

    let records = f.audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].request_id, "req-kill");
    assert_eq!(records[0].requester.as_deref(), Some("ops"));
}

#[test]
fn status_carries_log_links_for_every_instance() {
    let f = fixture();
    let req = InstanceRequest::new("process", "demo-process", "corp")
        .with_start("2024-01-20T00:00Z")
        .with_end("2024-01-22T00:00Z");
    let result = f.dispatcher.status(&req).expect("status");
    assert_eq!(result.message, "Instance Status");
    let urls: Vec<_> = result
        .instances
        .iter()
        .map(|i| i.log_url.clone().unwrap_or_default())
        .collect();
    assert_eq!(
        urls,
        [
            "http://logs.test/east/process/demo-process/2024-01-20T00:00Z/default/0",
            "http://logs.test/east/process/demo-process/2024-01-21T00:00Z/default/0",
        ]
    );
    assert!(f.audit.records().is_empty());
}

#[derive(Default)]
struct RecordingScheduler {
    submitted: Mutex<Vec<RetryHandoff>>,
}

impl RetryScheduler<InMemoryExecutionEngine> for RecordingScheduler {
    fn submit(&self, handoff: RetryHandoff, _engine: Arc<InMemoryExecutionEngine>) {
        self.submitted.lock().expect("submitted lock").push(handoff);
    }
}

fn notification(status: &str, run_id: &str, workflow_id: &str) -> CompletionNotification {
    CompletionNotification {
        process: "demo-process".into(),
        feed_name: None,
        feed_path: None,
        nominal_time: "2024-01-21T00:00Z".into(),
        timestamp: "2024-01-21T00:30Z".into(),
        status: status.into(),
        workflow_id: workflow_id.into(),
        run_id: run_id.into(),
        received_at: day(1, 21) + Duration::minutes(31),
    }
}

#[test]
fn failed_notification_hands_off_and_signals_failure() {
    let scheduler = Arc::new(RecordingScheduler::default());
    let trigger = RetryEscalationTrigger::new(engine(), scheduler.clone());

    let err = trigger
        .on_completion(&notification("failed", "3", "wf-21"))
        .expect_err("failure signal");
    assert_eq!(err.process, "demo-process");

    let submitted = scheduler.submitted.lock().expect("lock");
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].run_id, "3");
}

#[test]
fn succeeded_notification_is_acknowledged_without_handoff() {
    let scheduler = Arc::new(RecordingScheduler::default());
    let trigger = RetryEscalationTrigger::new(engine(), scheduler.clone());

    let ack = trigger
        .on_completion(&notification("SUCCEEDED", "0", "wf-21"))
        .expect("ack");
    assert_eq!(ack, CompletionAck::Done);
    assert!(scheduler.submitted.lock().expect("lock").is_empty());
}

#[test]
fn failed_run_is_rerun_once_its_delay_elapses() {
    let engine = engine();
    let queue = Arc::new(DelayedRetryQueue::new(RetryPolicy {
        delay: Duration::minutes(5),
        attempts: 3,
        backoff: RetryBackoff::Periodic,
    }));
    let trigger = RetryEscalationTrigger::new(engine.clone(), queue.clone());

    let failed = notification("FAILED", "0", "wf-21");
    assert!(trigger.on_completion(&failed).is_err());
    assert_eq!(queue.pending(), 1);

    let early = queue
        .tick(failed.received_at + Duration::minutes(4))
        .expect("early tick");
    assert_eq!(early.rerun, 0);

    let due = queue
        .tick(failed.received_at + Duration::minutes(5))
        .expect("due tick");
    assert_eq!(due.rerun, 1);
    let rerun = &engine.snapshot()[1];
    assert_eq!(rerun.status, InstanceStatus::Running);
    assert_eq!(rerun.run_id, 1);
}
