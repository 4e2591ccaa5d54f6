//! Scheduler behaviour: ordering, concurrency bound, retries, cancellation,
//! timeouts and the compile/generate handler.

use async_trait::async_trait;
use proptest::prelude::*;
use serde_json::{Value, json};
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use upe_engine::{CompileRequest, Compiler, CompilerOptions};
use upe_llm::{BudgetedGenerator, EchoGenerator, Generator, Generators};
use upe_manifest::InMemoryManifestStore;
use upe_scheduler::{
    COMPILE_JOB, CompileJobHandler, GENERATE_JOB, JobContext, JobError, JobHandler, JobOptions,
    JobScheduler, JobState, SchedulerOptions,
};
use upe_templates::{Template, TemplateRegistry};
use upe_utils::error::ErrorKind;

const DEFAULT_PROPTEST_CASES: u32 = 16;

fn proptest_config(max_cases: Option<u32>) -> ProptestConfig {
    let env_cases = env::var("PROPTEST_CASES")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(DEFAULT_PROPTEST_CASES);
    let cases = max_cases.map_or(env_cases, |max| env_cases.min(max));
    ProptestConfig {
        cases,
        ..ProptestConfig::default()
    }
}

/// Handler driven by the payload:
/// `{"sleep_ms": n, "fail_until": k, "gated": bool, "tag": v}`.
///
/// Fails attempts numbered below `fail_until`, waits for a gate permit when
/// `gated`, and records start order and peak concurrency.
#[derive(Default)]
struct ScriptedHandler {
    current: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<Value>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedHandler {
    fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    fn started_tags(&self) -> Vec<Value> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobHandler for ScriptedHandler {
    async fn handle(&self, job: JobContext) -> Result<Value, JobError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.started
            .lock()
            .unwrap()
            .push(job.payload.get("tag").cloned().unwrap_or(Value::Null));

        if job.payload["gated"].as_bool().unwrap_or(false)
            && let Some(gate) = &self.gate
        {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(ms) = job.payload["sleep_ms"].as_u64() {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        self.current.fetch_sub(1, Ordering::SeqCst);

        let fail_until = job.payload["fail_until"].as_u64().unwrap_or(0);
        if u64::from(job.attempt) < fail_until {
            Err(JobError::Handler(format!("scripted failure {}", job.attempt)))
        } else {
            Ok(json!({"attempt": job.attempt}))
        }
    }
}

fn options(max_concurrent: usize) -> SchedulerOptions {
    SchedulerOptions::default().with_max_concurrent(max_concurrent)
}

#[tokio::test]
async fn ten_jobs_never_exceed_three_running() {
    let handler = Arc::new(ScriptedHandler::default());
    let scheduler = JobScheduler::new(handler.clone(), options(3));

    let mut ids = Vec::new();
    for (i, priority) in [10u8, 10, 1, 1, 1, 1, 1, 1, 1, 1].into_iter().enumerate() {
        let payload = json!({"sleep_ms": 10, "tag": priority, "n": i});
        let submission = scheduler
            .add_job("work", payload, JobOptions::default().priority(priority))
            .unwrap();
        ids.push(submission.job_id);
        assert!(scheduler.get_stats().active_slots <= 3);
    }

    scheduler.wait_idle().await;

    assert!(handler.peak.load(Ordering::SeqCst) <= 3);
    let stats = scheduler.get_stats();
    assert!(stats.peak_active <= 3);
    assert_eq!(stats.completed, 10);
    assert_eq!(&handler.started_tags()[..2], &[json!(10), json!(10)]);
}

#[tokio::test]
async fn higher_priority_overtakes_earlier_submissions() {
    let gate = Arc::new(Semaphore::new(0));
    let handler = Arc::new(ScriptedHandler::gated(gate.clone()));
    let scheduler = JobScheduler::new(handler.clone(), options(1));

    // Occupies the only slot until the gate opens
    let blocker = scheduler
        .add_job(
            "work",
            json!({"gated": true, "tag": "blocker"}),
            JobOptions::default(),
        )
        .unwrap();
    for (tag, priority) in [
        ("low-a", 1u8),
        ("low-b", 1),
        ("high-a", 10),
        ("mid", 5),
        ("high-b", 10),
    ] {
        scheduler
            .add_job("work", json!({"tag": tag}), JobOptions::default().priority(priority))
            .unwrap();
    }
    assert_eq!(scheduler.get_stats().queued, 5);

    gate.add_permits(1);
    scheduler.wait_for(&blocker.job_id).await.unwrap();
    scheduler.wait_idle().await;

    assert_eq!(
        handler.started_tags(),
        vec![
            json!("blocker"),
            json!("high-a"),
            json!("high-b"),
            json!("mid"),
            json!("low-a"),
            json!("low-b"),
        ]
    );
}

#[tokio::test]
async fn two_failures_then_success_completes_on_third_attempt() {
    let scheduler = JobScheduler::new(Arc::new(ScriptedHandler::default()), options(2));
    let submission = scheduler
        .add_job(
            "work",
            json!({"fail_until": 3}),
            JobOptions::default().max_attempts(3),
        )
        .unwrap();

    let status = scheduler.wait_for(&submission.job_id).await.unwrap();
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.attempts, 3);
    assert_eq!(status.result, Some(json!({"attempt": 3})));
    assert!(status.error.is_none());
}

#[tokio::test]
async fn exhausted_retries_fail_after_exactly_max_attempts() {
    let scheduler = JobScheduler::new(Arc::new(ScriptedHandler::default()), options(2));
    let submission = scheduler
        .add_job(
            "work",
            json!({"fail_until": 100}),
            JobOptions::default().max_attempts(4),
        )
        .unwrap();

    let status = scheduler.wait_for(&submission.job_id).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.attempts, 4);
    let error = status.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Compute);
    assert!(error.message.contains("scripted failure 4"));
}

#[tokio::test]
async fn retried_job_goes_to_back_of_its_tier() {
    let gate = Arc::new(Semaphore::new(0));
    let handler = Arc::new(ScriptedHandler::gated(gate.clone()));
    let scheduler = JobScheduler::new(handler.clone(), options(1));

    let blocker = scheduler
        .add_job("work", json!({"gated": true, "tag": "blocker"}), JobOptions::default())
        .unwrap();
    scheduler
        .add_job(
            "work",
            json!({"tag": "flaky", "fail_until": 2}),
            JobOptions::default().priority(5).max_attempts(2),
        )
        .unwrap();
    scheduler
        .add_job("work", json!({"tag": "steady"}), JobOptions::default().priority(5))
        .unwrap();

    gate.add_permits(1);
    scheduler.wait_for(&blocker.job_id).await.unwrap();
    scheduler.wait_idle().await;

    assert_eq!(
        handler.started_tags(),
        vec![
            json!("blocker"),
            json!("flaky"),
            json!("steady"),
            json!("flaky"),
        ]
    );
}

#[tokio::test]
async fn cancelling_queued_job_is_immediate_and_never_dispatched() {
    let gate = Arc::new(Semaphore::new(0));
    let handler = Arc::new(ScriptedHandler::gated(gate.clone()));
    let scheduler = JobScheduler::new(handler.clone(), options(1));

    let blocker = scheduler
        .add_job("work", json!({"gated": true, "tag": "blocker"}), JobOptions::default())
        .unwrap();
    let queued = scheduler
        .add_job("work", json!({"tag": "victim"}), JobOptions::default())
        .unwrap();

    assert_eq!(scheduler.cancel_job(&queued.job_id), Some(JobState::Cancelled));
    let status = scheduler.get_job(&queued.job_id).unwrap();
    assert_eq!(status.state, JobState::Cancelled);
    assert_eq!(status.progress, 100);

    gate.add_permits(1);
    scheduler.wait_for(&blocker.job_id).await.unwrap();
    scheduler.wait_idle().await;

    let status = scheduler.get_job(&queued.job_id).unwrap();
    assert_eq!(status.state, JobState::Cancelled);
    assert_eq!(status.attempts, 0);
    assert_eq!(handler.started_tags(), vec![json!("blocker")]);
}

#[tokio::test]
async fn cancelled_running_job_keeps_cancelled_state() {
    let gate = Arc::new(Semaphore::new(0));
    let handler = Arc::new(ScriptedHandler::gated(gate.clone()));
    let scheduler = JobScheduler::new(handler.clone(), options(1));

    let running = scheduler
        .add_job("work", json!({"gated": true}), JobOptions::default())
        .unwrap();
    let next = scheduler
        .add_job("work", json!({}), JobOptions::default())
        .unwrap();
    assert_eq!(
        scheduler.get_job(&running.job_id).unwrap().state,
        JobState::Running
    );

    assert_eq!(scheduler.cancel_job(&running.job_id), Some(JobState::Cancelled));
    // The slot stays occupied until the attempt actually finishes
    assert_eq!(scheduler.get_stats().active_slots, 1);
    assert_eq!(
        scheduler.get_job(&next.job_id).unwrap().state,
        JobState::Queued
    );

    gate.add_permits(1);
    let next_status = scheduler.wait_for(&next.job_id).await.unwrap();
    assert_eq!(next_status.state, JobState::Completed);

    let status = scheduler.get_job(&running.job_id).unwrap();
    assert_eq!(status.state, JobState::Cancelled);
    assert!(status.result.is_none());
    assert_eq!(
        scheduler.cancel_job(&running.job_id),
        Some(JobState::Cancelled)
    );
}

#[tokio::test]
async fn terminal_jobs_cannot_be_cancelled() {
    let scheduler = JobScheduler::new(Arc::new(ScriptedHandler::default()), options(1));
    let submission = scheduler
        .add_job("work", json!({}), JobOptions::default())
        .unwrap();
    scheduler.wait_for(&submission.job_id).await.unwrap();

    assert_eq!(
        scheduler.cancel_job(&submission.job_id),
        Some(JobState::Completed)
    );
    assert_eq!(scheduler.get_stats().cancelled, 0);
}

#[tokio::test]
async fn overrunning_attempt_times_out_and_retries() {
    let scheduler = JobScheduler::new(
        Arc::new(ScriptedHandler::default()),
        options(1).with_job_timeout(Duration::from_millis(20)),
    );
    let submission = scheduler
        .add_job(
            "work",
            json!({"sleep_ms": 500}),
            JobOptions::default().max_attempts(2),
        )
        .unwrap();

    let status = scheduler.wait_for(&submission.job_id).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.attempts, 2);
    assert!(status.error.unwrap().message.contains("timed out"));
}

/// Sleeps `sleep_ms` on the blocking pool, where aborting the attempt cannot
/// stop it, holding the attempt's slot lease until it wakes.
#[derive(Default)]
struct BlockingHandler {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl JobHandler for BlockingHandler {
    async fn handle(&self, job: JobContext) -> Result<Value, JobError> {
        let ms = job.payload["sleep_ms"].as_u64().unwrap_or(0);
        let lease = job.slot_lease();
        let current = Arc::clone(&self.current);
        let peak = Arc::clone(&self.peak);
        tokio::task::spawn_blocking(move || {
            let _lease = lease;
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(ms));
            current.fetch_sub(1, Ordering::SeqCst);
        })
        .await
        .map_err(|e| JobError::Aborted(e.to_string()))?;
        Ok(json!({"slept_ms": ms}))
    }
}

#[tokio::test]
async fn timed_out_blocking_attempt_keeps_its_slot() {
    let handler = Arc::new(BlockingHandler::default());
    let scheduler = JobScheduler::new(
        handler.clone(),
        options(1).with_job_timeout(Duration::from_millis(20)),
    );
    let slow = scheduler
        .add_job(
            "work",
            json!({"sleep_ms": 300}),
            JobOptions::default().max_attempts(1),
        )
        .unwrap();
    let quick = scheduler
        .add_job(
            "work",
            json!({"sleep_ms": 1}),
            JobOptions::default().max_attempts(1),
        )
        .unwrap();

    let slow = scheduler.wait_for(&slow.job_id).await.unwrap();
    assert_eq!(slow.state, JobState::Failed);
    assert_eq!(slow.attempts, 1);
    assert!(slow.error.unwrap().message.contains("timed out"));

    // The abandoned sleep still owns the only slot
    assert_eq!(scheduler.get_stats().active_slots, 1);
    assert_eq!(
        scheduler.get_job(&quick.job_id).unwrap().state,
        JobState::Queued
    );

    let quick = scheduler.wait_for(&quick.job_id).await.unwrap();
    assert_eq!(quick.state, JobState::Completed);
    assert_eq!(handler.peak.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.get_stats().peak_active, 1);
}

fn compile_handler(generators: Generators) -> Arc<CompileJobHandler> {
    let template = Template::new("deck", "1.0.0", "You write decks.", "{{goal}} for {{audience}}")
        .with_keywords(["deck", "board"])
        .with_required_slots(["audience"]);
    let registry = Arc::new(TemplateRegistry::with_templates([template]).unwrap());
    let compiler = Arc::new(Compiler::new(
        registry,
        Arc::new(InMemoryManifestStore::new()),
        CompilerOptions::default(),
    ));
    Arc::new(CompileJobHandler::new(compiler, generators))
}

fn compile_payload(request: &CompileRequest) -> Value {
    serde_json::to_value(request).unwrap()
}

#[tokio::test]
async fn compile_job_completes_with_response_of_any_status() {
    let scheduler = JobScheduler::new(compile_handler(Generators::default()), options(2));

    let ok = scheduler
        .add_job(
            COMPILE_JOB,
            compile_payload(&CompileRequest::new("board deck").with_slot("audience", "board")),
            JobOptions::default(),
        )
        .unwrap();
    let needed = scheduler
        .add_job(
            COMPILE_JOB,
            compile_payload(&CompileRequest::new("board deck")),
            JobOptions::default(),
        )
        .unwrap();

    let ok = scheduler.wait_for(&ok.job_id).await.unwrap();
    assert_eq!(ok.state, JobState::Completed);
    assert_eq!(ok.result.as_ref().unwrap()["status"], "OK");

    let needed = scheduler.wait_for(&needed.job_id).await.unwrap();
    assert_eq!(needed.state, JobState::Completed);
    assert_eq!(needed.result.as_ref().unwrap()["status"], "NEEDED");
}

#[tokio::test]
async fn generate_job_invokes_generator() {
    let scheduler = JobScheduler::new(compile_handler(Generators::default()), options(2));
    let request = CompileRequest::new("board deck").with_slot("audience", "investors");
    let submission = scheduler
        .add_job(GENERATE_JOB, compile_payload(&request), JobOptions::default())
        .unwrap();

    let status = scheduler.wait_for(&submission.job_id).await.unwrap();
    assert_eq!(status.state, JobState::Completed);
    let result = status.result.unwrap();
    assert_eq!(result["compile"]["status"], "OK");
    let content = result["generation"]["content"].as_str().unwrap();
    assert!(content.contains("board deck for investors"));
    assert!(content.ends_with("</END>"));
}

#[tokio::test]
async fn generate_job_fails_when_compile_is_not_ok() {
    let scheduler = JobScheduler::new(compile_handler(Generators::default()), options(1));
    let submission = scheduler
        .add_job(
            GENERATE_JOB,
            compile_payload(&CompileRequest::new("quantum chemistry")),
            JobOptions::default().max_attempts(2),
        )
        .unwrap();

    let status = scheduler.wait_for(&submission.job_id).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    // The same compile would fail again, so no second attempt is made
    assert_eq!(status.attempts, 1);
    assert_eq!(status.error.unwrap().kind, ErrorKind::NoCandidate);
}

#[tokio::test]
async fn generate_job_retries_consume_generator_budget() {
    let budgeted: Arc<dyn Generator> =
        Arc::new(BudgetedGenerator::new(Arc::new(EchoGenerator::new()), 0));
    let scheduler = JobScheduler::new(compile_handler(Generators::new(budgeted)), options(1));
    let request = CompileRequest::new("board deck").with_slot("audience", "investors");
    let submission = scheduler
        .add_job(
            GENERATE_JOB,
            compile_payload(&request),
            JobOptions::default().max_attempts(3),
        )
        .unwrap();

    let status = scheduler.wait_for(&submission.job_id).await.unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.attempts, 3);
    assert!(status.error.unwrap().message.contains("Budget exceeded"));
}

#[tokio::test]
async fn unknown_job_type_and_bad_payload_fail_without_retry() {
    let scheduler = JobScheduler::new(compile_handler(Generators::default()), options(1));
    let unknown = scheduler
        .add_job("translate", json!({}), JobOptions::default().max_attempts(3))
        .unwrap();
    let malformed = scheduler
        .add_job(COMPILE_JOB, json!({"goal": 42}), JobOptions::default().max_attempts(3))
        .unwrap();

    let unknown = scheduler.wait_for(&unknown.job_id).await.unwrap();
    assert_eq!(unknown.state, JobState::Failed);
    assert_eq!(unknown.attempts, 1);
    let error = unknown.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Validation);
    assert!(error.message.contains("translate"));

    let malformed = scheduler.wait_for(&malformed.job_id).await.unwrap();
    assert_eq!(malformed.state, JobState::Failed);
    assert_eq!(malformed.attempts, 1);
    assert_eq!(malformed.error.unwrap().kind, ErrorKind::Validation);
}

proptest! {
    #![proptest_config(proptest_config(None))]

    #[test]
    fn running_count_never_exceeds_cap(
        max_concurrent in 1usize..5,
        jobs in prop::collection::vec((1u8..=10, 0u64..4, 0u64..4), 1..20),
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        let (peak, stats, attempts_ok) = runtime.block_on(async {
            let handler = Arc::new(ScriptedHandler::default());
            let scheduler = JobScheduler::new(handler.clone(), options(max_concurrent));

            let mut submitted = Vec::new();
            for (priority, sleep_ms, fail_until) in &jobs {
                let payload = json!({"sleep_ms": sleep_ms, "fail_until": fail_until});
                let id = scheduler
                    .add_job(
                        "work",
                        payload,
                        JobOptions::default().priority(*priority).max_attempts(2),
                    )
                    .unwrap()
                    .job_id;
                submitted.push((id, *fail_until));
            }
            scheduler.wait_idle().await;

            let attempts_ok = submitted.iter().all(|(id, fail_until)| {
                let status = scheduler.get_job(id).unwrap();
                match fail_until {
                    0 | 1 => status.state == JobState::Completed && status.attempts == 1,
                    2 => status.state == JobState::Completed && status.attempts == 2,
                    _ => status.state == JobState::Failed && status.attempts == 2,
                }
            });
            (handler.peak.load(Ordering::SeqCst), scheduler.get_stats(), attempts_ok)
        });

        prop_assert!(peak <= max_concurrent);
        prop_assert!(stats.peak_active <= max_concurrent);
        prop_assert_eq!(stats.completed + stats.failed, jobs.len());
        prop_assert!(attempts_ok);
    }
}
