//! Retry, backoff and deadline behaviour of a full exchange, driven through
//! scripted transports on paused tokio time.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use voice_agent::conversation::{Conversation, Role};
use voice_agent::llm::{
    Exchange, ExchangeError, GenerationBody, RawResponse, ResilientExecutor, RetryPolicy, Transport,
    TransportError,
};
use voice_agent::orchestrator::{DEADLINE_EXCEEDED_REPLY, RETRIES_EXHAUSTED_REPLY, ReplyKind, TurnOrchestrator};

/// Replays queued results; repeats the last one once the queue is drained.
struct Script {
    queue: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    calls: AtomicU32,
}

impl Script {
    fn new(results: Vec<Result<RawResponse, TransportError>>) -> Self {
        Self { queue: Mutex::new(results.into()), calls: AtomicU32::new(0) }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transport for Script {
    async fn post_inputs(&self, _prompt: &str) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }
}

/// Never answers.
struct Hang;

impl Transport for Hang {
    async fn post_inputs(&self, _prompt: &str) -> Result<RawResponse, TransportError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(TransportError("unreachable".into()))
    }
}

fn policy(max_retries: u32, backoff_factor: f64) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        backoff_factor,
        backoff_unit: Duration::from_secs(1),
        deadline: None,
    }
}

fn ok(body: &str) -> Result<RawResponse, TransportError> {
    Ok(RawResponse::new(200, body))
}

#[tokio::test(start_paused = true)]
async fn first_success_takes_one_attempt_and_no_sleep() {
    let executor = ResilientExecutor::new(Script::new(vec![ok(r#"[{"generated_text":"Hi"}]"#)]), policy(3, 2.0));
    let started = Instant::now();

    let exchange = executor.execute("user: hello").await.unwrap();

    assert_eq!(executor.transport().calls(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
    match exchange {
        Exchange::Decoded(body) => assert_eq!(voice_agent::llm::extract_text(&body), Some("Hi")),
        other => panic!("unexpected exchange: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_sleep_the_geometric_sum() {
    let executor = ResilientExecutor::new(Script::new(vec![Ok(RawResponse::new(503, "loading"))]), policy(4, 2.0));
    let started = Instant::now();

    let err = executor.execute("user: hello").await.unwrap_err();

    assert_eq!(err, ExchangeError::RetriesExhausted { attempts: 4, last_status: Some(503) });
    assert_eq!(executor.transport().calls(), 4);
    // 2 + 4 + 8 seconds; no sleep after the last attempt.
    assert_eq!(started.elapsed(), Duration::from_secs(14));
    assert_eq!(executor.policy().total_backoff(), Duration::from_secs(14));
}

#[tokio::test(start_paused = true)]
async fn recovers_after_transient_failures() {
    let executor = ResilientExecutor::new(
        Script::new(vec![
            Ok(RawResponse::new(503, "loading")),
            Err(TransportError("connection reset".into())),
            ok(r#"{"generated_text":"back"}"#),
        ]),
        policy(3, 2.0),
    );
    let started = Instant::now();

    let exchange = executor.execute("user: hello").await.unwrap();

    assert_eq!(executor.transport().calls(), 3);
    assert_eq!(started.elapsed(), Duration::from_secs(6));
    assert!(matches!(exchange, Exchange::Decoded(GenerationBody::Object(_))));
}

#[tokio::test(start_paused = true)]
async fn undecodable_success_is_not_retried() {
    let executor = ResilientExecutor::new(Script::new(vec![ok("<html>oops</html>")]), policy(3, 2.0));

    let exchange = executor.execute("user: hello").await.unwrap();

    assert_eq!(exchange, Exchange::Undecodable);
    assert_eq!(executor.transport().calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_errors_exhaust_without_status() {
    let executor = ResilientExecutor::new(Script::new(vec![Err(TransportError("refused".into()))]), policy(2, 1.5));

    let err = executor.execute("user: hello").await.unwrap_err();

    assert_eq!(err, ExchangeError::RetriesExhausted { attempts: 2, last_status: None });
}

#[tokio::test(start_paused = true)]
async fn deadline_bounds_a_hanging_transport() {
    let policy = RetryPolicy { deadline: Some(Duration::from_secs(5)), ..policy(3, 2.0) };
    let executor = ResilientExecutor::new(Hang, policy);
    let started = Instant::now();

    let err = executor.execute("user: hello").await.unwrap_err();

    assert_eq!(err, ExchangeError::DeadlineExceeded(Duration::from_secs(5)));
    assert_eq!(started.elapsed(), Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn failed_exchange_still_commits_two_turns() {
    let executor = ResilientExecutor::new(Script::new(vec![Ok(RawResponse::new(500, "boom"))]), policy(2, 2.0));
    let agent = TurnOrchestrator::new(executor, Conversation::seeded(Some("be brief")));

    let reply = agent.exchange("hello").await;

    assert_eq!(reply.kind, ReplyKind::Failed);
    assert_eq!(reply.text, RETRIES_EXHAUSTED_REPLY);
    let conversation = agent.snapshot().await;
    let roles: Vec<Role> = conversation.turns().iter().map(|t| t.role()).collect();
    assert_eq!(roles, [Role::System, Role::User, Role::Assistant]);
    assert_eq!(conversation.turns()[2].content(), RETRIES_EXHAUSTED_REPLY);
}

#[tokio::test(start_paused = true)]
async fn deadline_reply_text() {
    let policy = RetryPolicy { deadline: Some(Duration::from_secs(1)), ..policy(3, 2.0) };
    let agent = TurnOrchestrator::new(ResilientExecutor::new(Hang, policy), Conversation::new());

    let reply = agent.exchange("hello").await;

    assert_eq!(reply.kind, ReplyKind::Failed);
    assert_eq!(reply.text, DEADLINE_EXCEEDED_REPLY);
    assert_eq!(agent.len().await, 2);
}

#[tokio::test(start_paused = true)]
async fn dropped_exchange_commits_nothing() {
    let agent = TurnOrchestrator::new(ResilientExecutor::new(Hang, policy(3, 2.0)), Conversation::new());

    let outcome = tokio::time::timeout(Duration::from_secs(1), agent.exchange("hello")).await;

    assert!(outcome.is_err());
    assert_eq!(agent.len().await, 0);
}

#[tokio::test(start_paused = true)]
async fn deadline_shorter_than_backoff_schedule() {
    let policy = RetryPolicy { deadline: Some(Duration::from_secs(3)), ..policy(3, 2.0) };
    let executor = ResilientExecutor::new(Script::new(vec![Ok(RawResponse::new(503, "loading"))]), policy);
    let started = Instant::now();

    let err = executor.execute("user: hello").await.unwrap_err();

    assert_eq!(err, ExchangeError::DeadlineExceeded(Duration::from_secs(3)));
    assert_eq!(started.elapsed(), Duration::from_secs(3));
    // Attempt 1, sleep 2s, attempt 2, then cut off during the 4s sleep.
    assert_eq!(executor.transport().calls(), 2);
}

#[tokio::test]
async fn zero_attempt_policy_never_calls_transport() {
    let executor = ResilientExecutor::new(Script::new(vec![ok("{}")]), policy(0, 2.0));

    let err = executor.execute("user: hello").await.unwrap_err();

    assert_eq!(err, ExchangeError::RetriesExhausted { attempts: 0, last_status: None });
    assert_eq!(executor.transport().calls(), 0);
}
