//! In-process fakes for the backend session and text-generation seams.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{AssistantError, AssistantResult};
use crate::graph_session::{GraphSession, Params, Row, SessionFactory, TargetConfig, TargetConfigs};
use crate::llm::TextGenerator;
use crate::target::DatastoreTarget;

pub fn sample_targets() -> TargetConfigs {
    let config = |target: DatastoreTarget, uri: &str| TargetConfig {
        target,
        command: "fake-graph-server".to_string(),
        args: vec![],
        uri: uri.to_string(),
        username: "neo4j".to_string(),
        password: "secret".to_string(),
        database: None,
        extra_env: HashMap::new(),
    };
    TargetConfigs {
        primary: config(DatastoreTarget::Primary, "neo4j://primary:7687"),
        workspace: config(DatastoreTarget::Workspace, "neo4j://workspace:7687"),
    }
}

pub fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Read,
    Write,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub target: DatastoreTarget,
    pub kind: CallKind,
    pub query: String,
    pub params: Params,
}

type Responder = Arc<dyn Fn(&RecordedCall) -> AssistantResult<Vec<Row>> + Send + Sync>;

/// Factory whose sessions answer from a scripted responder and record every
/// call. Tracks how many sessions are alive at once.
pub struct FakeSessionFactory {
    connects: AtomicUsize,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
    connect_delay: Duration,
    call_delay_ms: Arc<AtomicU64>,
    failing: Mutex<HashSet<DatastoreTarget>>,
    responder: Arc<Mutex<Responder>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl FakeSessionFactory {
    pub fn new() -> Arc<Self> {
        Self::with_connect_delay(Duration::ZERO)
    }

    pub fn with_connect_delay(connect_delay: Duration) -> Arc<Self> {
        let responder: Responder = Arc::new(|_: &RecordedCall| Ok(Vec::new()));
        Arc::new(Self {
            connects: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: Arc::new(AtomicUsize::new(0)),
            connect_delay,
            call_delay_ms: Arc::new(AtomicU64::new(0)),
            failing: Mutex::new(HashSet::new()),
            responder: Arc::new(Mutex::new(responder)),
            calls: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn respond<F>(&self, responder: F)
    where
        F: Fn(&RecordedCall) -> AssistantResult<Vec<Row>> + Send + Sync + 'static,
    {
        let responder: Responder = Arc::new(responder);
        *self.responder.lock().unwrap() = responder;
    }

    /// Every read and write on every session sleeps this long before
    /// answering.
    pub fn set_call_delay(&self, delay: Duration) {
        self.call_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_connect_to(&self, target: DatastoreTarget) {
        self.failing.lock().unwrap().insert(target);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live_sessions(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.kind == CallKind::Write).collect()
    }
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn connect(&self, config: &TargetConfig) -> anyhow::Result<Arc<dyn GraphSession>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if self.failing.lock().unwrap().contains(&config.target) {
            anyhow::bail!("connection refused by {}", config.uri);
        }

        let now_live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(now_live, Ordering::SeqCst);

        Ok(Arc::new(FakeSession {
            target: config.target,
            closed: Mutex::new(false),
            live: self.live.clone(),
            call_delay_ms: self.call_delay_ms.clone(),
            responder: self.responder.clone(),
            calls: self.calls.clone(),
        }))
    }
}

struct FakeSession {
    target: DatastoreTarget,
    closed: Mutex<bool>,
    live: Arc<AtomicUsize>,
    call_delay_ms: Arc<AtomicU64>,
    responder: Arc<Mutex<Responder>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl FakeSession {
    async fn answer(&self, kind: CallKind, query: &str, params: &Params) -> AssistantResult<Vec<Row>> {
        let delay = self.call_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if *self.closed.lock().unwrap() {
            return Err(AssistantError::Backend("session closed".to_string()));
        }
        let call = RecordedCall {
            target: self.target,
            kind,
            query: query.to_string(),
            params: params.clone(),
        };
        self.calls.lock().unwrap().push(call.clone());
        let responder = self.responder.lock().unwrap().clone();
        responder(&call)
    }
}

#[async_trait]
impl GraphSession for FakeSession {
    fn target(&self) -> DatastoreTarget {
        self.target
    }

    async fn read(&self, query: &str, params: &Params) -> AssistantResult<Vec<Row>> {
        self.answer(CallKind::Read, query, params).await
    }

    async fn write(&self, query: &str, params: &Params) -> AssistantResult<Vec<Row>> {
        self.answer(CallKind::Write, query, params).await
    }

    async fn close(&self) -> anyhow::Result<()> {
        let mut closed = self.closed.lock().unwrap();
        if !*closed {
            *closed = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Text generator that returns queued answers in order and records every
/// `(system, user)` prompt it receives.
#[derive(Default)]
pub struct ScriptedGenerator {
    answers: Mutex<Vec<Option<String>>>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(answers: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        let mut answers: Vec<Option<String>> = answers.into_iter().map(|a| a.map(Into::into)).collect();
        answers.reverse();
        Arc::new(Self {
            answers: Mutex::new(answers),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, system: &str, user: &str) -> AssistantResult<Option<String>> {
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        Ok(self.answers.lock().unwrap().pop().flatten())
    }
}
