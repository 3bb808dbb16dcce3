//! Connection Manager
//!
//! Owns the single live graph backend session and switches it between the
//! two configured datastore targets. Concurrent switch requests coalesce on
//! one in-flight switch: callers that arrive while a switch is pending await
//! it and then re-check, so two sessions are never alive at once.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::session_trait::*;
use crate::error::{AssistantError, AssistantResult};
use crate::target::{ActiveTarget, DatastoreTarget};

type PendingSwitch = Shared<BoxFuture<'static, Result<(), String>>>;

struct ActiveSession {
    target: DatastoreTarget,
    session: Arc<dyn GraphSession>,
}

#[derive(Default)]
struct ManagerState {
    session: Option<ActiveSession>,
    /// Coalescing token; present while a switch is in flight.
    pending: Option<(DatastoreTarget, PendingSwitch)>,
}

pub struct ConnectionManager {
    factory: Arc<dyn SessionFactory>,
    targets: Arc<TargetConfigs>,
    state: Arc<Mutex<ManagerState>>,
    active: ActiveTarget,
}

impl ConnectionManager {
    pub fn new(factory: Arc<dyn SessionFactory>, targets: TargetConfigs) -> Self {
        Self {
            factory,
            targets: Arc::new(targets),
            state: Arc::new(Mutex::new(ManagerState::default())),
            active: ActiveTarget::new(),
        }
    }

    fn lock_state(state: &Mutex<ManagerState>) -> MutexGuard<'_, ManagerState> {
        state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Presently active target, or `None` before the first connect and after
    /// shutdown.
    pub fn current_target(&self) -> Option<DatastoreTarget> {
        self.active.get()
    }

    /// Makes `target` the live backend. Idempotent; safe under concurrency.
    pub async fn ensure_active(&self, target: DatastoreTarget) -> AssistantResult<()> {
        self.acquire(target).await.map(|_| ())
    }

    /// Like [`ensure_active`](Self::ensure_active), but hands back the session
    /// that was live for `target` at that moment. Work issued through the
    /// returned handle can never land on the other target; if a later switch
    /// tears the session down, calls on it fail instead.
    pub async fn acquire(&self, target: DatastoreTarget) -> AssistantResult<Arc<dyn GraphSession>> {
        loop {
            let (switch_target, pending) = {
                let mut state = Self::lock_state(&self.state);
                match &state.pending {
                    Some((pending_target, pending)) => (*pending_target, pending.clone()),
                    None => {
                        if let Some(active) = state.session.as_ref().filter(|s| s.target == target) {
                            return Ok(active.session.clone());
                        }
                        let pending = self.begin_switch(&mut state, target);
                        (target, pending)
                    }
                }
            };

            match pending.await {
                Ok(()) => continue,
                Err(reason) if switch_target == target => {
                    return Err(AssistantError::ConnectFailed { target, reason });
                }
                // Someone else's switch failed; ours still has to happen.
                Err(_) => continue,
            }
        }
    }

    /// Spawns the switch so it completes even if every caller goes away.
    /// Must be called with the state lock held.
    fn begin_switch(&self, state: &mut ManagerState, target: DatastoreTarget) -> PendingSwitch {
        info!("Switching graph backend to {} target", target);

        let shared_state = self.state.clone();
        let factory = self.factory.clone();
        let config = self.targets.get(target).clone();
        let active = self.active.clone();

        let task = tokio::spawn(async move {
            let previous = Self::lock_state(&shared_state).session.take();
            let previous_target = previous.as_ref().map(|p| p.target);
            active.clear();
            if let Some(previous) = previous {
                debug!("Tearing down {} session", previous.target);
                if let Err(e) = previous.session.close().await {
                    warn!("Ignoring teardown error for {} session: {:#}", previous.target, e);
                }
            }

            let connected = factory.connect(&config).await;

            let mut state = Self::lock_state(&shared_state);
            state.pending = None;
            match connected {
                Ok(session) => {
                    state.session = Some(ActiveSession { target, session });
                    active.set(target);
                    match previous_target {
                        Some(old) => info!("🔄 Switched datastore target from {} → {}", old, target),
                        None => info!("🔄 Connected to datastore target {}", target),
                    }
                    crate::metrics::inc_target_switch(target.as_str());
                    Ok(())
                }
                Err(e) => {
                    warn!("Connect to {} target failed: {:#}", target, e);
                    Err(format!("{:#}", e))
                }
            }
        });

        let pending = async move {
            task.await
                .unwrap_or_else(|e| Err(format!("switch task aborted: {}", e)))
        }
        .boxed()
        .shared();

        state.pending = Some((target, pending.clone()));
        pending
    }

    /// The live session, whichever target it belongs to.
    pub fn current_session(&self) -> AssistantResult<Arc<dyn GraphSession>> {
        Self::lock_state(&self.state)
            .session
            .as_ref()
            .map(|s| s.session.clone())
            .ok_or(AssistantError::NotConnected)
    }

    /// The live session, provided it belongs to `required`. Never switches.
    pub fn session_for(&self, required: DatastoreTarget) -> AssistantResult<Arc<dyn GraphSession>> {
        let state = Self::lock_state(&self.state);
        match state.session.as_ref() {
            Some(active) if active.target == required && state.pending.is_none() => Ok(active.session.clone()),
            other => Err(AssistantError::WrongTarget {
                active: other.map(|s| s.target),
                required,
            }),
        }
    }

    pub async fn read(&self, query: &str, params: &Params) -> AssistantResult<Vec<Row>> {
        self.current_session()?.read(query, params).await
    }

    pub async fn write(&self, query: &str, params: &Params) -> AssistantResult<Vec<Row>> {
        self.current_session()?.write(query, params).await
    }

    /// Tears down the live session, if any. Waits out an in-flight switch
    /// first so the session it creates is not leaked.
    pub async fn shutdown(&self) {
        loop {
            let pending = Self::lock_state(&self.state).pending.as_ref().map(|(_, p)| p.clone());
            match pending {
                Some(pending) => {
                    let _ = pending.await;
                }
                None => break,
            }
        }

        let previous = Self::lock_state(&self.state).session.take();
        self.active.clear();
        if let Some(previous) = previous {
            info!("Shutting down {} session", previous.target);
            if let Err(e) = previous.session.close().await {
                warn!("Ignoring teardown error for {} session: {:#}", previous.target, e);
            }
        }
    }
}
