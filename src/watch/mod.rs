//! Decides when to look for a promo field.
//!
//! Three trigger sources feed one debounced check: a one-shot check shortly
//! after load, a periodic re-check, and DOM mutations. The first check that
//! surfaces a result ends the watch; so does the overall timeout.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info};

/// Input attributes whose changes may reveal a promo field
pub const WATCHED_ATTRIBUTES: &[&str] = &["style", "class", "type", "value", "placeholder"];

/// Change notification delivered by the host page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomMutation {
    ChildList { added: usize, removed: usize },
    Attribute { tag: String, name: String },
}

impl DomMutation {
    /// Insertions, or a watched attribute change on an `input`
    pub fn triggers_check(&self) -> bool {
        match self {
            Self::ChildList { added, .. } => *added > 0,
            Self::Attribute { tag, name } => {
                tag.eq_ignore_ascii_case("input")
                    && WATCHED_ATTRIBUTES
                        .iter()
                        .any(|watched| watched.eq_ignore_ascii_case(name))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub initial_delay: Duration,
    pub poll_interval: Duration,
    /// Triggers closer together than this collapse into one check
    pub quiet_window: Duration,
    /// Give up when nothing was found by then
    pub timeout: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            quiet_window: Duration::from_millis(250),
            timeout: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    /// A result was surfaced; no further checks run for this page load
    Shown,
    TimedOut,
    Stopped,
}

impl WatchState {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Shown | Self::TimedOut | Self::Stopped)
    }
}

/// Why a check was scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Initial,
    Poll,
    Mutation,
}

pub struct WatchScheduler {
    config: WatchConfig,
    state: watch::Sender<WatchState>,
    task: Option<JoinHandle<()>>,
}

impl WatchScheduler {
    pub fn new(config: WatchConfig) -> Self {
        let (state, _) = watch::channel(WatchState::Idle);
        Self {
            config,
            state,
            task: None,
        }
    }

    pub fn state(&self) -> WatchState {
        *self.state.borrow()
    }

    pub fn has_shown(&self) -> bool {
        self.state() == WatchState::Shown
    }

    /// Start watching.
    ///
    /// `check` runs at most once per quiet window and never overlaps itself;
    /// it returns `true` once it has shown a result. A scheduler that already
    /// ran is not restarted.
    pub fn start<F, Fut>(&mut self, mutations: mpsc::UnboundedReceiver<DomMutation>, check: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        if self.state() != WatchState::Idle {
            debug!("Watch already started ({:?}), ignoring start", self.state());
            return;
        }

        self.state.send_replace(WatchState::Watching);
        let state = self.state.clone();
        let config = self.config.clone();
        self.task = Some(tokio::spawn(async move {
            let outcome = run(config, mutations, check).await;
            // Only a running watch may finish; a stop() in between wins
            state.send_if_modified(|current| {
                if *current == WatchState::Watching {
                    *current = outcome;
                    true
                } else {
                    false
                }
            });
        }));
    }

    /// Cancel the watch; a check in progress is abandoned
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.state.send_if_modified(|current| {
            if current.is_finished() {
                false
            } else {
                *current = WatchState::Stopped;
                true
            }
        });
    }

    /// Resolve once the watch has finished, with its final state.
    ///
    /// A scheduler that was never started resolves at once with `Idle`.
    pub async fn finished(&self) -> WatchState {
        if self.state() == WatchState::Idle {
            return WatchState::Idle;
        }
        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| state.is_finished()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }
}

impl Drop for WatchScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run<F, Fut>(
    config: WatchConfig,
    mut mutations: mpsc::UnboundedReceiver<DomMutation>,
    mut check: F,
) -> WatchState
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let deadline = sleep_until(start + config.timeout);
    let initial = sleep(config.initial_delay);
    tokio::pin!(deadline, initial);

    let mut poll = tokio::time::interval_at(start + config.poll_interval, config.poll_interval);
    let mut initial_pending = true;
    let mut mutations_open = true;
    let mut pending: Option<Instant> = None;

    info!("Watching for a promo field");

    loop {
        let trigger = tokio::select! {
            () = &mut deadline => {
                info!("No promo field after {:?}, giving up", config.timeout);
                return WatchState::TimedOut;
            }
            () = sleep_until(pending.unwrap_or(start)), if pending.is_some() => {
                pending = None;
                if check().await {
                    info!("Promo field result shown, watch finished");
                    return WatchState::Shown;
                }
                continue;
            }
            () = &mut initial, if initial_pending => {
                initial_pending = false;
                Trigger::Initial
            }
            _ = poll.tick() => Trigger::Poll,
            mutation = mutations.recv(), if mutations_open => match mutation {
                Some(mutation) if mutation.triggers_check() => Trigger::Mutation,
                Some(_) => continue,
                None => {
                    mutations_open = false;
                    continue;
                }
            },
        };

        // Every trigger restarts the quiet window
        debug!("{:?} trigger, check deferred {:?}", trigger, config.quiet_window);
        pending = Some(Instant::now() + config.quiet_window);
    }
}
