pub mod http;
pub mod pacing;
pub mod pool;
pub mod random;
pub mod slow_body;
pub mod slowloris;
pub mod target;

pub use slow_body::SlowBodyRead;
pub use slowloris::Slowloris;
pub use target::Target;

use crate::error::Result;
use crate::telemetry::{AttemptEvents, EventHandler, WithEventAttrs};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::{CancellationToken, DropGuard};
use turtle_common::{AttackConfig, Config};

/// Event handler handed to one worker attempt, stamped with its worker id.
pub type WorkerEvents = AttemptEvents<WithEventAttrs<Arc<dyn EventHandler>>>;

pub(crate) fn worker_events(events: &Arc<dyn EventHandler>, worker_id: usize) -> WorkerEvents {
    AttemptEvents::new(WithEventAttrs::worker(Arc::clone(events), worker_id))
}

/// One of the supported attacks, ready to run.
#[derive(Debug, Clone)]
pub enum Attack {
    Slowloris(Slowloris),
    SlowBodyRead(SlowBodyRead),
}

impl Attack {
    /// Builds the attack described by `config`, reporting to `events`.
    pub fn from_config(config: &Config, events: Arc<dyn EventHandler>) -> Result<Self> {
        let target = Target::from_config(&config.target)?.with_events(events);
        match &config.attack {
            AttackConfig::Slowloris(c) => Ok(Attack::Slowloris(Slowloris::from_config(target, c)?)),
            AttackConfig::SlowBodyRead(c) => {
                Ok(Attack::SlowBodyRead(SlowBodyRead::from_config(target, c)?))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Attack::Slowloris(_) => "slowloris",
            Attack::SlowBodyRead(_) => "slow-body-read",
        }
    }

    pub fn target(&self) -> &Target {
        match self {
            Attack::Slowloris(a) => &a.target,
            Attack::SlowBodyRead(a) => &a.target,
        }
    }

    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        match self {
            Attack::Slowloris(a) => a.run(cancel).await,
            Attack::SlowBodyRead(a) => a.run(cancel).await,
        }
    }
}

/// A child of `parent` that is also cancelled once `duration` has elapsed.
/// The guard cancels it when dropped, which also retires the timer task.
pub(crate) fn deadline_token(
    parent: &CancellationToken,
    duration: Duration,
) -> (CancellationToken, DropGuard) {
    let deadline = parent.child_token();

    let timer = deadline.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(duration) => timer.cancel(),
            _ = timer.cancelled() => {}
        }
    });

    (deadline.clone(), deadline.drop_guard())
}
