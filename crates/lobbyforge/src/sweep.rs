//! Inactivity sweep.
//!
//! Sessions that stopped talking (a polled client that closed its window, a
//! push socket that died without a close) are logged out once they have
//! been idle for `activity_timeout`. The sweep runs on a fixed interval and
//! skips missed ticks rather than bursting to catch up.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use lobbyforge_protocol::UserId;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::Engine;

impl Engine {
    /// Logs out every session idle for at least `activity_timeout` as of
    /// `now`. A failing logout is reported and the sweep moves on.
    pub fn sweep_inactive(&self, now: Instant) -> Vec<UserId> {
        let timeout = self.config.activity_timeout;
        let mut evicted = Vec::new();

        for session in self.directory.enumerate_all(false) {
            let idle = session.idle_for(now);
            if idle < timeout {
                continue;
            }
            let user_id = session.id();
            match catch_unwind(AssertUnwindSafe(|| self.logout(&session))) {
                Ok(true) => {
                    info!(%user_id, idle_secs = idle.as_secs(), "session timed out");
                    evicted.push(user_id);
                }
                // Already gone, e.g. a sub-session logged out with its primary.
                Ok(false) => {}
                Err(_) => warn!(%user_id, "logout panicked during sweep"),
            }
        }

        if !evicted.is_empty() {
            debug!(count = evicted.len(), "inactivity sweep finished");
        }
        evicted
    }
}

/// Runs [`Engine::sweep_inactive`] every `sweep_interval` until the
/// returned task is aborted.
pub fn spawn_timeout_sweep(engine: Arc<Engine>) -> JoinHandle<()> {
    let period = engine.config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; nobody can be idle yet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            engine.sweep_inactive(Instant::now());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use lobbyforge_protocol::Privileges;
    use lobbyforge_session::{Delivery, UserIdentity};

    use crate::EngineConfig;

    fn engine_with_timeout(timeout: Duration) -> Engine {
        let config = EngineConfig {
            activity_timeout: timeout,
            sweep_interval: Duration::from_millis(50),
            ..EngineConfig::default()
        };
        Engine::builder().config(config).build()
    }

    #[test]
    fn test_sweep_inactive_evicts_idle_sessions() {
        let engine = engine_with_timeout(Duration::from_secs(20));
        engine.connect(
            UserIdentity::new(UserId(1000), "Alice", Privileges::NORMAL),
            Delivery::polled(),
        );

        let later = Instant::now() + Duration::from_secs(30);
        assert_eq!(engine.sweep_inactive(later), vec![UserId(1000)]);
        assert!(engine.directory().is_empty());
    }

    #[test]
    fn test_sweep_inactive_keeps_active_sessions() {
        let engine = engine_with_timeout(Duration::from_secs(20));
        engine.connect(
            UserIdentity::new(UserId(1000), "Alice", Privileges::NORMAL),
            Delivery::polled(),
        );

        assert!(engine.sweep_inactive(Instant::now()).is_empty());
        assert_eq!(engine.directory().len(), 1);
    }

    #[test]
    fn test_sweep_inactive_primary_takes_sub_sessions() {
        let engine = engine_with_timeout(Duration::from_secs(20));
        engine.connect(
            UserIdentity::new(UserId(1000), "Alice", Privileges::NORMAL),
            Delivery::polled(),
        );
        let mut window = UserIdentity::new(UserId(1000), "Alice", Privileges::NORMAL);
        window.tournament_client = true;
        engine.connect(window, Delivery::polled());

        let later = Instant::now() + Duration::from_secs(30);
        let evicted = engine.sweep_inactive(later);
        assert!(evicted.contains(&UserId(1000)));
        assert!(engine.list_sessions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_timeout_sweep_evicts_in_background() {
        let engine = Arc::new(engine_with_timeout(Duration::ZERO));
        engine.connect(
            UserIdentity::new(UserId(1000), "Alice", Privileges::NORMAL),
            Delivery::polled(),
        );

        let handle = spawn_timeout_sweep(Arc::clone(&engine));
        time::sleep(Duration::from_millis(120)).await;
        assert!(engine.directory().is_empty());
        handle.abort();
    }
}
