//! Restartable periodic timer backing the heartbeat and timeout tickers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::ConnectorError;

/// Callback fired by a [`Timer`].
///
/// A tick returning `Err` aborts the monitored scope: the timer records the
/// error in the scope's [`FaultSlot`], cancels the scope token, and halts its
/// own firing loop. Errors are never stranded inside the detached task.
#[async_trait]
pub trait TimerTask: Send + Sync + 'static {
    async fn tick(&self) -> Result<(), ConnectorError>;
}

/// First error raised by a background timer, read back at scope exit.
///
/// Writes after the first are dropped, so a timeout racing a heartbeat
/// failure yields one deterministic triggering error.
#[derive(Debug, Default)]
pub struct FaultSlot(Mutex<Option<ConnectorError>>);

impl FaultSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, err: ConnectorError) {
        let mut slot = self.0.lock().expect("fault slot poisoned");
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    pub fn take(&self) -> Option<ConnectorError> {
        self.0.lock().expect("fault slot poisoned").take()
    }
}

struct Running {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

/// Fires a [`TimerTask`] every `interval` on its own tokio task.
///
/// `start` is a no-op while already running; `stop` is idempotent and awaits
/// the firing task, so once it returns no tick is running or will run again.
/// `run_now` invokes the task immediately on the caller, out of schedule,
/// without disturbing the periodic schedule.
pub struct Timer {
    interval: Duration,
    task: Arc<dyn TimerTask>,
    scope: CancellationToken,
    fault: Arc<FaultSlot>,
    running: Mutex<Option<Running>>,
}

impl Timer {
    pub fn new(
        interval: Duration,
        task: Arc<dyn TimerTask>,
        scope: CancellationToken,
        fault: Arc<FaultSlot>,
    ) -> Self {
        Self {
            interval,
            task,
            scope,
            fault,
            running: Mutex::new(None),
        }
    }

    /// Begin periodic firing. The first fire happens one interval from now.
    pub fn start(&self) {
        let mut running = self.running.lock().expect("timer state poisoned");
        if running.is_some() {
            return;
        }

        let stop = CancellationToken::new();
        let handle = tokio::spawn(fire_loop(
            self.interval,
            Arc::clone(&self.task),
            self.scope.clone(),
            Arc::clone(&self.fault),
            stop.clone(),
        ));
        *running = Some(Running { stop, handle });
    }

    /// Halt firing and wait for any in-flight tick to finish.
    pub async fn stop(&self) {
        let running = self.running.lock().expect("timer state poisoned").take();
        if let Some(running) = running {
            running.stop.cancel();
            let _ = running.handle.await;
        }
    }

    /// Fire the task once, immediately, on the caller's task.
    pub async fn run_now(&self) -> Result<(), ConnectorError> {
        self.task.tick().await
    }
}

async fn fire_loop(
    interval: Duration,
    task: Arc<dyn TimerTask>,
    scope: CancellationToken,
    fault: Arc<FaultSlot>,
    stop: CancellationToken,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // interval yields its first tick immediately; consume it so the first
    // real fire lands one interval after start
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = task.tick().await {
                    fault.set(err);
                    scope.cancel();
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        fires: AtomicUsize,
        fail_after: Option<usize>,
    }

    impl Counting {
        fn new(fail_after: Option<usize>) -> Arc<Self> {
            Arc::new(Self {
                fires: AtomicUsize::new(0),
                fail_after,
            })
        }

        fn count(&self) -> usize {
            self.fires.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TimerTask for Counting {
        async fn tick(&self) -> Result<(), ConnectorError> {
            let n = self.fires.fetch_add(1, Ordering::SeqCst) + 1;
            match self.fail_after {
                Some(limit) if n > limit => Err(ConnectorError::Validation("tick failed".into())),
                _ => Ok(()),
            }
        }
    }

    fn timer(task: Arc<Counting>, interval_secs: u64) -> (Timer, CancellationToken, Arc<FaultSlot>) {
        let scope = CancellationToken::new();
        let fault = Arc::new(FaultSlot::new());
        (
            Timer::new(
                Duration::from_secs(interval_secs),
                task,
                scope.clone(),
                Arc::clone(&fault),
            ),
            scope,
            fault,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_on_schedule() {
        let task = Counting::new(None);
        let (timer, _scope, _fault) = timer(Arc::clone(&task), 10);

        timer.start();
        time::sleep(Duration::from_secs(35)).await;
        timer.stop().await;

        assert_eq!(task.count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_firing_and_is_idempotent() {
        let task = Counting::new(None);
        let (timer, _scope, _fault) = timer(Arc::clone(&task), 10);

        timer.start();
        time::sleep(Duration::from_secs(15)).await;
        timer.stop().await;
        timer.stop().await;

        let before = task.count();
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(task.count(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let task = Counting::new(None);
        let (timer, _scope, _fault) = timer(Arc::clone(&task), 10);

        timer.start();
        time::sleep(Duration::from_secs(15)).await;
        timer.stop().await;
        assert_eq!(task.count(), 1);

        timer.start();
        time::sleep(Duration::from_secs(15)).await;
        timer.stop().await;
        assert_eq!(task.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_now_does_not_disturb_schedule() {
        let task = Counting::new(None);
        let (timer, _scope, _fault) = timer(Arc::clone(&task), 10);

        timer.start();
        time::sleep(Duration::from_secs(5)).await;
        timer.run_now().await.unwrap();
        assert_eq!(task.count(), 1);

        // the periodic fire still lands at t=10, not t=15
        time::sleep(Duration::from_secs(6)).await;
        timer.stop().await;
        assert_eq!(task.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_error_cancels_scope_and_halts() {
        let task = Counting::new(Some(1));
        let (timer, scope, fault) = timer(Arc::clone(&task), 10);

        timer.start();
        time::sleep(Duration::from_secs(25)).await;

        assert!(scope.is_cancelled());
        assert_eq!(task.count(), 2, "no fire after the failing tick");
        let err = fault.take().expect("fault recorded");
        assert!(matches!(err, ConnectorError::Validation(_)));

        timer.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fault_slot_keeps_first_error() {
        let fault = FaultSlot::new();
        fault.set(ConnectorError::Validation("first".into()));
        fault.set(ConnectorError::Validation("second".into()));
        match fault.take() {
            Some(ConnectorError::Validation(msg)) => assert_eq!(msg, "first"),
            other => panic!("unexpected fault: {other:?}"),
        }
        assert!(fault.take().is_none());
    }
}
