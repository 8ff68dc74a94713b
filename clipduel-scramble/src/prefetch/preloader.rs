//! One-shot asset preloader
//!
//! Opens a decode handle for a moment, watches its status stream and fires a
//! single readiness callback. The "has it fired" state belongs to the
//! preloader task; nobody else can observe or reset it.
//!
//! Teardown is dropping the preloader: the watcher task is aborted, which
//! drops its status-stream receiver, so a late readiness event can never
//! reach the callback of a superseded preload.

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use clipduel_common::{Moment, MomentId};

use super::{PreloadPolicy, Readiness};
use crate::media::{MediaBackend, MediaEvent, MediaStatus, SharedHandle};

/// A preload in flight (or finished) for one moment
pub struct AssetPreloader {
    moment_id: MomentId,
    handle: SharedHandle,
    readiness: watch::Receiver<Readiness>,
    task: JoinHandle<()>,
}

impl AssetPreloader {
    /// Begin preloading `moment`
    ///
    /// Returns `None` when there is nothing to preload. `on_ready` runs at
    /// most once, from the preloader's own task, and never after the
    /// preloader has been dropped.
    pub fn start<F>(
        backend: &dyn MediaBackend,
        moment: Option<&Moment>,
        policy: &PreloadPolicy,
        on_ready: F,
    ) -> Option<Self>
    where
        F: FnOnce(Readiness) + Send + 'static,
    {
        let Some(moment) = moment else {
            debug!("Preload requested without a moment, ignoring");
            return None;
        };

        let handle = backend.create_handle(policy.params);
        // Subscribe before loading so the ready transition cannot be missed
        let events = handle.subscribe();
        handle.load(&moment.video_url);
        debug!("Preloading moment {} from {}", moment.id, moment.video_url);

        let (tx, rx) = watch::channel(Readiness::Pending);
        let task = tokio::spawn(watch_readiness(
            handle.clone(),
            events,
            *policy,
            moment.id.clone(),
            tx,
            on_ready,
        ));

        Some(Self {
            moment_id: moment.id.clone(),
            handle,
            readiness: rx,
            task,
        })
    }

    pub fn moment_id(&self) -> &MomentId {
        &self.moment_id
    }

    pub fn readiness(&self) -> Readiness {
        *self.readiness.borrow()
    }

    /// Hand the decoded handle to a presentation slot
    ///
    /// Only a handle that actually reported playable is worth adopting; an
    /// assumed-ready or pending one is dropped and the caller loads afresh.
    pub fn take_handle(self) -> Option<SharedHandle> {
        match self.readiness() {
            Readiness::Ready if self.handle.status() == MediaStatus::ReadyToPlay => {
                Some(self.handle.clone())
            }
            _ => None,
        }
    }
}

impl Drop for AssetPreloader {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn watch_readiness<F>(
    handle: SharedHandle,
    mut events: broadcast::Receiver<MediaEvent>,
    policy: PreloadPolicy,
    moment_id: MomentId,
    tx: watch::Sender<Readiness>,
    on_ready: F,
) where
    F: FnOnce(Readiness) + Send + 'static,
{
    let wait = wait_until_playable(&handle, &mut events, &policy, &moment_id);
    let readiness = match policy.readiness_timeout {
        Some(limit) => match tokio::time::timeout(limit, wait).await {
            Ok(readiness) => readiness,
            Err(_) => {
                warn!(
                    "No readiness for moment {} within {:?}, assuming ready",
                    moment_id, limit
                );
                Readiness::Assumed
            }
        },
        None => wait.await,
    };

    // Done listening; unsubscribe before signalling
    drop(events);
    info!("Moment {} preload signalled {:?}", moment_id, readiness);
    tx.send_replace(readiness);
    on_ready(readiness);
}

async fn wait_until_playable(
    handle: &SharedHandle,
    events: &mut broadcast::Receiver<MediaEvent>,
    policy: &PreloadPolicy,
    moment_id: &MomentId,
) -> Readiness {
    loop {
        match events.recv().await {
            Ok(MediaEvent::StatusChanged {
                status: MediaStatus::ReadyToPlay,
                ..
            }) => return Readiness::Ready,
            Ok(MediaEvent::StatusChanged {
                status: MediaStatus::Error,
                error,
            }) => {
                warn!(
                    "Preload of moment {} failed ({}), assuming ready in {:?}",
                    moment_id,
                    error.as_deref().unwrap_or("unknown error"),
                    policy.error_grace
                );
                sleep(policy.error_grace).await;
                return Readiness::Assumed;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                debug!("Preload listener lagged by {} events", skipped);
                if handle.status() == MediaStatus::ReadyToPlay {
                    return Readiness::Ready;
                }
            }
            Err(RecvError::Closed) => {
                warn!("Status stream for moment {} closed", moment_id);
                sleep(policy.error_grace).await;
                return Readiness::Assumed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{ClipProfile, LoadBehavior, SimulatedMediaBackend};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    fn backend() -> SimulatedMediaBackend {
        SimulatedMediaBackend::new(ClipProfile {
            load_latency: Duration::from_millis(300),
            duration: Duration::from_secs(5),
            behavior: LoadBehavior::Ready,
        })
    }

    fn recorder() -> (
        impl FnOnce(Readiness) + Send + 'static,
        mpsc::UnboundedReceiver<Readiness>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            move |readiness| {
                let _ = tx.send(readiness);
            },
            rx,
        )
    }

    fn lead_policy() -> PreloadPolicy {
        PreloadPolicy::lead(1.1, Duration::from_secs(3))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_signal_fires_once() {
        let backend = backend();
        let moment = Moment::new(1, "clip-1", 1200.0);
        let (on_ready, mut rx) = recorder();

        let preloader =
            AssetPreloader::start(&backend, Some(&moment), &lead_policy(), on_ready).unwrap();
        assert_eq!(preloader.readiness(), Readiness::Pending);

        assert_eq!(rx.recv().await, Some(Readiness::Ready));
        assert_eq!(rx.recv().await, None);
        assert_eq!(preloader.readiness(), Readiness::Ready);
        assert_eq!(backend.loads(), vec![("clip-1".to_string(), true)]);

        let handle = preloader.take_handle().expect("ready handle is adoptable");
        assert_eq!(handle.source().as_deref(), Some("clip-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_moment_is_a_no_op() {
        let backend = backend();
        let (on_ready, _rx) = recorder();

        assert!(AssetPreloader::start(&backend, None, &lead_policy(), on_ready).is_none());
        assert_eq!(backend.handles_created(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_assumes_ready_after_grace() {
        let backend = backend();
        backend.set_profile(
            "broken",
            ClipProfile {
                load_latency: Duration::from_millis(300),
                duration: Duration::from_secs(5),
                behavior: LoadBehavior::Fail,
            },
        );
        let moment = Moment::new(2, "broken", 1200.0);
        let (on_ready, mut rx) = recorder();
        let started = Instant::now();

        let preloader =
            AssetPreloader::start(&backend, Some(&moment), &lead_policy(), on_ready).unwrap();

        assert_eq!(rx.recv().await, Some(Readiness::Assumed));
        assert!(started.elapsed() >= Duration::from_millis(3_300));
        assert!(preloader.take_handle().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_decoder_times_out_for_trailing_policy() {
        let backend = backend();
        backend.set_profile(
            "silent",
            ClipProfile {
                load_latency: Duration::from_millis(300),
                duration: Duration::from_secs(5),
                behavior: LoadBehavior::Silent,
            },
        );
        let moment = Moment::new(3, "silent", 1200.0);
        let (on_ready, mut rx) = recorder();
        let policy = PreloadPolicy::trailing(1.1, Duration::from_secs(3), Duration::from_secs(2));
        let started = Instant::now();

        let _preloader = AssetPreloader::start(&backend, Some(&moment), &policy, on_ready).unwrap();

        assert_eq!(rx.recv().await, Some(Readiness::Assumed));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(2) && waited < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_preloader_never_signals() {
        let backend = backend();
        let moment = Moment::new(4, "clip-4", 1200.0);
        let (on_ready, mut rx) = recorder();

        let preloader =
            AssetPreloader::start(&backend, Some(&moment), &lead_policy(), on_ready).unwrap();
        drop(preloader);

        tokio::time::sleep(Duration::from_secs(10)).await;
        // Callback (and its sender) dropped with the aborted task
        assert_eq!(rx.recv().await, None);
    }
}
