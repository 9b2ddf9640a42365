use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use crate::scrapers::{RateSource, RateStream};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerStatus {
    Idle,
    Running,
    StopRequested,
    Stopped,
}

impl ListenerStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ListenerStatus::Running,
            2 => ListenerStatus::StopRequested,
            3 => ListenerStatus::Stopped,
            _ => ListenerStatus::Idle,
        }
    }
}

const STATUS_BITS: u32 = 8;
const STATUS_MASK: u64 = (1 << STATUS_BITS) - 1;

fn pack(generation: u64, status: ListenerStatus) -> u64 {
    (generation << STATUS_BITS) | status as u64
}

fn generation_of(word: u64) -> u64 {
    word >> STATUS_BITS
}

/// Listener lifecycle shared by every source: `Idle -> Running -> StopRequested -> Stopped`.
///
/// Each opened stream gets a generation number so a stale stream being
/// dropped cannot flip the status of a newer one. Generation and status
/// share one atomic word so every transition is a single compare-and-swap.
#[derive(Debug, Default)]
pub struct ListenerState {
    word: AtomicU64,
}

impl ListenerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ListenerStatus {
        ListenerStatus::from_u8((self.word.load(Ordering::SeqCst) & STATUS_MASK) as u8)
    }

    /// True between stream start and stream exit, including a pending stop.
    pub fn is_running(&self) -> bool {
        matches!(self.status(), ListenerStatus::Running | ListenerStatus::StopRequested)
    }

    pub fn stop_requested(&self) -> bool {
        self.status() == ListenerStatus::StopRequested
    }

    /// Only a running listener can be asked to stop; otherwise a no-op.
    pub fn request_stop(&self) -> bool {
        self.word
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |word| {
                let running = word & STATUS_MASK == ListenerStatus::Running as u64;
                running.then(|| pack(generation_of(word), ListenerStatus::StopRequested))
            })
            .is_ok()
    }

    fn begin(&self) -> u64 {
        let previous = self.word
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |word| {
                Some(pack(generation_of(word) + 1, ListenerStatus::Running))
            })
            .unwrap_or_else(|word| word);
        generation_of(previous) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        generation_of(self.word.load(Ordering::SeqCst)) == generation
    }

    fn finish(&self, generation: u64) {
        let _ = self.word.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |word| {
            (generation_of(word) == generation).then(|| pack(generation, ListenerStatus::Stopped))
        });
    }
}

/// One listener run. Marks the source `Running` on creation and `Stopped`
/// when dropped, so every way a stream can end is covered.
pub struct ListenerRun<S: RateSource + ?Sized> {
    source: Arc<S>,
    generation: u64,
    iterations: u64,
    max_iterations: Option<u64>,
}

impl<S: RateSource + ?Sized> ListenerRun<S> {
    pub fn begin(source: Arc<S>, max_iterations: Option<u64>) -> Self {
        let generation = source.listener_state().begin();
        ListenerRun {
            source,
            generation,
            iterations: 0,
            max_iterations,
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Checked at the top of every iteration.
    pub fn should_exit(&self) -> bool {
        let state = self.source.listener_state();
        if state.stop_requested() || !state.is_current(self.generation) {
            return true;
        }
        matches!(self.max_iterations, Some(max) if self.iterations >= max)
    }

    pub fn record_iteration(&mut self) {
        self.iterations += 1;
    }
}

impl<S: RateSource + ?Sized> Drop for ListenerRun<S> {
    fn drop(&mut self) {
        self.source.listener_state().finish(self.generation);
        tracing::debug!("Listener for {} exited", self.source.source_id());
    }
}

/// Poll-to-stream helper: sleep for `delay`, call `fetch(None)`, yield the
/// batch; repeat until stopped or `max_iterations` batches were produced.
pub fn poll_listener<S>(source: Arc<S>, delay: Duration, max_iterations: Option<u64>) -> RateStream
where
    S: RateSource + ?Sized,
{
    let run = ListenerRun::begin(source, max_iterations);

    stream::unfold(run, move |mut run| async move {
        if run.should_exit() {
            return None;
        }
        tokio::time::sleep(delay).await;
        let batch = run.source().fetch(None).await;
        run.record_iteration();
        Some((batch, run))
    })
    .boxed()
}
