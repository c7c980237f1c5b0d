use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::Stream;

use crate::ConductorError;

/// Positions selected from an upstream stream: `start, start+step, ...`
/// below `stop` (unbounded when `None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceSpec {
    start: usize,
    stop: Option<usize>,
    step: usize,
}

impl SliceSpec {
    /// Bounds are unsigned by construction; `step` must be positive.
    pub fn new(start: usize, stop: Option<usize>, step: usize) -> Result<Self, ConductorError> {
        if step == 0 {
            return Err(ConductorError::InvalidSlice("step must be a positive integer".into()));
        }
        Ok(Self { start, stop, step })
    }

    /// First `n` elements (`stop = n`, `step = 1`).
    pub fn take(n: usize) -> Self {
        Self { start: 0, stop: Some(n), step: 1 }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn stop(&self) -> Option<usize> {
        self.stop
    }

    pub fn step(&self) -> usize {
        self.step
    }

    fn first(&self) -> Option<usize> {
        self.bounded(self.start)
    }

    fn after(&self, pos: usize) -> Option<usize> {
        pos.checked_add(self.step).and_then(|next| self.bounded(next))
    }

    fn bounded(&self, pos: usize) -> Option<usize> {
        match self.stop {
            Some(stop) if pos >= stop => None,
            _ => Some(pos),
        }
    }
}

impl Default for SliceSpec {
    fn default() -> Self {
        Self { start: 0, stop: None, step: 1 }
    }
}

/// Yields only the selected positions of a fallible upstream stream.
///
/// Skipped elements are still pulled (and so still pay the upstream's
/// pacing delay); only their values are dropped. Once the last selected
/// position has been yielded the upstream is not polled again. Upstream
/// errors are passed through at any position and end the stream.
#[derive(Debug)]
pub struct Slice<S> {
    inner: S,
    spec: SliceSpec,
    /// Upstream position of the next element to be pulled.
    pos: usize,
    /// Next position to yield; `None` once the slice is complete.
    target: Option<usize>,
    done: bool,
}

impl<S> Slice<S> {
    pub fn new(inner: S, spec: SliceSpec) -> Self {
        Self { inner, spec, pos: 0, target: spec.first(), done: false }
    }

    /// Upstream elements pulled so far.
    pub fn pulled(&self) -> usize {
        self.pos
    }
}

impl<S, T, E> Stream for Slice<S>
where
    S: Stream<Item = Result<T, E>> + Unpin,
{
    type Item = Result<T, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.done {
                return Poll::Ready(None);
            }
            let Some(target) = this.target else {
                this.done = true;
                return Poll::Ready(None);
            };

            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                None => {
                    this.done = true;
                    return Poll::Ready(None);
                }
                Some(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Some(Ok(item)) => {
                    let pos = this.pos;
                    this.pos += 1;
                    if pos == target {
                        this.target = this.spec.after(target);
                        return Poll::Ready(Some(Ok(item)));
                    }
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done || self.target.is_none() {
            return (0, Some(0));
        }
        let (_, upper) = self.inner.size_hint();
        let remaining_by_stop = self
            .spec
            .stop
            .zip(self.target)
            .map(|(stop, target)| (stop - target).div_ceil(self.spec.step));
        let upper = match (upper, remaining_by_stop) {
            (Some(u), Some(r)) => Some(u.min(r)),
            (u, r) => u.or(r),
        };
        (0, upper)
    }
}

pub trait SliceExt: Stream + Sized {
    /// `itertools.islice`-style selection over a fallible stream.
    fn islice(self, spec: SliceSpec) -> Slice<Self> {
        Slice::new(self, spec)
    }
}

impl<S: Stream> SliceExt for S {}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration;

    use futures::{StreamExt, stream};
    use tokio::time::Instant;

    use super::*;

    fn numbers(n: u32) -> impl Stream<Item = Result<u32, String>> + Unpin {
        stream::iter((0..n).map(Ok))
    }

    async fn collect<S: Stream<Item = Result<u32, String>> + Unpin>(s: Slice<S>) -> Vec<u32> {
        s.map(|r| r.unwrap()).collect().await
    }

    #[tokio::test]
    async fn slice_positions() {
        let spec = |start, stop, step| SliceSpec::new(start, stop, step).unwrap();
        assert_eq!(collect(numbers(7).islice(spec(0, Some(2), 1))).await, [0, 1]);
        assert_eq!(collect(numbers(7).islice(spec(2, Some(4), 1))).await, [2, 3]);
        assert_eq!(collect(numbers(7).islice(spec(2, None, 1))).await, [2, 3, 4, 5, 6]);
        assert_eq!(collect(numbers(7).islice(spec(0, None, 2))).await, [0, 2, 4, 6]);
        assert_eq!(collect(numbers(7).islice(spec(1, Some(6), 2))).await, [1, 3, 5]);
        assert_eq!(collect(numbers(7).islice(SliceSpec::default())).await, [0, 1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn empty_slices() {
        assert!(collect(numbers(5).islice(SliceSpec::take(0))).await.is_empty());
        assert!(collect(numbers(5).islice(SliceSpec::new(4, Some(2), 1).unwrap())).await.is_empty());
        assert!(collect(numbers(2).islice(SliceSpec::new(5, None, 1).unwrap())).await.is_empty());
    }

    #[tokio::test]
    async fn take_does_not_pull_past_stop() {
        let pulled = Cell::new(0);
        let upstream = numbers(10).inspect(|_| pulled.set(pulled.get() + 1));
        let mut slice = upstream.islice(SliceSpec::take(3));

        let mut got = Vec::new();
        while let Some(item) = slice.next().await {
            got.push(item.unwrap());
        }
        assert_eq!(got, [0, 1, 2]);
        assert_eq!(pulled.get(), 3);
        assert_eq!(slice.pulled(), 3);

        // polling again after completion still does not touch upstream
        assert!(slice.next().await.is_none());
        assert_eq!(pulled.get(), 3);
    }

    #[tokio::test]
    async fn take_zero_pulls_nothing() {
        let pulled = Cell::new(0);
        let mut slice = numbers(3).inspect(|_| pulled.set(pulled.get() + 1)).islice(SliceSpec::take(0));
        assert!(slice.next().await.is_none());
        assert_eq!(pulled.get(), 0);
    }

    #[tokio::test]
    async fn shorter_upstream_ends_first() {
        assert_eq!(collect(numbers(2).islice(SliceSpec::take(5))).await, [0, 1]);
    }

    #[tokio::test]
    async fn errors_pass_through_even_when_skipped() {
        let upstream = stream::iter(vec![Ok(0u32), Err("boom".to_string()), Ok(2)]);
        let mut slice = upstream.islice(SliceSpec::new(2, None, 1).unwrap());
        assert_eq!(slice.next().await, Some(Err("boom".to_string())));
        assert_eq!(slice.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_elements_still_pay_upstream_delay() {
        let upstream = Box::pin(stream::iter(0u32..6).then(|i| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, String>(i)
        }));
        let mut slice = upstream.islice(SliceSpec::new(0, Some(6), 3).unwrap());

        let start = Instant::now();
        assert_eq!(slice.next().await, Some(Ok(0)));
        let first = start.elapsed();
        assert_eq!(slice.next().await, Some(Ok(3)));
        let second = start.elapsed();
        assert!(first >= Duration::from_millis(100) && first < Duration::from_millis(150), "{first:?}");
        assert!(second >= Duration::from_millis(400) && second < Duration::from_millis(450), "{second:?}");
        assert_eq!(slice.next().await, None);
    }

    #[test]
    fn zero_step_is_rejected() {
        assert!(matches!(SliceSpec::new(0, None, 0), Err(ConductorError::InvalidSlice(_))));
    }
}
