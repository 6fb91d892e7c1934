//! Bulk warm-up of the translation cache.
//! Targets run in waves of `max_concurrent`; a wave finishes completely before
//! the next starts, with a short pause in between so the backend is not hit
//! in bursts.

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::backend::TranslationBackend;
use crate::cache::TranslationCache;
use crate::media::MediaTarget;
use crate::metrics::metric_names;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PreloadReport {
    /// Targets passed in.
    pub requested: usize,
    /// Targets already in the store and skipped.
    pub skipped: usize,
    /// Targets looked up (equals the final progress count).
    pub loaded: usize,
    /// Lookups that produced a translation.
    pub translated: usize,
}

impl<B: TranslationBackend> TranslationCache<B> {
    /// Warm the cache using the configured wave size and no progress callback.
    pub async fn preload(&self, targets: &[MediaTarget]) -> PreloadReport {
        let wave_size = self.inner.config.preload_wave_size;
        self.preload_translations(targets, wave_size, |_, _| {}).await
    }

    /// Look up every target not already in the store. `on_progress(loaded,
    /// total)` is called after each lookup settles; `total` counts only the
    /// targets that needed work. A failed lookup still counts as loaded.
    pub async fn preload_translations<P>(
        &self,
        targets: &[MediaTarget],
        max_concurrent: usize,
        mut on_progress: P,
    ) -> PreloadReport
    where
        P: FnMut(usize, usize),
    {
        let wave_size = max_concurrent.max(1);
        let todo: Vec<MediaTarget> = targets
            .iter()
            .copied()
            .filter(|target| !self.is_cached(*target))
            .collect();
        let total = todo.len();
        let mut report = PreloadReport {
            requested: targets.len(),
            skipped: targets.len() - total,
            ..Default::default()
        };
        if total == 0 {
            debug!(requested = report.requested, "preload: nothing to fetch");
            return report;
        }

        let wave_delay = self.inner.config.preload_wave_delay();
        let mut waves = todo.chunks(wave_size).peekable();
        while let Some(wave) = waves.next() {
            let wave_span = self.inner.metrics.span(metric_names::PRELOAD_WAVE);
            let mut lookups: FuturesUnordered<_> =
                wave.iter().map(|target| self.get_translation(*target)).collect();
            while let Some(value) = lookups.next().await {
                report.loaded += 1;
                if value.is_some() {
                    report.translated += 1;
                }
                on_progress(report.loaded, total);
            }
            wave_span.finish();

            if waves.peek().is_some() {
                tokio::time::sleep(wave_delay).await;
            }
        }

        info!(
            requested = report.requested,
            skipped = report.skipped,
            loaded = report.loaded,
            translated = report.translated,
            "preload finished"
        );
        report
    }

    /// Like [`preload_translations`](Self::preload_translations) but stops
    /// waiting at `deadline`; lookups still in flight keep running in the
    /// background and land in the store when they settle.
    pub async fn preload_until<P>(
        &self,
        targets: &[MediaTarget],
        max_concurrent: usize,
        deadline: Instant,
        on_progress: P,
    ) -> Option<PreloadReport>
    where
        P: FnMut(usize, usize),
    {
        tokio::time::timeout_at(
            deadline,
            self.preload_translations(targets, max_concurrent, on_progress),
        )
        .await
        .ok()
    }
}

#[cfg(test)]
mod tests {
    use crate::cache::tests::MockBackend;
    use crate::cache::TranslationCache;
    use crate::config::TranslationConfig;
    use crate::media::MediaTarget;
    use std::time::Duration;
    use tokio::time::Instant;

    fn movies(ids: &[u32]) -> Vec<MediaTarget> {
        ids.iter().copied().map(MediaTarget::movie).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_monotonic_and_ends_at_total() {
        let backend = MockBackend::new(Duration::from_millis(50))
            .with_title(MediaTarget::movie(1), "一")
            .with_title(MediaTarget::movie(3), "三");
        let cache = TranslationCache::new(backend, TranslationConfig::default());

        let mut progress = Vec::new();
        let report = cache
            .preload_translations(&movies(&[1, 2, 3, 4, 5]), 2, |loaded, total| {
                progress.push((loaded, total))
            })
            .await;

        assert_eq!(progress, vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]);
        assert_eq!(report.loaded, 5);
        assert_eq!(report.translated, 2);
        assert_eq!(report.skipped, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_preload_only_fetches_missing_keys() {
        let backend = MockBackend::new(Duration::from_millis(10));
        let cache = TranslationCache::new(backend, TranslationConfig::default());

        cache.preload(&movies(&[1, 2])).await;
        assert_eq!(cache.backend().total_calls(), 2);

        let mut last = None;
        let report = cache
            .preload_translations(&movies(&[1, 2, 3]), 3, |loaded, total| {
                last = Some((loaded, total))
            })
            .await;
        assert_eq!(last, Some((1, 1)));
        assert_eq!(report.skipped, 2);
        assert_eq!(cache.backend().total_calls(), 3);

        let mut called = false;
        let report = cache
            .preload_translations(&movies(&[1, 2, 3]), 3, |_, _| called = true)
            .await;
        assert!(!called);
        assert_eq!(report.loaded, 0);
        assert_eq!(cache.backend().total_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn waves_are_sequential_with_pauses_between() {
        let backend = MockBackend::new(Duration::from_millis(50));
        let cache = TranslationCache::new(
            backend,
            TranslationConfig {
                max_concurrent: 10,
                ..Default::default()
            },
        );

        let started = Instant::now();
        cache
            .preload_translations(&movies(&[1, 2, 3, 4, 5, 6, 7]), 3, |_, _| {})
            .await;
        // Three waves of 50ms with two 200ms pauses between them.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(550) && elapsed < Duration::from_millis(600));
        assert_eq!(
            cache.backend().peak.load(std::sync::atomic::Ordering::SeqCst),
            3
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_lookups_still_count_as_loaded() {
        let backend = MockBackend::new(Duration::ZERO).with_failure(MediaTarget::show(1));
        let cache = TranslationCache::new(backend, TranslationConfig::default());

        let report = cache.preload(&[MediaTarget::show(1), MediaTarget::show(2)]).await;
        assert_eq!(report.loaded, 2);
        assert_eq!(report.translated, 0);
        // The failure is cached negatively, so the key is skipped next time.
        assert!(cache.is_cached(MediaTarget::show(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn preload_until_gives_up_waiting_but_keeps_fetches() {
        let backend = MockBackend::new(Duration::from_secs(2)).with_title(MediaTarget::movie(9), "九");
        let cache = TranslationCache::new(backend, TranslationConfig::default());

        let deadline = Instant::now() + Duration::from_millis(500);
        let report = cache
            .preload_until(&movies(&[9]), 3, deadline, |_, _| {})
            .await;
        assert!(report.is_none());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(cache.is_cached(MediaTarget::movie(9)));
        assert_eq!(cache.backend().calls(MediaTarget::movie(9)), 1);
    }
}
