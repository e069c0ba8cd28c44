use anyhow::Result;
use futures::future::join_all;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::{ContentItem, ContentKind, FilterSet};
use crate::random::RandomSource;
use crate::tmdb::TmdbApi;

/// The upstream truncates deep pagination; staying at or below this also
/// bounds how many calls one build can issue.
const MAX_PAGES: u32 = 50;

/// Pages fetched concurrently per batch; batches run sequentially.
const PAGE_BATCH: usize = 5;

/// Detail lookups fetched concurrently during miniseries reclassification.
const DETAIL_BATCH: usize = 10;

/// Advisory pause between detail batches, to stay clear of upstream
/// throttling.
const DETAIL_PAUSE: Duration = Duration::from_millis(100);

/// Fetch, deduplicate, optionally reclassify, and shuffle the candidates
/// for one filter set. A page-1 failure fails the build; later failures
/// stop pagination and keep what was accumulated.
pub(super) async fn build_items(
    tmdb: &dyn TmdbApi,
    random: &dyn RandomSource,
    filters: &FilterSet,
) -> Result<Vec<ContentItem>> {
    let first = tmdb.discover(filters, 1).await?;
    if first.items.is_empty() {
        return Ok(Vec::new());
    }

    let total_pages = first.total_pages.min(MAX_PAGES);
    let mut items = first.items;

    let remaining: Vec<u32> = (2..=total_pages).collect();
    for batch in remaining.chunks(PAGE_BATCH) {
        let results = join_all(batch.iter().map(|&page| tmdb.discover(filters, page))).await;
        match results.into_iter().collect::<Result<Vec<_>>>() {
            Ok(pages) => {
                // Results append in request-page order, not completion order.
                for page in pages {
                    items.extend(page.items);
                }
            }
            Err(err) => {
                warn!(
                    "Stopping page fetch after batch failure, keeping {} items: {:?}",
                    items.len(),
                    err
                );
                break;
            }
        }
    }

    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.id));

    if filters.content_type == ContentKind::Miniseries {
        items = classify_miniseries(tmdb, items).await;
    }

    shuffle(&mut items, random);
    debug!("Built pool of {} candidates", items.len());
    Ok(items)
}

/// Narrow tv candidates down to miniseries using per-item details, merging
/// the detail fields into the survivors. A failed detail fetch drops only
/// that candidate.
async fn classify_miniseries(
    tmdb: &dyn TmdbApi,
    candidates: Vec<ContentItem>,
) -> Vec<ContentItem> {
    let mut kept = Vec::new();
    for (index, batch) in candidates.chunks(DETAIL_BATCH).enumerate() {
        if index > 0 {
            tokio::time::sleep(DETAIL_PAUSE).await;
        }
        let results = join_all(batch.iter().map(|item| async move {
            match tmdb.details(ContentKind::Miniseries, item.id).await {
                Ok(details) if details.is_miniseries() => {
                    let mut item = item.clone();
                    item.merge_details(&details);
                    Some(item)
                }
                Ok(_) => None,
                Err(err) => {
                    warn!(
                        "Dropping '{}' after detail fetch failure: {:?}",
                        item.title, err
                    );
                    None
                }
            }
        }))
        .await;
        kept.extend(results.into_iter().flatten());
    }
    kept
}

/// Fisher-Yates with indices drawn from the injected source.
pub(super) fn shuffle(items: &mut [ContentItem], random: &dyn RandomSource) {
    for i in (1..items.len()).rev() {
        let j = random.next_index(i + 1);
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DetailRecord, DiscoverPage, Genre};
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Always swaps an element with itself: the shuffle keeps input order.
    struct LastIndex;

    impl RandomSource for LastIndex {
        fn next_index(&self, bound: usize) -> usize {
            bound - 1
        }
    }

    /// Always picks index 0, which rotates the list left by one.
    struct ZeroRandom;

    impl RandomSource for ZeroRandom {
        fn next_index(&self, _bound: usize) -> usize {
            0
        }
    }

    #[derive(Default)]
    struct FakeTmdb {
        pages: Vec<Vec<ContentItem>>,
        total_pages: u32,
        fail_pages: HashSet<u32>,
        miniseries_ids: HashSet<i32>,
        failing_details: HashSet<i32>,
        discover_calls: AtomicUsize,
    }

    impl FakeTmdb {
        fn with_pages(pages: Vec<Vec<ContentItem>>) -> Self {
            let total_pages = pages.len() as u32;
            Self {
                pages,
                total_pages,
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.discover_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TmdbApi for FakeTmdb {
        async fn discover(&self, _filters: &FilterSet, page: u32) -> Result<DiscoverPage> {
            self.discover_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_pages.contains(&page) {
                anyhow::bail!("page {page} failed");
            }
            let items = self
                .pages
                .get(page as usize - 1)
                .cloned()
                .unwrap_or_default();
            Ok(DiscoverPage {
                page,
                items,
                total_pages: self.total_pages,
                total_results: 0,
            })
        }

        async fn details(&self, _kind: ContentKind, id: i32) -> Result<DetailRecord> {
            if self.failing_details.contains(&id) {
                anyhow::bail!("details for {id} failed");
            }
            let record = if self.miniseries_ids.contains(&id) {
                serde_json::json!({
                    "id": id,
                    "status": "Ended",
                    "number_of_seasons": 1,
                    "number_of_episodes": 6
                })
            } else {
                serde_json::json!({
                    "id": id,
                    "status": "Returning Series",
                    "number_of_seasons": 4,
                    "number_of_episodes": 40
                })
            };
            Ok(serde_json::from_value(record).expect("detail fixture"))
        }

        async fn genres(&self, _kind: ContentKind) -> Result<Vec<Genre>> {
            Ok(Vec::new())
        }
    }

    fn item(id: i32) -> ContentItem {
        serde_json::from_value(serde_json::json!({ "id": id, "title": format!("Item {id}") }))
            .expect("item fixture")
    }

    fn page_of(ids: std::ops::Range<i32>) -> Vec<ContentItem> {
        ids.map(item).collect()
    }

    fn filters(kind: ContentKind) -> FilterSet {
        FilterSet {
            content_type: kind,
            genre_ids: BTreeSet::new(),
            year_from: None,
            year_to: None,
            language: None,
            min_rating: 0.0,
        }
    }

    fn ids(items: &[ContentItem]) -> Vec<i32> {
        items.iter().map(|i| i.id).collect()
    }

    #[tokio::test]
    async fn concatenates_pages_in_request_order() {
        let tmdb = FakeTmdb::with_pages(vec![
            page_of(0..20),
            page_of(20..40),
            page_of(40..60),
        ]);
        let items = build_items(&tmdb, &LastIndex, &filters(ContentKind::Movie))
            .await
            .expect("build");
        assert_eq!(ids(&items), (0..60).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn duplicates_keep_the_first_occurrence() {
        let mut pages = vec![page_of(0..20), page_of(20..40), page_of(40..60)];
        // Four raw items share id 555 across pages.
        pages[0][3] = item(555);
        pages[1][7] = item(555);
        pages[1][8] = item(555);
        pages[2][19] = item(555);
        let tmdb = FakeTmdb::with_pages(pages);

        let items = build_items(&tmdb, &LastIndex, &filters(ContentKind::Movie))
            .await
            .expect("build");
        assert_eq!(items.len(), 57);
        let position = ids(&items).iter().position(|&id| id == 555);
        assert_eq!(position, Some(3));
    }

    #[tokio::test]
    async fn empty_first_page_short_circuits() {
        let tmdb = FakeTmdb {
            total_pages: 40,
            ..FakeTmdb::with_pages(vec![Vec::new()])
        };
        let items = build_items(&tmdb, &LastIndex, &filters(ContentKind::Movie))
            .await
            .expect("build");
        assert!(items.is_empty());
        assert_eq!(tmdb.calls(), 1);
    }

    #[tokio::test]
    async fn first_page_failure_fails_the_build() {
        let tmdb = FakeTmdb {
            fail_pages: HashSet::from([1]),
            ..FakeTmdb::with_pages(vec![page_of(0..20)])
        };
        assert!(build_items(&tmdb, &LastIndex, &filters(ContentKind::Movie))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn mid_batch_failure_keeps_completed_batches() {
        let pages = (0..10).map(|p| page_of(p * 20..p * 20 + 20)).collect();
        let tmdb = FakeTmdb {
            fail_pages: HashSet::from([7]),
            ..FakeTmdb::with_pages(pages)
        };

        // Pages 2-6 complete as a batch; the 7-10 batch fails and is
        // discarded, leaving pages 1-6.
        let items = build_items(&tmdb, &LastIndex, &filters(ContentKind::Movie))
            .await
            .expect("build");
        assert_eq!(items.len(), 120);
        assert_eq!(ids(&items), (0..120).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn failure_in_the_first_batch_still_keeps_page_one() {
        let pages = (0..5).map(|p| page_of(p * 20..p * 20 + 20)).collect();
        let tmdb = FakeTmdb {
            fail_pages: HashSet::from([2]),
            ..FakeTmdb::with_pages(pages)
        };

        let items = build_items(&tmdb, &LastIndex, &filters(ContentKind::Movie))
            .await
            .expect("build");
        assert_eq!(ids(&items), (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn pagination_stops_at_the_page_cap() {
        let pages = (0..60).map(|p| page_of(p * 20..p * 20 + 20)).collect();
        let tmdb = FakeTmdb {
            total_pages: 60,
            ..FakeTmdb::with_pages(pages)
        };

        let items = build_items(&tmdb, &LastIndex, &filters(ContentKind::Movie))
            .await
            .expect("build");
        assert_eq!(tmdb.calls(), 50);
        assert_eq!(items.len(), 50 * 20);
    }

    #[tokio::test]
    async fn miniseries_filter_keeps_qualifying_candidates() {
        let tmdb = FakeTmdb {
            miniseries_ids: HashSet::from([2, 5, 9, 13, 17]),
            ..FakeTmdb::with_pages(vec![page_of(0..20)])
        };

        let items = build_items(&tmdb, &LastIndex, &filters(ContentKind::Miniseries))
            .await
            .expect("build");
        assert_eq!(items.len(), 5);
        assert!(items.iter().all(|i| i.number_of_seasons == Some(1)));
        assert!(items.iter().all(|i| i.status.as_deref() == Some("Ended")));
    }

    #[tokio::test]
    async fn detail_failures_drop_only_that_candidate() {
        let tmdb = FakeTmdb {
            miniseries_ids: HashSet::from([2, 5, 9]),
            failing_details: HashSet::from([5, 11]),
            ..FakeTmdb::with_pages(vec![page_of(0..20)])
        };

        let items = build_items(&tmdb, &LastIndex, &filters(ContentKind::Miniseries))
            .await
            .expect("build");
        assert_eq!(ids(&items), vec![2, 9]);
    }

    #[test]
    fn shuffle_applies_the_drawn_indices() {
        let mut items = vec![item(1), item(2), item(3), item(4)];
        shuffle(&mut items, &ZeroRandom);
        assert_eq!(ids(&items), vec![2, 3, 4, 1]);

        let mut untouched = vec![item(1), item(2), item(3)];
        shuffle(&mut untouched, &LastIndex);
        assert_eq!(ids(&untouched), vec![1, 2, 3]);
    }

    #[test]
    fn shuffling_produces_a_permutation() {
        let mut items: Vec<ContentItem> = (0..40).map(item).collect();
        shuffle(&mut items, &crate::random::ThreadRandom);
        let mut sorted = ids(&items);
        sorted.sort_unstable();
        assert_eq!(sorted, (0..40).collect::<Vec<_>>());
        // 40! orderings; the input order coming back would point at a bug.
        assert_ne!(ids(&items), (0..40).collect::<Vec<_>>());
    }
}
