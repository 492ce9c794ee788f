use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{self, StreamExt};

use stream_stages::execution::{StageEvent, StageObserver, StageOptions, StageStreamExt};
use stream_stages::processing::{BatchStage, FilterStage, MapStage, ReduceStage, Stage};
use stream_stages::types::Outcome;
use stream_stages::StageConfigError;

#[derive(Debug, Clone, PartialEq)]
struct ItemError {
    item: u32,
    message: String,
}

fn numbers(n: u32) -> impl futures::Stream<Item = Result<u32, ItemError>> + Send {
    stream::iter((0..n).map(Ok))
}

#[tokio::test]
async fn map_renders_numbers_in_base_two() {
    let out = numbers(6)
        .through(MapStage::new(|n: u32| Ok(format!("{n:b}"))))
        .collect_ok()
        .await
        .unwrap();

    assert_eq!(out, vec!["0", "1", "10", "11", "100", "101"]);
}

#[tokio::test]
async fn filter_keeps_even_numbers() {
    let out = numbers(6)
        .through(FilterStage::new(|n: &u32| Ok(n % 2 == 0)))
        .collect_ok()
        .await
        .unwrap();

    assert_eq!(out, vec![0, 2, 4]);
}

#[tokio::test]
async fn filter_predicate_error_ends_the_stream() {
    let bad = ItemError {
        item: 2,
        message: "predicate failed".to_string(),
    };
    let expected = bad.clone();
    let out: Vec<_> = numbers(6)
        .through(FilterStage::new(move |n: &u32| {
            if *n == 2 { Err(bad.clone()) } else { Ok(true) }
        }))
        .collect()
        .await;

    assert_eq!(out, vec![Ok(0), Ok(1), Err(expected)]);
}

#[tokio::test]
async fn reduce_concatenates_in_arrival_order() {
    let out = numbers(6)
        .fold_into(ReduceStage::new(
            |acc: String, n: u32| Ok(acc + &n.to_string()),
            String::new(),
        ))
        .await;

    assert_eq!(out, Ok("012345".to_string()));
}

#[tokio::test]
async fn batch_groups_by_three_with_short_tail() {
    let out = numbers(7)
        .through(BatchStage::new(3).unwrap())
        .collect_ok()
        .await
        .unwrap();

    assert_eq!(out, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
}

fn fail_on_three(acc: u32, n: u32) -> Result<u32, ItemError> {
    if n == 3 {
        Err(ItemError {
            item: n,
            message: "cannot fold 3".to_string(),
        })
    } else {
        Ok(acc + n)
    }
}

#[tokio::test]
async fn reduce_rejects_with_the_thrown_error_sync_and_async() {
    let expected = ItemError {
        item: 3,
        message: "cannot fold 3".to_string(),
    };

    let sync = numbers(6).fold_into(ReduceStage::new(fail_on_three, 0)).await;
    assert_eq!(sync, Err(expected.clone()));

    let async_stage = ReduceStage::from_async(
        |acc: u32, n: u32| async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            fail_on_three(acc, n)
        },
        0,
    );
    let result = async_stage.result();
    let driven = numbers(6).fold_into(async_stage).await;

    assert_eq!(driven, Err(expected.clone()));
    assert_eq!(result.peek(), Some(Err(expected)));
}

#[tokio::test]
async fn reduce_never_folds_items_after_the_failing_one() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = Arc::clone(&seen);

    let out = numbers(6)
        .fold_into(ReduceStage::new(
            move |acc: u32, n: u32| {
                seen2.lock().unwrap().push(n);
                fail_on_three(acc, n)
            },
            0,
        ))
        .await;

    assert!(out.is_err());
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn outputs_match_plain_iterator_combinators() {
    let f = |n: u32| n.wrapping_mul(2654435761) % 1000;
    let p = |n: &u32| n % 3 != 0;

    for len in [0u32, 1, 2, 5, 16, 33] {
        let input: Vec<u32> = (0..len).collect();

        let mapped = stream::iter(input.clone().into_iter().map(Ok::<_, ItemError>))
            .through(MapStage::new(move |n: u32| Ok(f(n))))
            .collect_ok()
            .await
            .unwrap();
        assert_eq!(mapped, input.iter().copied().map(f).collect::<Vec<_>>());

        let filtered = stream::iter(input.clone().into_iter().map(Ok::<_, ItemError>))
            .through(FilterStage::new(move |n: &u32| Ok(p(n))))
            .collect_ok()
            .await
            .unwrap();
        assert_eq!(filtered, input.iter().copied().filter(p).collect::<Vec<_>>());

        let folded = stream::iter(input.clone().into_iter().map(Ok::<_, ItemError>))
            .fold_into(ReduceStage::new(
                |acc: u64, n: u32| Ok(acc.wrapping_mul(31).wrapping_add(n as u64)),
                7,
            ))
            .await
            .unwrap();
        let expected = input
            .iter()
            .fold(7u64, |acc, n| acc.wrapping_mul(31).wrapping_add(*n as u64));
        assert_eq!(folded, expected);

        for k in [1usize, 2, 3, 7] {
            let batches = stream::iter(input.clone().into_iter().map(Ok::<_, ItemError>))
                .through(BatchStage::new(k).unwrap())
                .collect_ok()
                .await
                .unwrap();

            assert_eq!(batches.len(), input.len().div_ceil(k));
            if let Some((last, full)) = batches.split_last() {
                assert!(full.iter().all(|b| b.len() == k));
                assert!(!last.is_empty() && last.len() <= k);
            }
            assert_eq!(batches.concat(), input);
        }
    }
}

#[tokio::test]
async fn async_stages_process_one_item_at_a_time() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let pull_log = Arc::clone(&log);
    let upstream = stream::iter(0..3u32).map(move |n| {
        pull_log.lock().unwrap().push(format!("pull {n}"));
        Ok::<_, ItemError>(n)
    });

    let work_log = Arc::clone(&log);
    let mut out = Box::pin(upstream.through(MapStage::from_async(move |n: u32| {
        let work_log = Arc::clone(&work_log);
        async move {
            work_log.lock().unwrap().push(format!("start {n}"));
            tokio::time::sleep(Duration::from_millis(2)).await;
            work_log.lock().unwrap().push(format!("end {n}"));
            Ok(n)
        }
    })));

    while let Some(item) = out.next().await {
        let n = item.unwrap();
        log.lock().unwrap().push(format!("recv {n}"));
    }

    let expected: Vec<String> = (0..3)
        .flat_map(|n| {
            [
                format!("pull {n}"),
                format!("start {n}"),
                format!("end {n}"),
                format!("recv {n}"),
            ]
        })
        .collect();
    assert_eq!(*log.lock().unwrap(), expected);
}

#[tokio::test]
async fn map_failure_ends_the_pipeline_and_stops_pulling() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let pulled2 = Arc::clone(&pulled);
    let upstream = stream::iter(0..10u32).map(move |n| {
        pulled2.fetch_add(1, Ordering::SeqCst);
        Ok::<_, ItemError>(n)
    });

    let filter: FilterStage<u32, ItemError> = FilterStage::new(|_: &u32| Ok(true));
    let filter_metrics = filter.metrics();

    let items: Vec<_> = upstream
        .through(MapStage::from_outcome(|n: u32| {
            if n == 2 {
                Outcome::<u32, ItemError>::pending(async move {
                    Err(ItemError {
                        item: n,
                        message: "map failed".to_string(),
                    })
                })
            } else {
                Outcome::ok(n * 100)
            }
        }))
        .through(filter)
        .collect()
        .await;

    assert_eq!(
        items,
        vec![
            Ok(0),
            Ok(100),
            Err(ItemError {
                item: 2,
                message: "map failed".to_string()
            })
        ]
    );
    assert_eq!(pulled.load(Ordering::SeqCst), 3);

    let snap = filter_metrics.snapshot();
    assert_eq!(snap.items_received, 2);
    assert_eq!(snap.failures, 1);
}

#[tokio::test]
async fn upstream_error_discards_partial_batch() {
    let upstream = stream::iter(vec![
        Ok(1u32),
        Ok(2),
        Ok(3),
        Err(ItemError {
            item: 4,
            message: "source closed".to_string(),
        }),
        Ok(5),
    ]);

    let items: Vec<_> = upstream.through(BatchStage::new(2).unwrap()).collect().await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0], Ok(vec![1, 2]));
    assert_eq!(items[1].as_ref().unwrap_err().item, 4);
}

#[tokio::test]
async fn reduce_rejects_on_upstream_error() {
    let stage = ReduceStage::new(|acc: u32, n: u32| Ok::<_, ItemError>(acc + n), 0);
    let result = stage.result();

    let upstream = stream::iter(vec![
        Ok(1u32),
        Err(ItemError {
            item: 2,
            message: "lost".to_string(),
        }),
        Ok(3),
    ]);
    let out = upstream.fold_into(stage).await;

    assert_eq!(out.as_ref().unwrap_err().message, "lost");
    assert_eq!(result.await, out);
}

#[tokio::test]
async fn continuations_fire_once_even_when_attached_late() {
    let fulfilled = Arc::new(AtomicUsize::new(0));
    let stage = ReduceStage::new(|acc: u32, n: u32| Ok::<_, ItemError>(acc + n), 0);
    let result = stage.result();

    let early = Arc::clone(&fulfilled);
    result.then(
        move |v| {
            assert_eq!(*v, 15);
            early.fetch_add(1, Ordering::SeqCst);
        },
        |_| panic!("should not reject"),
    );

    assert_eq!(numbers(6).fold_into(stage).await, Ok(15));

    let late = Arc::clone(&fulfilled);
    result.then(
        move |v| {
            assert_eq!(*v, 15);
            late.fetch_add(1, Ordering::SeqCst);
        },
        |_| panic!("should not reject"),
    );
    result.catch(|_| panic!("should not reject"));

    assert_eq!(fulfilled.load(Ordering::SeqCst), 2);
    assert_eq!(result.clone().await, Ok(15));
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<(String, StageEvent)>>,
}

impl StageObserver for RecordingObserver {
    fn on_event(&self, stage: &str, event: &StageEvent) {
        self.events.lock().unwrap().push((stage.to_string(), event.clone()));
    }
}

#[tokio::test]
async fn observer_receives_named_stage_events() {
    let obs = Arc::new(RecordingObserver::default());
    let stage: BatchStage<u32, ItemError> = BatchStage::new(2)
        .unwrap()
        .with_options(StageOptions::named("pairs").with_observer(obs.clone()))
        .unwrap();
    assert_eq!(stage.name(), "pairs");

    let out = numbers(3).through(stage).collect_ok().await.unwrap();
    assert_eq!(out, vec![vec![0, 1], vec![2]]);

    let events = obs.events.lock().unwrap().clone();
    assert!(events.iter().all(|(name, _)| name == "pairs"));
    let kinds: Vec<_> = events.into_iter().map(|(_, e)| e).collect();
    assert_eq!(
        kinds,
        vec![
            StageEvent::ItemReceived,
            StageEvent::ItemReceived,
            StageEvent::BatchEmitted { len: 2 },
            StageEvent::ItemReceived,
            StageEvent::BatchEmitted { len: 1 },
            StageEvent::Flushed { emitted: 1 },
        ]
    );
}

#[test]
fn blank_stage_name_is_rejected() {
    let err = MapStage::new(|n: u32| Ok::<_, ItemError>(n))
        .with_options(StageOptions::named("  "))
        .err();
    assert_eq!(err, Some(StageConfigError::BlankName));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipelines_can_run_on_a_spawned_task() {
    let handle = tokio::spawn(async move {
        numbers(10)
            .through(MapStage::from_async(|n: u32| async move { Ok(n + 1) }))
            .through(FilterStage::new(|n: &u32| Ok(n % 2 == 1)))
            .through(BatchStage::new(2).unwrap())
            .fold_into(ReduceStage::new(
                |mut acc: Vec<u32>, batch: Vec<u32>| {
                    acc.extend(batch.into_iter().rev());
                    Ok(acc)
                },
                Vec::new(),
            ))
            .await
    });

    assert_eq!(handle.await.unwrap(), Ok(vec![3, 1, 7, 5, 9]));
}
