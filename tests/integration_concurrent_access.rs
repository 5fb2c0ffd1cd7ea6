/// Concurrent access integration tests
///
/// Singletons are built exactly once under contention, breakers and
/// aggregators stay consistent when shared across threads.
use ferrous_bulwark::{
    ApplicationError, CircuitBreaker, CircuitBreakerConfig, CircuitState, DependencyContainer, ErrorAggregator,
    Resolver, ServiceLifetime,
};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

// ===== Test Services =====

struct ExpensiveService {
    instance: u32,
}

#[test]
fn test_singleton_built_once_under_contention() {
    const THREADS: usize = 16;
    let constructed = Arc::new(AtomicU32::new(0));
    let counter = constructed.clone();

    let container = DependencyContainer::new();
    container.register_factory::<ExpensiveService, _>(
        move |_| {
            thread::sleep(Duration::from_millis(20));
            Ok(Arc::new(ExpensiveService {
                instance: counter.fetch_add(1, Ordering::SeqCst) + 1,
            }))
        },
        ServiceLifetime::Singleton,
    );

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let container = container.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                container.resolve::<ExpensiveService>().unwrap()
            })
        })
        .collect();

    let instances: Vec<Arc<ExpensiveService>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(constructed.load(Ordering::SeqCst), 1);
    assert!(instances.iter().all(|s| Arc::ptr_eq(s, &instances[0])));
    assert_eq!(instances[0].instance, 1);
}

#[test]
fn test_registration_while_resolving() {
    let container = DependencyContainer::new();
    container.register_instance::<u64>(Arc::new(1));

    crossbeam_utils::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|_| {
                for _ in 0..200 {
                    let value = *container.resolve::<u64>().unwrap();
                    assert!(value == 1 || value == 2);
                }
            });
        }
        s.spawn(|_| {
            for _ in 0..50 {
                container.register_instance::<u64>(Arc::new(2));
            }
        });
    })
    .unwrap();

    assert_eq!(*container.resolve::<u64>().unwrap(), 2);
}

#[test]
fn test_circuit_breaker_counts_concurrent_failures() {
    let breaker = Arc::new(CircuitBreaker::new(
        "shared-dependency",
        CircuitBreakerConfig::new(5, Duration::from_secs(60)),
    ));
    let executed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let breaker = breaker.clone();
            let executed = executed.clone();
            thread::spawn(move || {
                let _ = breaker.call(|| {
                    executed.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ApplicationError::network("refused"))
                });
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = breaker.stats();
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(stats.total_calls, 20);
    assert_eq!(stats.failed_calls + stats.rejected_calls, 20);
    assert_eq!(stats.failed_calls as usize, executed.load(Ordering::SeqCst));
    assert!(stats.failed_calls >= 5);
}

#[test]
fn test_aggregator_shared_by_workers() {
    let aggregator = ErrorAggregator::new("parallel_import");

    crossbeam_utils::thread::scope(|s| {
        for worker in 0..8 {
            let aggregator = &aggregator;
            s.spawn(move |_| {
                for row in 0..10 {
                    if row % 2 == 0 {
                        aggregator.add_error(ApplicationError::validation("row", format!("worker {worker} row {row}")));
                    } else {
                        aggregator.add_warning(format!("worker {worker} row {row} trimmed"));
                    }
                }
            });
        }
    })
    .unwrap();

    let summary = aggregator.summary();
    assert_eq!(summary.total_errors, 40);
    assert_eq!(summary.warning_count, 40);
}
