use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ferrous_bulwark::*;
use std::sync::Arc;
use std::time::Duration;

trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

struct FixedClock;

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        42
    }
}

impl Injectable for FixedClock {
    fn inject(_: &ResolverContext<'_>) -> AppResult<Self> {
        Ok(FixedClock)
    }
}

implements!(FixedClock => dyn Clock);

struct Handler {
    clock: Arc<dyn Clock>,
}

impl Injectable for Handler {
    fn inject(ctx: &ResolverContext<'_>) -> AppResult<Self> {
        Ok(Handler {
            clock: ctx.resolve::<dyn Clock>()?,
        })
    }
}

// ===== Container =====

fn bench_singleton_hit(c: &mut Criterion) {
    let container = DependencyContainer::new();
    container.register_singleton::<dyn Clock, FixedClock>();
    let _ = container.resolve::<dyn Clock>().unwrap();

    c.bench_function("singleton_hit", |b| {
        b.iter(|| black_box(container.resolve::<dyn Clock>().unwrap().now()))
    });
}

fn bench_transient_with_dependency(c: &mut Criterion) {
    let container = DependencyContainer::new();
    container
        .register_singleton::<dyn Clock, FixedClock>()
        .register_transient::<Handler, Handler>();

    c.bench_function("transient_with_dependency", |b| {
        b.iter(|| black_box(container.resolve::<Handler>().unwrap().clock.now()))
    });
}

fn bench_scoped(c: &mut Criterion) {
    let container = DependencyContainer::new();
    container
        .register_singleton::<dyn Clock, FixedClock>()
        .register_scoped::<Handler, Handler>();

    let mut group = c.benchmark_group("scoped");
    for resolutions in [1usize, 10] {
        group.bench_with_input(BenchmarkId::from_parameter(resolutions), &resolutions, |b, &n| {
            b.iter(|| {
                let scope = container.create_scope();
                for _ in 0..n {
                    black_box(scope.resolve::<Handler>().unwrap());
                }
            })
        });
    }
    group.finish();
}

// ===== Reliability =====

fn bench_breaker_call(c: &mut Criterion) {
    let breaker = CircuitBreaker::new("bench", CircuitBreakerConfig::default());
    c.bench_function("breaker_closed_call", |b| {
        b.iter(|| black_box(breaker.call(|| Ok::<_, ApplicationError>(1u8))))
    });

    let open = CircuitBreaker::new("bench-open", CircuitBreakerConfig::new(1, Duration::from_secs(3600)));
    let _ = open.call(|| Err::<(), _>(ApplicationError::network("down")));
    c.bench_function("breaker_open_rejection", |b| {
        b.iter(|| black_box(open.call(|| Ok::<_, ApplicationError>(1u8))))
    });
}

fn bench_retry_first_try(c: &mut Criterion) {
    let retry = RetryWithBackoff::new("bench", RetryPolicy::default());
    c.bench_function("retry_success_first_attempt", |b| {
        b.iter(|| black_box(retry.execute(|| Ok::<_, ApplicationError>(1u8))))
    });
}

// ===== Errors =====

fn bench_error_construction(c: &mut Criterion) {
    c.bench_function("error_construction", |b| {
        b.iter(|| {
            black_box(
                ApplicationError::external_service("geo", "upstream returned 503")
                    .with_context("attempt", 3)
                    .with_context("api_key", "secret"),
            )
        })
    });

    let err = ApplicationError::database("insert", "deadlock").with_context("password", "hunter2");
    c.bench_function("error_report_json", |b| b.iter(|| black_box(err.to_json())));
}

criterion_group!(
    benches,
    bench_singleton_hit,
    bench_transient_with_dependency,
    bench_scoped,
    bench_breaker_call,
    bench_retry_first_try,
    bench_error_construction
);
criterion_main!(benches);
