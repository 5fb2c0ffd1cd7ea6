use ferrous_bulwark::{
    AppResult, ApplicationError, DependencyContainer, ErrorKind, Injectable, Resolver, ResolverContext, ServiceLifetime,
};
use std::sync::Arc;

fn chain_of(err: &ApplicationError) -> Vec<String> {
    match err.kind() {
        ErrorKind::CircularDependency { chain } => chain.clone(),
        other => panic!("expected a circular dependency, got {other:?}"),
    }
}

#[test]
fn test_self_circular_dependency() {
    #[derive(Debug)]
    struct SelfReferencing;

    let container = DependencyContainer::new();
    container.register_factory::<SelfReferencing, _>(
        |ctx| {
            ctx.resolve::<SelfReferencing>()?;
            Ok(Arc::new(SelfReferencing))
        },
        ServiceLifetime::Transient,
    );

    let err = container.resolve::<SelfReferencing>().unwrap_err();
    assert_eq!(err.error_code(), "CircularDependencyError");
    assert_eq!(chain_of(&err), vec!["SelfReferencing", "SelfReferencing"]);
}

#[test]
fn test_two_level_circular() {
    #[derive(Debug)]
    struct A {
        _b: Arc<B>,
    }
    #[derive(Debug)]
    struct B {
        _a: Arc<A>,
    }

    impl Injectable for A {
        fn inject(ctx: &ResolverContext<'_>) -> AppResult<Self> {
            Ok(A { _b: ctx.resolve::<B>()? })
        }
    }
    impl Injectable for B {
        fn inject(ctx: &ResolverContext<'_>) -> AppResult<Self> {
            Ok(B { _a: ctx.resolve::<A>()? })
        }
    }

    let container = DependencyContainer::new();
    container.register_singleton::<A, A>().register_singleton::<B, B>();

    let err = container.resolve::<A>().unwrap_err();
    assert_eq!(chain_of(&err), vec!["A", "B", "A"]);
    assert!(err.message().contains("A -> B -> A"));

    // Nothing was cached and the stack is clean for the next call.
    let again = container.resolve::<B>().unwrap_err();
    assert_eq!(chain_of(&again), vec!["B", "A", "B"]);
}

#[test]
fn test_three_level_circular_through_scoped() {
    #[derive(Debug)]
    struct A;
    #[derive(Debug)]
    struct B;
    #[derive(Debug)]
    struct C;

    let container = DependencyContainer::new();
    container
        .register_factory::<A, _>(
            |ctx| {
                ctx.resolve::<B>()?;
                Ok(Arc::new(A))
            },
            ServiceLifetime::Scoped,
        )
        .register_factory::<B, _>(
            |ctx| {
                ctx.resolve::<C>()?;
                Ok(Arc::new(B))
            },
            ServiceLifetime::Transient,
        )
        .register_factory::<C, _>(
            |ctx| {
                ctx.resolve::<A>()?;
                Ok(Arc::new(C))
            },
            ServiceLifetime::Transient,
        );

    let scope = container.create_scope();
    let err = scope.resolve::<A>().unwrap_err();
    assert_eq!(chain_of(&err), vec!["A", "B", "C", "A"]);
}

#[test]
fn test_diamond_is_not_a_cycle() {
    struct Config;
    struct Reader {
        _config: Arc<Config>,
    }
    struct Writer {
        _config: Arc<Config>,
    }
    struct Service {
        _reader: Arc<Reader>,
        _writer: Arc<Writer>,
    }

    let container = DependencyContainer::new();
    container
        .register_instance::<Config>(Arc::new(Config))
        .register_factory::<Reader, _>(
            |ctx| Ok(Arc::new(Reader { _config: ctx.resolve()? })),
            ServiceLifetime::Transient,
        )
        .register_factory::<Writer, _>(
            |ctx| Ok(Arc::new(Writer { _config: ctx.resolve()? })),
            ServiceLifetime::Transient,
        )
        .register_factory::<Service, _>(
            |ctx| {
                Ok(Arc::new(Service {
                    _reader: ctx.resolve()?,
                    _writer: ctx.resolve()?,
                }))
            },
            ServiceLifetime::Transient,
        );

    assert!(container.resolve::<Service>().is_ok());
}

#[test]
fn test_resolves_after_cycle_is_fixed() {
    #[derive(Debug)]
    struct A {
        b: Arc<B>,
    }
    #[derive(Debug)]
    struct B {
        label: &'static str,
    }

    let container = DependencyContainer::new();
    container
        .register_factory::<A, _>(|ctx| Ok(Arc::new(A { b: ctx.resolve()? })), ServiceLifetime::Singleton)
        .register_factory::<B, _>(
            |ctx| {
                ctx.resolve::<A>()?;
                Ok(Arc::new(B { label: "cyclic" }))
            },
            ServiceLifetime::Singleton,
        );
    assert_eq!(chain_of(&container.resolve::<A>().unwrap_err()), vec!["A", "B", "A"]);

    container.register_factory::<B, _>(|_| Ok(Arc::new(B { label: "plain" })), ServiceLifetime::Singleton);
    let a = container.resolve::<A>().unwrap();
    assert_eq!(a.b.label, "plain");
    assert!(Arc::ptr_eq(&a, &container.resolve::<A>().unwrap()));
}

#[test]
fn test_cycle_split_across_threads_fails_instead_of_blocking() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Barrier};
    use std::time::Duration;

    struct A;
    struct B;

    // Both factories start before either resolves the other, so each thread
    // holds one singleton under construction while asking for the other.
    let barrier = Arc::new(Barrier::new(2));
    let first_calls = Arc::new(AtomicUsize::new(0));
    let rendezvous = move || {
        if first_calls.fetch_add(1, Ordering::SeqCst) < 2 {
            barrier.wait();
        }
    };
    let meet_a = rendezvous.clone();
    let meet_b = rendezvous;

    let container = DependencyContainer::new();
    container
        .register_factory::<A, _>(
            move |ctx| {
                meet_a();
                ctx.resolve::<B>()?;
                Ok(Arc::new(A))
            },
            ServiceLifetime::Singleton,
        )
        .register_factory::<B, _>(
            move |ctx| {
                meet_b();
                ctx.resolve::<A>()?;
                Ok(Arc::new(B))
            },
            ServiceLifetime::Singleton,
        );

    let (tx, rx) = mpsc::channel();
    let handles: Vec<_> = (0..2)
        .map(|i| {
            let container = container.clone();
            let tx = tx.clone();
            std::thread::spawn(move || {
                let result = if i == 0 {
                    container.resolve::<A>().map(|_| ())
                } else {
                    container.resolve::<B>().map(|_| ())
                };
                tx.send(result).unwrap();
            })
        })
        .collect();

    for _ in 0..2 {
        let result = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("resolution blocked on a cross-thread cycle");
        let err = result.unwrap_err();
        let chain = chain_of(&err);
        assert_eq!(chain.first(), chain.last());
        assert!(chain.len() >= 3, "{chain:?}");
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Neither cell was left claimed by a finished thread.
    assert!(container.resolve::<A>().is_err());
    assert!(!container.registration_info::<B>().unwrap().instantiated);
}
