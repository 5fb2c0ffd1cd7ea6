use std::sync::Arc;
use std::time::Duration;

use super::{error_boundary, log_error};
use crate::error::{AppResult, ApplicationError};
use crate::reliability::{CircuitBreaker, RetryWithBackoff, TimeoutManager};

type Operation<T> = Arc<dyn Fn() -> AppResult<T> + Send + Sync>;

/// One stage of a [`ResiliencePipeline`].
#[derive(Clone, Debug)]
pub enum Layer {
    /// Bounds each call by the manager's timeout for the pipeline's operation
    Timeout(TimeoutManager),
    Retry(RetryWithBackoff),
    /// Shared so the breaker keeps its state across pipelines and calls
    CircuitBreaker(Arc<CircuitBreaker>),
}

impl Layer {
    pub fn name(&self) -> &'static str {
        match self {
            Layer::Timeout(_) => "timeout",
            Layer::Retry(_) => "retry",
            Layer::CircuitBreaker(_) => "circuit_breaker",
        }
    }

    fn wrap<T>(&self, operation: &str, inner: Operation<T>) -> Operation<T>
    where
        T: Send + 'static,
    {
        match self {
            Layer::Timeout(manager) => {
                let manager = manager.clone();
                let name = operation.to_string();
                Arc::new(move || {
                    let inner = Arc::clone(&inner);
                    manager.execute(&name, move || inner())
                })
            }
            Layer::Retry(retry) => {
                let retry = retry.clone();
                Arc::new(move || retry.execute(|| inner()))
            }
            Layer::CircuitBreaker(breaker) => {
                let breaker = Arc::clone(breaker);
                Arc::new(move || breaker.call(|| inner()))
            }
        }
    }
}

/// Timeout, retry and circuit breaker stacked around one operation.
///
/// Layers wrap in the order they are added: the first one added sits
/// closest to the operation. [`standard`](Self::standard) builds the usual
/// stack with the timeout innermost and the breaker outermost, so one
/// breaker failure stands for an already retried, already time-bounded call.
///
/// # Examples
///
/// ```
/// use ferrous_bulwark::{
///     ApplicationError, CircuitBreaker, CircuitBreakerConfig, ResiliencePipeline, RetryPolicy,
///     RetryWithBackoff, TimeoutManager,
/// };
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let pipeline = ResiliencePipeline::standard(
///     "fetch_weather",
///     TimeoutManager::new(Duration::from_secs(1)),
///     RetryWithBackoff::new("fetch_weather", RetryPolicy::new(2, Duration::from_millis(1))),
///     Arc::new(CircuitBreaker::new("weather-api", CircuitBreakerConfig::default())),
/// );
/// assert_eq!(pipeline.layer_names(), vec!["timeout", "retry", "circuit_breaker"]);
///
/// let reading = pipeline.execute(|| Ok::<_, ApplicationError>(21.5)).unwrap();
/// assert_eq!(reading, 21.5);
///
/// let fallback = pipeline.execute_or(0.0, || Err(ApplicationError::network("offline")));
/// assert_eq!(fallback, 0.0);
/// ```
#[derive(Clone, Debug)]
pub struct ResiliencePipeline {
    operation: String,
    layers: Vec<Layer>,
}

impl ResiliencePipeline {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            layers: Vec::new(),
        }
    }

    /// Timeout innermost, retry in the middle, circuit breaker outermost.
    pub fn standard(
        operation: impl Into<String>,
        timeout: TimeoutManager,
        retry: RetryWithBackoff,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self::new(operation)
            .with_timeout(timeout)
            .with_retry(retry)
            .with_circuit_breaker(breaker)
    }

    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn with_timeout(self, manager: TimeoutManager) -> Self {
        self.with_layer(Layer::Timeout(manager))
    }

    /// Adds a timeout layer with a fixed deadline.
    pub fn with_timeout_duration(self, timeout: Duration) -> Self {
        self.with_timeout(TimeoutManager::new(timeout))
    }

    pub fn with_retry(self, retry: RetryWithBackoff) -> Self {
        self.with_layer(Layer::Retry(retry))
    }

    pub fn with_circuit_breaker(self, breaker: Arc<CircuitBreaker>) -> Self {
        self.with_layer(Layer::CircuitBreaker(breaker))
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Layer names from innermost to outermost.
    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(Layer::name).collect()
    }

    /// Runs `f` through every layer and propagates the final error.
    pub fn execute<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: Fn() -> AppResult<T> + Send + Sync + 'static,
    {
        let composed = self
            .layers
            .iter()
            .fold(Arc::new(f) as Operation<T>, |inner, layer| layer.wrap(&self.operation, inner));
        composed()
    }

    /// Like [`execute`](Self::execute) but logs the final error and returns `default`.
    pub fn execute_or<T, F>(&self, default: T, f: F) -> T
    where
        T: Send + 'static,
        F: Fn() -> AppResult<T> + Send + Sync + 'static,
    {
        match self.execute(f) {
            Ok(value) => value,
            Err(error) => {
                log_error(&self.operation, &error);
                default
            }
        }
    }
}

/// Runs `f`, returning `default` on any failure, panics included.
///
/// ```
/// use ferrous_bulwark::safe_execute;
///
/// let port: u16 = safe_execute("parse_port", 8080, || "not-a-port".parse::<u16>().map_err(|e| e.to_string()));
/// assert_eq!(port, 8080);
/// ```
pub fn safe_execute<T, E, F>(operation: &str, default: T, f: F) -> T
where
    E: Into<ApplicationError>,
    F: FnOnce() -> Result<T, E>,
{
    error_boundary(operation, None, f).value.unwrap_or(default)
}
