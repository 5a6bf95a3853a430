//! Testing utilities for cascade.
//!
//! [`StubRule`] is a configurable rule that records what it was called with,
//! and [`CallLog`] is a log shared between rules to assert the order in which
//! a cascade visited them.
//!
//! ```ignore
//! let log = CallLog::new();
//! let rule1 = Arc::new(
//!     StubRule::new("rule1")
//!         .supports_only(1)
//!         .relates_to(vec![2])
//!         .logging_to(&log),
//! );
//! let rule2 = Arc::new(StubRule::new("rule2").supports_only(2).logging_to(&log));
//!
//! let action = Action::<u32>::new();
//! action.register_rule(rule1.clone()).register_rule(rule2.clone());
//! action.run(1).await?;
//!
//! assert_eq!(log.entries(), ["rule1 > 1", "rule1 < 1", "rule2 > 2", "rule2 < 2"]);
//! ```

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use cascade_core::{ContextRule, Related, Rule};
use parking_lot::Mutex;

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;
type Producer<T> = Box<dyn Fn(&T) -> Related<T> + Send + Sync>;

/// One recorded invocation of a [`StubRule`].
#[derive(Debug, Clone)]
pub struct Call<T, C> {
    pub target: T,
    /// Clone of the context, `None` when the rule ran without one.
    pub context: Option<C>,
    /// Address of the context the rule received, to check identity.
    pub context_addr: Option<usize>,
}

/// Ordered log shared by several rules.
///
/// Each rule pushes `"<label> > <target>"` when it starts and
/// `"<label> < <target>"` when it finishes successfully.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Only the start entries, i.e. the order rules were invoked in.
    pub fn starts(&self) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter(|entry| entry.contains(" > "))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// A rule whose behavior is configured by the test.
///
/// By default it supports every target, relates nothing and completes
/// immediately.
pub struct StubRule<T, C = ()> {
    label: String,
    supports: Predicate<T>,
    related: Producer<T>,
    delay: Option<Duration>,
    failure: Option<String>,
    log: Option<CallLog>,
    calls: Mutex<Vec<Call<T, C>>>,
}

impl<T, C> StubRule<T, C>
where
    T: Clone + Debug + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            supports: Box::new(|_| true),
            related: Box::new(|_| Vec::new()),
            delay: None,
            failure: None,
            log: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A rule that supports nothing.
    pub fn never(label: impl Into<String>) -> Self {
        Self::new(label).supports_if(|_| false)
    }

    pub fn supports_if(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.supports = Box::new(predicate);
        self
    }

    /// Support exactly one target.
    pub fn supports_only(self, target: T) -> Self
    where
        T: PartialEq,
    {
        self.supports_if(move |candidate| *candidate == target)
    }

    pub fn relates(mut self, producer: impl Fn(&T) -> Related<T> + Send + Sync + 'static) -> Self {
        self.related = Box::new(producer);
        self
    }

    /// Relate the same targets on every call.
    pub fn relates_to(self, targets: Vec<T>) -> Self {
        self.relates(move |_| targets.clone())
    }

    /// Sleep (on the tokio clock) before completing.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call with `message`, after the delay if any.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn logging_to(mut self, log: &CallLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn calls(&self) -> Vec<Call<T, C>> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn targets(&self) -> Vec<T> {
        self.calls.lock().iter().map(|call| call.target.clone()).collect()
    }

    async fn invoke(&self, target: &T, context: Option<&C>) -> Result<Related<T>> {
        self.calls.lock().push(Call {
            target: target.clone(),
            context: context.cloned(),
            context_addr: context.map(|context| context as *const C as usize),
        });
        if let Some(log) = &self.log {
            log.push(format!("{} > {:?}", self.label, target));
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            bail!("{message}");
        }

        let related = (self.related)(target);
        if let Some(log) = &self.log {
            log.push(format!("{} < {:?}", self.label, target));
        }
        Ok(related)
    }
}

#[async_trait]
impl<T> Rule<T> for StubRule<T, ()>
where
    T: Clone + Debug + Send + Sync + 'static,
{
    fn supports(&self, target: &T) -> bool {
        (self.supports)(target)
    }

    async fn run(&self, target: &T) -> Result<Related<T>> {
        self.invoke(target, None).await
    }
}

#[async_trait]
impl<T, C> ContextRule<T, C> for StubRule<T, C>
where
    T: Clone + Debug + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    fn supports(&self, target: &T) -> bool {
        (self.supports)(target)
    }

    async fn run(&self, target: &T, context: &C) -> Result<Related<T>> {
        self.invoke(target, Some(context)).await
    }
}
