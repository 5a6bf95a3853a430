//! Rule contracts and the handle an action stores them behind.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

/// Targets a rule hands back to its action after running.
///
/// Every element is dispatched through the same action, in order, before the
/// action moves on to its next matching rule. An empty vector means the rule
/// produced nothing.
pub type Related<T> = Vec<T>;

/// A rule for actions that carry no context.
///
/// The action only calls [`Rule::run`] for targets on which
/// [`Rule::supports`] returned `true` at the same dispatch level.
#[async_trait]
pub trait Rule<T>: Send + Sync {
    /// Tells if the given target is handled by this rule.
    fn supports(&self, target: &T) -> bool;

    /// Process the target and return related targets.
    async fn run(&self, target: &T) -> Result<Related<T>>;

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A rule for actions that thread a context of type `C` through the cascade.
///
/// The context is the value the caller supplied at the top-level run; the
/// same reference reaches every invocation at every depth.
#[async_trait]
pub trait ContextRule<T, C>: Send + Sync {
    /// Tells if the given target is handled by this rule.
    fn supports(&self, target: &T) -> bool;

    /// Process the target with the caller's context and return related targets.
    async fn run(&self, target: &T, context: &C) -> Result<Related<T>>;

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Identity of a registered rule: the address of its shared allocation.
///
/// Two `Arc`s pointing at the same rule share an id; two separately allocated
/// rules never do, however similar they behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(usize);

impl RuleId {
    pub fn of<R: ?Sized>(rule: &Arc<R>) -> Self {
        Self(Arc::as_ptr(rule) as *const () as usize)
    }
}

enum Kind<T, C> {
    Plain(Arc<dyn Rule<T>>),
    Contextual(Arc<dyn ContextRule<T, C>>),
}

/// Shared reference to a rule as stored by an [`Action`](crate::Action).
pub struct RuleHandle<T, C = ()> {
    id: RuleId,
    kind: Kind<T, C>,
}

impl<T: 'static> RuleHandle<T, ()> {
    /// Wrap a rule that never receives a context.
    pub fn plain<R: Rule<T> + 'static>(rule: Arc<R>) -> Self {
        Self {
            id: RuleId::of(&rule),
            kind: Kind::Plain(rule),
        }
    }
}

impl<T: 'static, C: 'static> RuleHandle<T, C> {
    /// Wrap a rule that receives the action's context on every call.
    pub fn contextual<R: ContextRule<T, C> + 'static>(rule: Arc<R>) -> Self {
        Self {
            id: RuleId::of(&rule),
            kind: Kind::Contextual(rule),
        }
    }
}

impl<T, C> RuleHandle<T, C> {
    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        match &self.kind {
            Kind::Plain(rule) => rule.name(),
            Kind::Contextual(rule) => rule.name(),
        }
    }

    pub fn supports(&self, target: &T) -> bool {
        match &self.kind {
            Kind::Plain(rule) => rule.supports(target),
            Kind::Contextual(rule) => rule.supports(target),
        }
    }

    /// Invoke the rule. Plain rules get the target alone.
    pub async fn run(&self, target: &T, context: &C) -> Result<Related<T>> {
        match &self.kind {
            Kind::Plain(rule) => rule.run(target).await,
            Kind::Contextual(rule) => rule.run(target, context).await,
        }
    }
}

impl<T, C> Clone for RuleHandle<T, C> {
    fn clone(&self) -> Self {
        let kind = match &self.kind {
            Kind::Plain(rule) => Kind::Plain(Arc::clone(rule)),
            Kind::Contextual(rule) => Kind::Contextual(Arc::clone(rule)),
        };
        Self { id: self.id, kind }
    }
}

impl<T, C> std::fmt::Debug for RuleHandle<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleHandle")
            .field("id", &self.id)
            .field("name", &self.name())
            .finish()
    }
}
