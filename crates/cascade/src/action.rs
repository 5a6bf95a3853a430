//! The dispatch loop.

use std::any::type_name;
use std::sync::Arc;

use anyhow::Result;
use indexmap::IndexMap;
use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::rule::{ContextRule, Rule, RuleHandle, RuleId};

/// Matching rules for one target, in registration order.
type Matched<T, C> = SmallVec<[RuleHandle<T, C>; 4]>;

/// Pending work on the dispatch stack.
enum Frame<T, C> {
    /// A target whose matching rules have not been computed yet.
    Visit { target: T, depth: usize },
    /// A target part-way through its matching rules.
    Resume {
        target: T,
        depth: usize,
        pending: smallvec::IntoIter<[RuleHandle<T, C>; 4]>,
    },
}

/// A named workflow: an ordered set of rules and the cascade that runs them.
///
/// `C` is the context type threaded through a cascade. The default `()` means
/// the action carries no context: use [`Action::run`] and plain [`Rule`]s.
/// Any other `C` goes through [`Action::run_with`] and [`ContextRule`]s.
///
/// Rules are de-duplicated by identity and dispatched in registration order.
/// Registration takes `&self`, so rules can be added to an action that is
/// shared (and possibly mid-run) behind an `Arc`.
pub struct Action<T, C = ()> {
    rules: RwLock<IndexMap<RuleId, RuleHandle<T, C>>>,
}

impl<T, C> Action<T, C>
where
    T: Send + Sync + 'static,
    C: Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(IndexMap::new()),
        }
    }

    /// Create an action pre-populated with rules, keeping the first occurrence
    /// of any rule listed twice.
    pub fn from_rules(rules: impl IntoIterator<Item = RuleHandle<T, C>>) -> Self {
        let action = Self::new();
        for rule in rules {
            action.register(rule);
        }
        action
    }

    /// Register a rule. Registering a rule that is already present is a no-op
    /// and keeps its original position.
    pub fn register(&self, rule: RuleHandle<T, C>) -> &Self {
        let mut rules = self.rules.write();
        let id = rule.id();
        if rules.contains_key(&id) {
            trace!(rule = rule.name(), "rule already registered");
        } else {
            debug!(rule = rule.name(), position = rules.len(), "registering rule");
            rules.insert(id, rule);
        }
        self
    }

    /// Register a rule that receives the context on every call.
    pub fn register_context_rule<R>(&self, rule: Arc<R>) -> &Self
    where
        R: ContextRule<T, C> + 'static,
    {
        self.register(RuleHandle::contextual(rule))
    }

    /// Whether this exact rule instance is registered.
    pub fn has_rule<R: ?Sized>(&self, rule: &Arc<R>) -> bool {
        self.rules.read().contains_key(&RuleId::of(rule))
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    /// Run the cascade for `target`, handing `context` to every rule.
    ///
    /// Resolves once every matching rule and every cascade their related
    /// targets triggered (transitively) has completed. Rules run one at a time:
    /// a rule's whole cascade finishes before the next matching rule for the
    /// same target starts.
    ///
    /// The first rule error aborts the run and is returned as-is. A target no
    /// rule supports completes without doing anything.
    pub async fn run_with(&self, target: T, context: &C) -> Result<()> {
        debug!(target_type = type_name::<T>(), "cascade started");

        let mut stack: Vec<Frame<T, C>> = vec![Frame::Visit { target, depth: 0 }];
        let mut invocations = 0usize;

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Visit { target, depth } => {
                    let matched = self.matching(&target);
                    debug!(depth, matched = matched.len(), "dispatching target");
                    stack.push(Frame::Resume {
                        target,
                        depth,
                        pending: matched.into_iter(),
                    });
                }
                Frame::Resume {
                    target,
                    depth,
                    mut pending,
                } => {
                    let Some(rule) = pending.next() else {
                        continue;
                    };

                    trace!(rule = rule.name(), depth, "running rule");
                    invocations += 1;
                    let related = match rule.run(&target, context).await {
                        Ok(related) => related,
                        Err(error) => {
                            debug!(
                                rule = rule.name(),
                                depth,
                                %error,
                                "rule failed, aborting cascade"
                            );
                            return Err(error);
                        }
                    };

                    // Siblings resume only after every related target is done,
                    // so they go underneath the related targets on the stack.
                    stack.push(Frame::Resume {
                        target,
                        depth,
                        pending,
                    });
                    if !related.is_empty() {
                        trace!(rule = rule.name(), related = related.len(), "cascading");
                    }
                    stack.extend(related.into_iter().rev().map(|target| Frame::Visit {
                        target,
                        depth: depth + 1,
                    }));
                }
            }
        }

        debug!(invocations, "cascade finished");
        Ok(())
    }

    /// Snapshot of the rules supporting `target`. The registry lock is released
    /// before any rule runs.
    fn matching(&self, target: &T) -> Matched<T, C> {
        self.rules
            .read()
            .values()
            .filter(|rule| rule.supports(target))
            .cloned()
            .collect()
    }
}

impl<T> Action<T, ()>
where
    T: Send + Sync + 'static,
{
    /// Register a rule that only ever receives targets.
    pub fn register_rule<R>(&self, rule: Arc<R>) -> &Self
    where
        R: Rule<T> + 'static,
    {
        self.register(RuleHandle::plain(rule))
    }

    /// Run the cascade for `target`. See [`Action::run_with`].
    pub async fn run(&self, target: T) -> Result<()> {
        self.run_with(target, &()).await
    }
}

impl<T, C> Default for Action<T, C>
where
    T: Send + Sync + 'static,
    C: Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C> std::fmt::Debug for Action<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("target", &type_name::<T>())
            .field("context", &type_name::<C>())
            .field("rules", &self.rules.read().len())
            .finish()
    }
}
