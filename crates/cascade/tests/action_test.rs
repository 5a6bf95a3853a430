//! Integration tests for the Action dispatch loop.

use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use cascade_core::{Action, Rule, RuleHandle};
use cascade_testing::{CallLog, StubRule};

// ---------------------------------------------------------------------------
// Registering rules
// ---------------------------------------------------------------------------

#[test]
fn test_register_rules() {
    let rule1 = Arc::new(StubRule::<u32>::new("rule1"));
    let rule2 = Arc::new(StubRule::<u32>::new("rule2"));

    let action = Action::<u32>::new();
    action
        .register_rule(rule1.clone())
        .register_rule(rule2.clone())
        .register_rule(rule1.clone());

    assert!(action.has_rule(&rule1));
    assert!(action.has_rule(&rule2));
    assert_eq!(action.len(), 2);
}

#[test]
fn test_from_rules() {
    let rules = vec![
        Arc::new(StubRule::<u32>::new("a")),
        Arc::new(StubRule::<u32>::new("b")),
        Arc::new(StubRule::<u32>::new("c")),
    ];

    let action = Action::<u32>::from_rules(rules.iter().cloned().map(RuleHandle::plain));

    for rule in &rules {
        assert!(action.has_rule(rule));
    }
}

#[tokio::test]
async fn test_duplicate_registration_runs_once() {
    let rule = Arc::new(StubRule::<u32>::new("rule"));
    let action = Action::<u32>::new();
    action.register_rule(rule.clone()).register_rule(rule.clone());

    action.run(1).await.unwrap();

    assert_eq!(rule.call_count(), 1);
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_runs_only_rules_supporting_target() {
    let log = CallLog::new();
    let rule1 = Arc::new(StubRule::<u32>::new("rule1").logging_to(&log));
    let rule2 = Arc::new(StubRule::<u32>::never("rule2").logging_to(&log));
    let rule3 = Arc::new(StubRule::<u32>::new("rule3").logging_to(&log));

    let action = Action::<u32>::new();
    action
        .register_rule(rule1.clone())
        .register_rule(rule2.clone())
        .register_rule(rule3.clone());

    action.run(1).await.unwrap();

    assert_eq!(rule1.call_count(), 1);
    assert_eq!(rule2.call_count(), 0);
    assert_eq!(rule3.call_count(), 1);
    assert_eq!(log.starts(), vec!["rule1 > 1", "rule3 > 1"]);
}

#[tokio::test]
async fn test_random_rule_sets_run_exactly_the_supporting_ones() {
    let mut rng = fastrand::Rng::with_seed(7);

    for _ in 0..50 {
        let log = CallLog::new();
        let flags: Vec<bool> = (0..rng.usize(0..12)).map(|_| rng.bool()).collect();
        let rules: Vec<_> = flags
            .iter()
            .enumerate()
            .map(|(i, &supported)| {
                Arc::new(
                    StubRule::<u32>::new(format!("r{i}"))
                        .supports_if(move |_| supported)
                        .logging_to(&log),
                )
            })
            .collect();

        let action = Action::<u32>::from_rules(rules.iter().cloned().map(RuleHandle::plain));
        action.run(0).await.unwrap();

        let expected: Vec<String> = flags
            .iter()
            .enumerate()
            .filter(|(_, supported)| **supported)
            .map(|(i, _)| format!("r{i} > 0"))
            .collect();
        assert_eq!(log.starts(), expected);
        for (rule, &supported) in rules.iter().zip(&flags) {
            assert_eq!(rule.call_count(), usize::from(supported));
        }
    }
}

#[tokio::test]
async fn test_no_matching_rules_completes() {
    let action = Action::<u32>::new();
    action.run(1).await.unwrap();

    action.register_rule(Arc::new(StubRule::<u32>::never("never")));
    action.run(1).await.unwrap();
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Tenant {
    name: &'static str,
}

#[tokio::test]
async fn test_passes_context_to_all_rules() {
    let rule1 = Arc::new(StubRule::<u32, Tenant>::new("rule1"));
    let rule2 = Arc::new(StubRule::<u32, Tenant>::new("rule2"));

    let action = Action::<u32, Tenant>::new();
    action
        .register_context_rule(rule1.clone())
        .register_context_rule(rule2.clone())
        .register_context_rule(rule1.clone());

    let context = Tenant { name: "bar" };
    action.run_with(1, &context).await.unwrap();

    for rule in [&rule1, &rule2] {
        let calls = rule.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].target, 1);
        assert_eq!(calls[0].context, Some(context.clone()));
    }
}

#[tokio::test]
async fn test_same_context_instance_at_every_depth() {
    let rule1 = Arc::new(
        StubRule::<u32, Tenant>::new("rule1")
            .supports_only(1)
            .relates_to(vec![2]),
    );
    let rule2 = Arc::new(
        StubRule::<u32, Tenant>::new("rule2")
            .supports_only(2)
            .relates_to(vec![3]),
    );
    let rule3 = Arc::new(StubRule::<u32, Tenant>::new("rule3").supports_only(3));

    let action = Action::<u32, Tenant>::new();
    action
        .register_context_rule(rule1.clone())
        .register_context_rule(rule2.clone())
        .register_context_rule(rule3.clone());

    let context = Tenant { name: "acme" };
    action.run_with(1, &context).await.unwrap();

    let addr = &context as *const Tenant as usize;
    for rule in [&rule1, &rule2, &rule3] {
        let calls = rule.calls();
        assert_eq!(calls.len(), 1, "{}", rule.label());
        assert_eq!(calls[0].context_addr, Some(addr), "{}", rule.label());
    }
}

#[tokio::test]
async fn test_no_context_action_passes_only_target() {
    let rule1 = Arc::new(StubRule::<u32>::new("rule1").supports_only(1).relates_to(vec![2]));
    let rule2 = Arc::new(StubRule::<u32>::new("rule2").supports_only(2));

    let action = Action::<u32>::new();
    action.register_rule(rule1.clone()).register_rule(rule2.clone());

    action.run(1).await.unwrap();

    for rule in [&rule1, &rule2] {
        let calls = rule.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].context.is_none());
        assert!(calls[0].context_addr.is_none());
    }
}

// ---------------------------------------------------------------------------
// Cascade ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cascades_into_related_targets() {
    let rule1 = Arc::new(
        StubRule::<u32, Tenant>::new("rule1")
            .supports_only(1)
            .relates_to(vec![2]),
    );
    let rule2 = Arc::new(StubRule::<u32, Tenant>::new("rule2").supports_only(2));

    let action = Action::<u32, Tenant>::from_rules([
        RuleHandle::contextual(rule1.clone()),
        RuleHandle::contextual(rule2.clone()),
    ]);

    let context = Tenant { name: "bar" };
    action.run_with(1, &context).await.unwrap();

    assert_eq!(rule1.targets(), vec![1]);
    assert_eq!(rule2.targets(), vec![2]);
    assert_eq!(rule2.calls()[0].context, Some(context));
}

#[tokio::test]
async fn test_three_levels_deep() {
    let log = CallLog::new();
    let rule1 = Arc::new(
        StubRule::<u32>::new("rule1")
            .supports_only(1)
            .relates_to(vec![2])
            .logging_to(&log),
    );
    let rule2 = Arc::new(
        StubRule::<u32>::new("rule2")
            .supports_only(2)
            .relates_to(vec![3])
            .logging_to(&log),
    );
    let rule3 = Arc::new(StubRule::<u32>::new("rule3").supports_only(3).logging_to(&log));

    let action = Action::<u32>::new();
    action
        .register_rule(rule1.clone())
        .register_rule(rule2.clone())
        .register_rule(rule3.clone());

    action.run(1).await.unwrap();

    assert_eq!(log.starts(), vec!["rule1 > 1", "rule2 > 2", "rule3 > 3"]);
    assert_eq!(rule1.call_count(), 1);
    assert_eq!(rule2.call_count(), 1);
    assert_eq!(rule3.call_count(), 1);
}

#[tokio::test]
async fn test_related_targets_fully_cascade_before_next_sibling() {
    let log = CallLog::new();
    // 1 -> [2, 3], 2 -> [4]; a second rule on 1 must wait for all of it
    let fan_out = Arc::new(
        StubRule::<u32>::new("fan_out")
            .supports_only(1)
            .relates_to(vec![2, 3])
            .logging_to(&log),
    );
    let deepen = Arc::new(
        StubRule::<u32>::new("deepen")
            .supports_only(2)
            .relates_to(vec![4])
            .logging_to(&log),
    );
    let leaf = Arc::new(
        StubRule::<u32>::new("leaf")
            .supports_if(|t| *t == 3 || *t == 4)
            .logging_to(&log),
    );
    let sibling = Arc::new(StubRule::<u32>::new("sibling").supports_only(1).logging_to(&log));

    let action = Action::<u32>::new();
    action
        .register_rule(fan_out)
        .register_rule(deepen)
        .register_rule(leaf)
        .register_rule(sibling);

    action.run(1).await.unwrap();

    assert_eq!(
        log.starts(),
        vec!["fan_out > 1", "deepen > 2", "leaf > 4", "leaf > 3", "sibling > 1"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_awaits_slow_rule_before_next() {
    let log = CallLog::new();
    let rule1 = Arc::new(
        StubRule::<u32>::new("rule1")
            .delayed(Duration::from_millis(2000))
            .logging_to(&log),
    );
    let rule2 = Arc::new(StubRule::<u32>::never("rule2").logging_to(&log));
    let rule3 = Arc::new(
        StubRule::<u32>::new("rule3")
            .delayed(Duration::from_millis(500))
            .logging_to(&log),
    );

    let action = Arc::new(Action::<u32>::new());
    action
        .register_rule(rule1.clone())
        .register_rule(rule2.clone())
        .register_rule(rule3.clone());

    let start = tokio::time::Instant::now();
    let handle = tokio::spawn({
        let action = action.clone();
        async move { action.run(1).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(rule1.call_count(), 1);
    assert_eq!(rule3.call_count(), 0);
    assert!(!handle.is_finished());

    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(rule3.call_count(), 1);
    assert!(!handle.is_finished());

    handle.await.unwrap().unwrap();
    assert!(start.elapsed() >= Duration::from_millis(2500));
    assert_eq!(log.entries(), vec!["rule1 > 1", "rule1 < 1", "rule3 > 1", "rule3 < 1"]);
    assert_eq!(rule2.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_cascade_finishes_before_fast_sibling() {
    let log = CallLog::new();
    let rule1 = Arc::new(
        StubRule::<u32>::new("rule1")
            .supports_only(1)
            .relates_to(vec![2])
            .logging_to(&log),
    );
    let slow = Arc::new(
        StubRule::<u32>::new("slow")
            .supports_only(2)
            .delayed(Duration::from_secs(5))
            .logging_to(&log),
    );
    let rule3 = Arc::new(StubRule::<u32>::new("rule3").supports_only(1).logging_to(&log));

    let action = Action::<u32>::new();
    action.register_rule(rule1).register_rule(slow).register_rule(rule3);

    action.run(1).await.unwrap();

    assert_eq!(
        log.entries(),
        vec!["rule1 > 1", "rule1 < 1", "slow > 2", "slow < 2", "rule3 > 1", "rule3 < 1"]
    );
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Rejected(u32);

impl std::fmt::Display for Rejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rejected target {}", self.0)
    }
}

impl std::error::Error for Rejected {}

struct RejectingRule;

#[async_trait]
impl Rule<u32> for RejectingRule {
    fn supports(&self, target: &u32) -> bool {
        *target == 2
    }

    async fn run(&self, target: &u32) -> Result<Vec<u32>> {
        Err(Rejected(*target).into())
    }
}

#[tokio::test]
async fn test_failure_aborts_remaining_work() {
    let log = CallLog::new();
    let rule1 = Arc::new(
        StubRule::<u32>::new("rule1")
            .supports_only(1)
            .relates_to(vec![2, 3])
            .logging_to(&log),
    );
    let after = Arc::new(StubRule::<u32>::new("after").supports_if(|t| *t != 1).logging_to(&log));
    let sibling = Arc::new(StubRule::<u32>::new("sibling").supports_only(1).logging_to(&log));

    let action = Action::<u32>::new();
    action
        .register_rule(rule1.clone())
        .register_rule(Arc::new(RejectingRule))
        .register_rule(after.clone())
        .register_rule(sibling.clone());

    let err = action.run(1).await.unwrap_err();

    let rejected = err.downcast_ref::<Rejected>().expect("rule error is not wrapped");
    assert_eq!(rejected.0, 2);
    assert_eq!(log.starts(), vec!["rule1 > 1"]);
    assert_eq!(after.call_count(), 0);
    assert_eq!(sibling.call_count(), 0);
}

#[tokio::test]
async fn test_failure_message_reaches_caller() {
    let action = Action::<u32>::new();
    action.register_rule(Arc::new(StubRule::<u32>::new("broken").failing("disk full")));

    let err = action.run(1).await.unwrap_err();
    assert_eq!(err.to_string(), "disk full");
}

// ---------------------------------------------------------------------------
// Registration during a run
// ---------------------------------------------------------------------------

/// Registers `late` on the action it belongs to while running.
struct Registrar {
    action: Weak<Action<u32>>,
    late: Arc<StubRule<u32>>,
}

#[async_trait]
impl Rule<u32> for Registrar {
    fn supports(&self, target: &u32) -> bool {
        *target == 1
    }

    async fn run(&self, _: &u32) -> Result<Vec<u32>> {
        if let Some(action) = self.action.upgrade() {
            action.register_rule(self.late.clone());
        }
        Ok(vec![2])
    }
}

#[tokio::test]
async fn test_rules_registered_mid_run_apply_to_deeper_levels() {
    let late = Arc::new(StubRule::<u32>::new("late"));
    let action = Arc::new_cyclic(|weak| {
        let action = Action::<u32>::new();
        action.register_rule(Arc::new(Registrar {
            action: weak.clone(),
            late: late.clone(),
        }));
        action
    });

    action.run(1).await.unwrap();

    // not part of the snapshot taken for 1, but matched when 2 was dispatched
    assert_eq!(late.targets(), vec![2]);
    assert!(action.has_rule(&late));
}

// ---------------------------------------------------------------------------
// Concurrent top-level runs
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_concurrent_runs_keep_their_own_order() {
    let log = CallLog::new();
    let rule1 = Arc::new(
        StubRule::<u32>::new("rule1")
            .supports_if(|t| *t < 10)
            .relates(|t| vec![t * 10])
            .delayed(Duration::from_millis(300))
            .logging_to(&log),
    );
    let rule2 = Arc::new(
        StubRule::<u32>::new("rule2")
            .supports_if(|t| *t >= 10)
            .delayed(Duration::from_millis(100))
            .logging_to(&log),
    );

    let action = Action::<u32>::new();
    action.register_rule(rule1.clone()).register_rule(rule2.clone());

    let (a, b) = futures::join!(action.run(1), action.run(2));
    a.unwrap();
    b.unwrap();

    let entries = log.entries();
    let position = |entry: &str| entries.iter().position(|e| e == entry).unwrap();
    assert!(position("rule1 < 1") < position("rule2 > 10"));
    assert!(position("rule1 < 2") < position("rule2 > 20"));
    assert_eq!(rule1.call_count(), 2);
    assert_eq!(rule2.call_count(), 2);
}
