//! # Cascade
//!
//! Cascading rule dispatch: an action runs every rule that supports a target,
//! and every target a rule relates back is fed through the same action.
//!
//! ## Core Concepts
//!
//! - [`Rule`] / [`ContextRule`] = judge a target, process it, relate new targets
//! - [`Action`] = an ordered set of rules for one workflow, plus the cascade
//! - [`Manager`] = actions by name, so subsystems can reach each other's workflows
//!
//! ## Architecture
//!
//! ```text
//! caller
//!   │
//!   ▼ run(target, context)
//! Action ── supports(target)? ──► [rule1, rule3]      (snapshot, registration order)
//!   │
//!   ├─► rule1.run(target) ─► [t2, t3]
//!   │       │
//!   │       ├─► Action.run(t2) ─► ... (entire cascade of t2)
//!   │       └─► Action.run(t3) ─► ... (entire cascade of t3)
//!   │
//!   └─► rule3.run(target) ─► []        (starts only after rule1's cascade)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Depth-first** - a rule's whole cascade completes before the next
//!    matching rule for the same target starts
//! 2. **Sequential** - no two rules, and no two sub-cascades, run concurrently
//! 3. **Snapshot matching** - the matching set is computed once per target, at
//!    the moment the target is dispatched
//! 4. **Same context everywhere** - every rule at every depth sees the very
//!    context passed to the top-level run; no-context actions never pass one
//! 5. **Fail fast** - the first rule error aborts the run and reaches the
//!    caller unchanged
//!
//! ## Example
//!
//! ```ignore
//! use cascade_core::{async_trait, Action, Manager, Rule};
//! use std::sync::Arc;
//!
//! struct ArchiveOrder;
//!
//! #[async_trait]
//! impl Rule<Entity> for ArchiveOrder {
//!     fn supports(&self, target: &Entity) -> bool {
//!         matches!(target, Entity::Order(_))
//!     }
//!
//!     async fn run(&self, target: &Entity) -> anyhow::Result<Vec<Entity>> {
//!         // archive the order, then its invoices
//!         Ok(invoices_of(target))
//!     }
//! }
//!
//! let archive = Arc::new(Action::<Entity>::new());
//! archive.register_rule(Arc::new(ArchiveOrder));
//!
//! let manager = Manager::new();
//! manager.register_action("archive", archive);
//!
//! manager
//!     .assert_action::<Entity, ()>("archive")?
//!     .run(Entity::Order(order_id))
//!     .await?;
//! ```
//!
//! ## What This Is Not
//!
//! No persistence, no retries, no parallelism across rules, no scheduling.
//! Deadlines and cancellation belong to the caller wrapping the run.

mod action;
mod error;
mod manager;
mod rule;

// Re-export action types
pub use action::Action;

// Re-export rule contracts
pub use rule::{ContextRule, Related, Rule, RuleHandle, RuleId};

// Re-export manager types
pub use manager::{AnyAction, Manager};

// Re-export error types
pub use error::CascadeError;

// Re-export commonly used external types
pub use async_trait::async_trait;
