//! # Order Cancellation Demo
//!
//! Cancelling an order cascades into its line items and its invoice, and
//! voiding the invoice cascades into a customer notification. Every rule
//! appends to the audit trail carried by the context.
//!
//! Run with `RUST_LOG=cascade_core=trace` to watch the dispatch.

use anyhow::Result;
use async_trait::async_trait;
use cascade_core::ContextRule;
use cascade_module::{ActionReference, Container, ManagerReference, Module, ModuleConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

// ============================================================================
// Targets
// ============================================================================

#[derive(Debug, Clone)]
enum Entity {
    Order { id: Uuid, items: Vec<Uuid> },
    LineItem { id: Uuid, order_id: Uuid },
    Invoice { order_id: Uuid },
    Notification { order_id: Uuid, message: String },
}

// ============================================================================
// Context
// ============================================================================

struct Audit {
    actor: String,
    trail: Mutex<Vec<String>>,
}

impl Audit {
    fn new(actor: &str) -> Self {
        Self {
            actor: actor.to_string(),
            trail: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, entry: String) {
        self.trail.lock().push(format!("[{}] {}", self.actor, entry));
    }
}

// ============================================================================
// Rules
// ============================================================================

struct CancelOrder;

#[async_trait]
impl ContextRule<Entity, Audit> for CancelOrder {
    fn supports(&self, target: &Entity) -> bool {
        matches!(target, Entity::Order { .. })
    }

    async fn run(&self, target: &Entity, audit: &Audit) -> Result<Vec<Entity>> {
        let Entity::Order { id, items } = target else {
            return Ok(vec![]);
        };
        audit.record(format!("order {id} cancelled"));

        let mut related: Vec<Entity> = items
            .iter()
            .map(|item| Entity::LineItem {
                id: *item,
                order_id: *id,
            })
            .collect();
        related.push(Entity::Invoice { order_id: *id });
        Ok(related)
    }
}

struct ReleaseStock;

#[async_trait]
impl ContextRule<Entity, Audit> for ReleaseStock {
    fn supports(&self, target: &Entity) -> bool {
        matches!(target, Entity::LineItem { .. })
    }

    async fn run(&self, target: &Entity, audit: &Audit) -> Result<Vec<Entity>> {
        if let Entity::LineItem { id, order_id } = target {
            audit.record(format!("stock for item {id} of order {order_id} released"));
        }
        Ok(vec![])
    }
}

struct VoidInvoice;

#[async_trait]
impl ContextRule<Entity, Audit> for VoidInvoice {
    fn supports(&self, target: &Entity) -> bool {
        matches!(target, Entity::Invoice { .. })
    }

    async fn run(&self, target: &Entity, audit: &Audit) -> Result<Vec<Entity>> {
        let Entity::Invoice { order_id } = target else {
            return Ok(vec![]);
        };
        audit.record(format!("invoice of order {order_id} voided"));

        Ok(vec![Entity::Notification {
            order_id: *order_id,
            message: "Your order was cancelled and your invoice voided.".to_string(),
        }])
    }
}

struct NotifyCustomer;

#[async_trait]
impl ContextRule<Entity, Audit> for NotifyCustomer {
    fn supports(&self, target: &Entity) -> bool {
        matches!(target, Entity::Notification { .. })
    }

    async fn run(&self, target: &Entity, audit: &Audit) -> Result<Vec<Entity>> {
        if let Entity::Notification { order_id, message } = target {
            audit.record(format!("customer of order {order_id} notified: {message}"));
        }
        Ok(vec![])
    }
}

// ============================================================================
// Main
// ============================================================================

const CONFIG: &str = r#"{ "actions": ["cancel", "refund"], "service_prefix": "orders" }"#;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let container = Container::new();
    Module::<Entity, Audit>::with_config(ModuleConfig::from_json_str(CONFIG)?)
        .with_context_rule("cancel", Arc::new(CancelOrder))
        .with_context_rule("cancel", Arc::new(ReleaseStock))
        .with_context_rule("cancel", Arc::new(VoidInvoice))
        .with_context_rule("cancel", Arc::new(NotifyCustomer))
        .init(&container)?;

    let manager = ManagerReference::with_prefix("orders").resolve(&container)?;
    for (name, action) in manager.actions() {
        info!(action = %name, rules = action.rule_count(), "available");
    }

    let cancel = ActionReference::<Entity, Audit>::new("cancel")
        .with_prefix("orders")
        .resolve(&container)?;

    let audit = Audit::new("support-desk");
    let order = Entity::Order {
        id: Uuid::new_v4(),
        items: vec![Uuid::new_v4(), Uuid::new_v4()],
    };
    cancel.run_with(order, &audit).await?;

    for entry in audit.trail.lock().iter() {
        println!("{entry}");
    }

    Ok(())
}
