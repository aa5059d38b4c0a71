//! Order processing saga over guarded calls
//!
//! A sequential workflow where every step goes through the
//! [`GuardedInvoker`] against its own target. Steps are either critical
//! (user lookup, inventory check — a fallback defect there aborts with
//! status `ERROR`) or best-effort (cache, enrichment, notification, audit —
//! failures are recorded in the report and never block progress).
//!
//! Payment runs asynchronously on the payment target's queued bulkhead while
//! enrichment executes inline; the two are independent and the workflow only
//! joins on payment after enrichment has been attempted.
//!
//! The entry point never returns an error for a dependency failure: callers
//! always get an [`OrderReport`] with an explanatory status.

use crate::error::GuardError;
use crate::invoker::GuardedInvoker;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Target name for the user directory dependency
pub const TARGET_USER: &str = "core-user-service";
/// Target name for the product cache dependency
pub const TARGET_CACHE: &str = "redis-cache";
/// Target name for the inventory dependency
pub const TARGET_INVENTORY: &str = "inventory-service";
/// Target name for the payment dependency
pub const TARGET_PAYMENT: &str = "payment-gateway";
/// Target name for the enrichment dependency
pub const TARGET_ENRICHMENT: &str = "third-party-api";
/// Target name for the notification dependency
pub const TARGET_NOTIFICATION: &str = "notification-service";
/// Target name for the audit log dependency
pub const TARGET_AUDIT: &str = "log-service";

const PAYMENT_COMPLETED: &str = "completed";
const INVENTORY_AVAILABLE: &str = "available";

/// One order to process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub user_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub payment: PaymentDetails,
}

/// Payment instrument details carried by an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub method: String,
    pub amount_cents: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl User {
    /// Substitute user returned when the directory is unreachable
    pub fn placeholder(user_id: &str) -> Self {
        Self {
            id: user_id.to_string(),
            name: "Guest User".to_string(),
            email: "guest@placeholder.invalid".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryStatus {
    pub product_id: String,
    pub available: u32,
    pub status: String,
}

impl InventoryStatus {
    /// Substitute status when the inventory service is unreachable
    pub fn unavailable(product_id: &str) -> Self {
        Self {
            product_id: product_id.to_string(),
            available: 0,
            status: "unavailable".to_string(),
        }
    }

    /// Whether this status covers the requested quantity
    pub fn in_stock(&self, quantity: u32) -> bool {
        self.status == INVENTORY_AVAILABLE && self.available >= quantity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub transaction_id: String,
    pub status: String,
    pub amount_cents: u64,
}

impl PaymentReceipt {
    /// Substitute receipt when the gateway is unreachable
    pub fn declined() -> Self {
        Self {
            transaction_id: "unavailable".to_string(),
            status: "failed".to_string(),
            amount_cents: 0,
        }
    }

    /// Whether the payment went through
    pub fn is_completed(&self) -> bool {
        self.status == PAYMENT_COMPLETED
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDetails {
    pub product_id: String,
    pub description: String,
    pub rating: f64,
}

impl ProductDetails {
    /// Substitute details when enrichment is unreachable
    pub fn minimal(product_id: &str) -> Self {
        Self {
            product_id: product_id.to_string(),
            description: "No enrichment available".to_string(),
            rating: 0.0,
        }
    }
}

/// The remote collaborators the workflow depends on.
///
/// The workflow only needs success, failure, and latency from each; how the
/// calls are made (HTTP client, cache client, …) is the implementor's
/// concern.
#[async_trait]
pub trait OrderServices: Send + Sync {
    async fn fetch_user(&self, user_id: &str) -> Result<User, GuardError>;
    async fn cached_product(&self, product_id: &str)
        -> Result<Option<ProductDetails>, GuardError>;
    async fn check_inventory(
        &self,
        product_id: &str,
        quantity: u32,
    ) -> Result<InventoryStatus, GuardError>;
    async fn charge_payment(&self, order: OrderRequest) -> Result<PaymentReceipt, GuardError>;
    async fn enrich_product(&self, product_id: &str) -> Result<ProductDetails, GuardError>;
    async fn send_notification(
        &self,
        user: &User,
        receipt: &PaymentReceipt,
    ) -> Result<(), GuardError>;
    async fn record_audit(&self, order: &OrderRequest) -> Result<(), GuardError>;
}

/// Overall result of one workflow invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Success,
    PaymentFailed,
    InsufficientInventory,
    Error,
}

/// Outcome of a single workflow step
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome<T> {
    /// The step produced a value (possibly a fallback substitute)
    Completed(T),
    /// Cache lookup found nothing; never blocks progress
    NotCached,
    /// The step was never attempted
    Skipped,
    /// The step failed; for best-effort steps this is recorded, not fatal
    Failed(String),
}

impl<T> StepOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, StepOutcome::Completed(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            StepOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// Accumulated step outcomes and overall status; immutable once returned
#[derive(Debug, Clone, Serialize)]
pub struct OrderReport {
    pub status: WorkflowStatus,
    pub user: StepOutcome<User>,
    pub cached_product: StepOutcome<ProductDetails>,
    pub inventory: StepOutcome<InventoryStatus>,
    pub payment: StepOutcome<PaymentReceipt>,
    pub product_details: StepOutcome<ProductDetails>,
    pub notification: StepOutcome<()>,
    pub audit: StepOutcome<()>,
    pub error: Option<String>,
}

impl OrderReport {
    fn new() -> Self {
        Self {
            status: WorkflowStatus::Error,
            user: StepOutcome::Skipped,
            cached_product: StepOutcome::Skipped,
            inventory: StepOutcome::Skipped,
            payment: StepOutcome::Skipped,
            product_details: StepOutcome::Skipped,
            notification: StepOutcome::Skipped,
            audit: StepOutcome::Skipped,
            error: None,
        }
    }

    fn abort(mut self, err: GuardError) -> Self {
        warn!(error = %err, "workflow aborted");
        self.status = WorkflowStatus::Error;
        self.error = Some(err.to_string());
        self
    }
}

/// Saga-style orchestrator sequencing guarded calls to distinct targets
pub struct OrderWorkflow {
    invoker: GuardedInvoker,
    services: Arc<dyn OrderServices>,
}

impl OrderWorkflow {
    pub fn new(invoker: GuardedInvoker, services: Arc<dyn OrderServices>) -> Self {
        Self { invoker, services }
    }

    /// Process one order end to end.
    ///
    /// Never returns an error for a recoverable dependency failure; the
    /// report's status field explains the outcome.
    pub async fn process_order(&self, request: OrderRequest) -> OrderReport {
        let mut report = OrderReport::new();
        info!(
            user = %request.user_id,
            product = %request.product_id,
            quantity = request.quantity,
            "processing order"
        );

        // 1. User lookup; the fallback substitutes a placeholder so an
        // unreachable directory never sinks the order.
        let services = Arc::clone(&self.services);
        let user_id = request.user_id.clone();
        let fallback_id = request.user_id.clone();
        let user = match self
            .invoker
            .execute(
                TARGET_USER,
                move || {
                    let services = Arc::clone(&services);
                    let user_id = user_id.clone();
                    async move { services.fetch_user(&user_id).await }
                },
                move |_err| Ok(User::placeholder(&fallback_id)),
            )
            .await
        {
            Ok(user) => {
                report.user = StepOutcome::Completed(user.clone());
                user
            }
            Err(err) => return report.abort(err),
        };

        // 2. Best-effort cache lookup; a miss or failure never blocks.
        let services = Arc::clone(&self.services);
        let product_id = request.product_id.clone();
        match self
            .invoker
            .execute(
                TARGET_CACHE,
                move || {
                    let services = Arc::clone(&services);
                    let product_id = product_id.clone();
                    async move { services.cached_product(&product_id).await }
                },
                |_err| Ok(None),
            )
            .await
        {
            Ok(Some(details)) => report.cached_product = StepOutcome::Completed(details),
            Ok(None) => report.cached_product = StepOutcome::NotCached,
            Err(err) => report.cached_product = StepOutcome::Failed(err.to_string()),
        }

        // 3. Inventory check; short-circuits the workflow when stock
        // cannot cover the order.
        let services = Arc::clone(&self.services);
        let product_id = request.product_id.clone();
        let fallback_pid = request.product_id.clone();
        let quantity = request.quantity;
        let inventory = match self
            .invoker
            .execute(
                TARGET_INVENTORY,
                move || {
                    let services = Arc::clone(&services);
                    let product_id = product_id.clone();
                    async move { services.check_inventory(&product_id, quantity).await }
                },
                move |_err| Ok(InventoryStatus::unavailable(&fallback_pid)),
            )
            .await
        {
            Ok(inventory) => {
                report.inventory = StepOutcome::Completed(inventory.clone());
                inventory
            }
            Err(err) => return report.abort(err),
        };

        if !inventory.in_stock(request.quantity) {
            info!(product = %request.product_id, "insufficient inventory, skipping payment");
            report.status = WorkflowStatus::InsufficientInventory;
            return report;
        }

        // 4. Payment on the queued bulkhead, enrichment inline; the two are
        // independent and run concurrently.
        let services = Arc::clone(&self.services);
        let order = request.clone();
        let payment_handle = self.invoker.execute_queued(
            TARGET_PAYMENT,
            move || {
                let services = Arc::clone(&services);
                let order = order.clone();
                async move { services.charge_payment(order).await }
            },
            |_err| Ok(PaymentReceipt::declined()),
        );

        let services = Arc::clone(&self.services);
        let product_id = request.product_id.clone();
        let fallback_pid = request.product_id.clone();
        match self
            .invoker
            .execute(
                TARGET_ENRICHMENT,
                move || {
                    let services = Arc::clone(&services);
                    let product_id = product_id.clone();
                    async move { services.enrich_product(&product_id).await }
                },
                move |_err| Ok(ProductDetails::minimal(&fallback_pid)),
            )
            .await
        {
            Ok(details) => report.product_details = StepOutcome::Completed(details),
            Err(err) => report.product_details = StepOutcome::Failed(err.to_string()),
        }

        // 5. Join payment; anything but a completed receipt ends the order.
        let receipt = match payment_handle.join().await {
            Ok(receipt) => {
                report.payment = StepOutcome::Completed(receipt.clone());
                receipt
            }
            Err(err) => {
                report.payment = StepOutcome::Failed(err.to_string());
                report.status = WorkflowStatus::PaymentFailed;
                return report;
            }
        };
        if !receipt.is_completed() {
            info!(status = %receipt.status, "payment not completed");
            report.status = WorkflowStatus::PaymentFailed;
            return report;
        }

        // 6–7. Notification and audit are best-effort: failures are
        // recorded in the report and never abort the workflow.
        let services = Arc::clone(&self.services);
        let notify_user = user.clone();
        let notify_receipt = receipt.clone();
        report.notification = self
            .best_effort(TARGET_NOTIFICATION, move || {
                let services = Arc::clone(&services);
                let user = notify_user.clone();
                let receipt = notify_receipt.clone();
                async move { services.send_notification(&user, &receipt).await }
            })
            .await;

        let services = Arc::clone(&self.services);
        let order = request.clone();
        report.audit = self
            .best_effort(TARGET_AUDIT, move || {
                let services = Arc::clone(&services);
                let order = order.clone();
                async move { services.record_audit(&order).await }
            })
            .await;

        report.status = WorkflowStatus::Success;
        info!(user = %request.user_id, "order processed");
        report
    }

    /// Run a guarded unit step where any failure, including a fallback
    /// defect, is folded into the recorded outcome.
    async fn best_effort<F, Fut>(&self, target: &str, mut op: F) -> StepOutcome<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), GuardError>>,
    {
        let result = self
            .invoker
            .execute(
                target,
                move || {
                    let fut = op();
                    async move { fut.await.map(StepOutcome::Completed) }
                },
                |err: &GuardError| Ok(StepOutcome::Failed(err.to_string())),
            )
            .await;
        match result {
            Ok(outcome) => outcome,
            Err(err) => StepOutcome::Failed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_user() {
        let user = User::placeholder("u-9");
        assert_eq!(user.id, "u-9");
        assert_eq!(user.name, "Guest User");
    }

    #[test]
    fn test_inventory_in_stock() {
        let inv = InventoryStatus {
            product_id: "p".to_string(),
            available: 5,
            status: "available".to_string(),
        };
        assert!(inv.in_stock(5));
        assert!(!inv.in_stock(6));
        assert!(!InventoryStatus::unavailable("p").in_stock(1));
    }

    #[test]
    fn test_declined_receipt_not_completed() {
        assert!(!PaymentReceipt::declined().is_completed());
    }

    #[test]
    fn test_report_serialization() {
        let mut report = OrderReport::new();
        report.status = WorkflowStatus::InsufficientInventory;
        report.cached_product = StepOutcome::NotCached;

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "INSUFFICIENT_INVENTORY");
        assert_eq!(json["cached_product"]["outcome"], "not_cached");
        assert_eq!(json["payment"]["outcome"], "skipped");
    }

    #[test]
    fn test_step_outcome_accessors() {
        let done: StepOutcome<u32> = StepOutcome::Completed(3);
        assert!(done.is_completed());
        assert_eq!(done.value(), Some(&3));

        let skipped: StepOutcome<u32> = StepOutcome::Skipped;
        assert!(!skipped.is_completed());
        assert_eq!(skipped.value(), None);
    }
}
