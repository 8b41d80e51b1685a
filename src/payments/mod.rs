use chrono::Utc;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ErrorCode, FlowError};
use crate::models::{
    delivery_method, order_status, payment_status, payout_status, NewOrder, NewPayment, Order,
    Payment, SellerProfile, DELIVERY_CLAIM_PROCESSING,
};
use crate::schema::{orders, payments, seller_profiles};
use crate::shipments;
use crate::state::AppState;

pub const PAYMENT_PROVIDER: &str = "yookassa";

#[derive(Debug, Clone)]
pub struct StartPaymentInput {
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    // client-generated idempotency key, unique per (buyer, key)
    pub attempt_key: String,
    pub amount: i64,
    pub currency: String,
    pub delivery_method: String,
    pub pickup_point_id: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StartPaymentOutcome {
    pub order_id: Uuid,
    pub payment_id: Uuid,
    pub payment_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookStatus {
    Succeeded,
    Failed,
    Cancelled,
}

impl WebhookStatus {
    // Bare words and `payment.`-prefixed events only. Other event families
    // (refund.*, payout.*) must not settle orders.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        let bare = match normalized.split_once('.') {
            Some(("payment", rest)) => rest,
            Some(_) => return None,
            None => normalized.as_str(),
        };
        match bare {
            "succeeded" | "success" | "paid" => Some(WebhookStatus::Succeeded),
            "failed" | "failure" | "error" => Some(WebhookStatus::Failed),
            "canceled" | "cancelled" => Some(WebhookStatus::Cancelled),
            _ => None,
        }
    }
}

// Idempotent on (buyer_id, attempt_key): a retried call lands on the same
// order, payment and payment URL.
pub async fn start_payment(
    state: &AppState,
    input: StartPaymentInput,
) -> Result<StartPaymentOutcome, FlowError> {
    let attempt_key = input.attempt_key.trim().to_string();
    if attempt_key.is_empty() {
        return Err(FlowError::new(
            ErrorCode::ValidationError,
            "field `attempt_key` must not be empty",
        ));
    }
    if input.amount <= 0 {
        return Err(FlowError::new(
            ErrorCode::ValidationError,
            "field `amount` must be positive",
        ));
    }
    if input.delivery_method != delivery_method::PICKUP_POINT
        && input.delivery_method != delivery_method::COURIER
    {
        return Err(FlowError::new(
            ErrorCode::ValidationError,
            format!("unknown delivery method `{}`", input.delivery_method),
        ));
    }

    let mut conn = state.db_flow()?;

    if let Some(existing) = existing_outcome(&mut conn, input.buyer_id, &attempt_key)? {
        info!(order_id = %existing.order_id, "start_payment replayed for known attempt key");
        return Ok(existing);
    }

    // a new order needs a shippable seller
    let profile: Option<SellerProfile> = seller_profiles::table
        .find(input.seller_id)
        .first(&mut conn)
        .optional()?;
    let has_dropoff = profile
        .as_ref()
        .and_then(|p| p.dropoff_station_id.as_deref())
        .map(str::trim)
        .is_some_and(|v| !v.is_empty());
    if !has_dropoff {
        return Err(FlowError::new(
            ErrorCode::SellerDropoffPvzRequired,
            "seller has no configured default dropoff point",
        ));
    }

    let order_id = Uuid::new_v4();
    let payment_id = Uuid::new_v4();
    let payment_url = format!("{}/pay/{}", state.config.payment_base_url, payment_id);

    let inserted = conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::insert_into(orders::table)
            .values(&NewOrder {
                id: order_id,
                buyer_id: input.buyer_id,
                seller_id: input.seller_id,
                status: order_status::PENDING_PAYMENT.to_string(),
                payout_status: payout_status::HOLD.to_string(),
                payment_attempt_key: attempt_key.clone(),
                payment_id: Some(payment_id),
                delivery_method: input.delivery_method.clone(),
                pickup_point_id: input.pickup_point_id.clone(),
                amount: input.amount,
                currency: input.currency.clone(),
            })
            .execute(conn)?;
        diesel::insert_into(payments::table)
            .values(&NewPayment {
                id: payment_id,
                order_id,
                provider: PAYMENT_PROVIDER.to_string(),
                status: payment_status::PENDING.to_string(),
                amount: input.amount,
                currency: input.currency.clone(),
                payload: json!({ "payment_url": payment_url }),
            })
            .execute(conn)?;
        Ok(())
    });

    match inserted {
        Ok(()) => Ok(StartPaymentOutcome {
            order_id,
            payment_id,
            payment_url,
        }),
        // unique (buyer_id, attempt_key) index: the losing insert replays
        // the winner's rows
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            existing_outcome(&mut conn, input.buyer_id, &attempt_key)?.ok_or_else(|| {
                FlowError::internal("attempt key collision without a stored order")
            })
        }
        Err(err) => Err(err.into()),
    }
}

fn existing_outcome(
    conn: &mut PgConnection,
    buyer_id: Uuid,
    attempt_key: &str,
) -> Result<Option<StartPaymentOutcome>, FlowError> {
    let order: Option<Order> = orders::table
        .filter(orders::buyer_id.eq(buyer_id))
        .filter(orders::payment_attempt_key.eq(attempt_key))
        .first(conn)
        .optional()?;
    let Some(order) = order else {
        return Ok(None);
    };

    let payment: Payment = payments::table
        .filter(payments::order_id.eq(order.id))
        .order(payments::created_at.desc())
        .first(conn)?;

    let payment_url = payment
        .payment_url()
        .ok_or_else(|| FlowError::internal("payment row has no payment_url in payload"))?
        .to_string();

    Ok(Some(StartPaymentOutcome {
        order_id: order.id,
        payment_id: payment.id,
        payment_url,
    }))
}

// Notifications arrive at-least-once, duplicated, out of order and
// concurrently; every path here is idempotent.
pub async fn process_webhook(
    state: &AppState,
    payment_id: Uuid,
    status: WebhookStatus,
) -> Result<(), FlowError> {
    match status {
        WebhookStatus::Succeeded => handle_success(state, payment_id).await,
        WebhookStatus::Failed => handle_failure(state, payment_id, order_status::PAYMENT_FAILED),
        WebhookStatus::Cancelled => handle_failure(state, payment_id, order_status::CANCELLED),
    }
}

// Manual settlement trigger, same code path as the real webhook.
pub async fn mock_success(state: &AppState, payment_id: Uuid) -> Result<(), FlowError> {
    process_webhook(state, payment_id, WebhookStatus::Succeeded).await
}

async fn handle_success(state: &AppState, payment_id: Uuid) -> Result<(), FlowError> {
    // settlement and the delivery-creation claim commit together; the
    // carrier is only called after commit
    let claimed_order: Option<Order> = {
        let mut conn = state.db_flow()?;
        conn.transaction::<_, FlowError, _>(|conn| {
            let payment: Option<Payment> = payments::table
                .find(payment_id)
                .first(conn)
                .optional()?;
            let payment = payment.ok_or_else(|| {
                FlowError::new(ErrorCode::PaymentNotFound, "payment not found")
            })?;
            let order: Order = orders::table.find(payment.order_id).first(conn)?;

            diesel::update(payments::table.find(payment.id))
                .set((
                    payments::status.eq(payment_status::SUCCEEDED),
                    payments::updated_at.eq(Utc::now().naive_utc()),
                ))
                .execute(conn)?;

            if order.paid_at.is_some() {
                // duplicate notification
                return Ok(None);
            }

            diesel::update(orders::table.find(order.id))
                .set((
                    orders::status.eq(order_status::PAID),
                    orders::paid_at.eq(Some(Utc::now().naive_utc())),
                    orders::payout_status.eq(payout_status::HOLD),
                    orders::payment_id.eq(Some(payment.id)),
                    orders::updated_at.eq(Utc::now().naive_utc()),
                ))
                .execute(conn)?;

            // exactly one settling transaction observes one affected row
            let claimed = diesel::update(
                orders::table
                    .find(order.id)
                    .filter(orders::delivery_request_id.is_null()),
            )
            .set(orders::delivery_request_id.eq(Some(DELIVERY_CLAIM_PROCESSING)))
            .execute(conn)?;

            if claimed == 1 {
                Ok(Some(order))
            } else {
                Ok(None)
            }
        })?
    };

    let Some(order) = claimed_order else {
        return Ok(());
    };

    match shipments::ready_to_ship(state, order.seller_id, order.id).await {
        Ok(shipment) => {
            let mut conn = state.db_flow()?;
            diesel::update(
                orders::table
                    .find(order.id)
                    .filter(orders::delivery_request_id.eq(DELIVERY_CLAIM_PROCESSING)),
            )
            .set((
                orders::delivery_request_id.eq(shipment.request_id.clone()),
                orders::status.eq(order_status::READY_FOR_SHIPMENT),
                orders::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(&mut conn)?;
            info!(order_id = %order.id, shipment_id = %shipment.id, "delivery request created after settlement");
        }
        Err(err) => {
            // settlement stands; the claim is released for a later retry
            warn!(order_id = %order.id, error = %err, "delivery creation failed after settlement");
            let mut conn = state.db_flow()?;
            diesel::update(
                orders::table
                    .find(order.id)
                    .filter(orders::delivery_request_id.eq(DELIVERY_CLAIM_PROCESSING)),
            )
            .set((
                orders::delivery_request_id.eq::<Option<String>>(None),
                orders::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(&mut conn)?;
        }
    }

    Ok(())
}

fn handle_failure(
    state: &AppState,
    payment_id: Uuid,
    terminal_order_status: &'static str,
) -> Result<(), FlowError> {
    let mut conn = state.db_flow()?;
    conn.transaction::<_, FlowError, _>(|conn| {
        let payment: Option<Payment> = payments::table
            .find(payment_id)
            .first(conn)
            .optional()?;
        let payment = payment
            .ok_or_else(|| FlowError::new(ErrorCode::PaymentNotFound, "payment not found"))?;

        diesel::update(payments::table.find(payment.id))
            .set((
                payments::status.eq(payment_status::FAILED),
                payments::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        let order: Order = orders::table.find(payment.order_id).first(conn)?;
        if order.paid_at.is_some() {
            // a late failure must never downgrade a settled order
            warn!(order_id = %order.id, "ignoring failure notification for already-paid order");
            return Ok(());
        }

        diesel::update(orders::table.find(order.id))
            .set((
                orders::status.eq(terminal_order_status),
                orders::payout_status.eq(payout_status::BLOCKED),
                orders::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        Ok(())
    })
}
