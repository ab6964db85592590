use chrono::{DateTime, Utc};

use super::aggregate::Order;
use super::commands::StatusCommand;
use super::errors::OrderError;
use super::value_objects::{OrderStatus, PaymentStatus};

// ============================================================================
// Order Status Workflow
// ============================================================================
//
//   pending ─→ confirmed ─→ processing ─→ shipped ─→ delivered
//      │           │             │           │ └───→ refunded
//      └───────────┴─────────────┴───────────┴─────→ cancelled
//
// Every transition, named or generic, is checked against TRANSITIONS. The
// payment axis only moves as a side effect of deliver/cancel/refund.
//
// ============================================================================

/// target status -> statuses it may be entered from
pub const TRANSITIONS: &[(OrderStatus, &[OrderStatus])] = &[
    (OrderStatus::Confirmed, &[OrderStatus::Pending]),
    (OrderStatus::Processing, &[OrderStatus::Confirmed]),
    (OrderStatus::Shipped, &[OrderStatus::Processing]),
    (OrderStatus::Delivered, &[OrderStatus::Shipped]),
    (
        OrderStatus::Cancelled,
        &[
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
        ],
    ),
    (OrderStatus::Refunded, &[OrderStatus::Shipped]),
];

/// Statuses from which `target` may be entered; empty for `pending`
pub fn sources_of(target: OrderStatus) -> &'static [OrderStatus] {
    TRANSITIONS
        .iter()
        .find(|(to, _)| *to == target)
        .map(|(_, from)| *from)
        .unwrap_or(&[])
}

pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    sources_of(to).contains(&from)
}

/// No modeled way out
pub fn is_terminal(status: OrderStatus) -> bool {
    !TRANSITIONS.iter().any(|(_, from)| from.contains(&status))
}

/// The status a named command requires the order to be in
pub fn pinned_source(command: StatusCommand) -> OrderStatus {
    // Every named command has exactly one source in the table
    sources_of(command.target())[0]
}

/// Move `order` to `target`, provided it is currently in `expected` and the
/// table allows `expected -> target`. Applies the payment and timestamp side
/// effects of the new status. On error the order is left untouched.
pub fn apply_transition(
    order: &mut Order,
    target: OrderStatus,
    expected: OrderStatus,
    now: DateTime<Utc>,
) -> Result<(), OrderError> {
    if order.order_status != expected {
        return Err(OrderError::invalid_transition(order.order_status, &[expected]));
    }
    if !can_transition(expected, target) {
        return Err(OrderError::invalid_transition(order.order_status, sources_of(target)));
    }

    match target {
        OrderStatus::Shipped => set_once(&mut order.shipped_at, now),
        OrderStatus::Delivered => {
            set_once(&mut order.delivered_at, now);
            // Cash on delivery: money changes hands with the parcel
            if order.payment_status == PaymentStatus::Pending {
                order.payment_status = PaymentStatus::Completed;
                set_once(&mut order.paid_at, now);
            }
        }
        OrderStatus::Cancelled => {
            set_once(&mut order.cancelled_at, now);
            order.payment_status = match order.payment_status {
                PaymentStatus::Completed => PaymentStatus::Refunded,
                _ => PaymentStatus::Failed,
            };
        }
        OrderStatus::Refunded => {
            if order.payment_status == PaymentStatus::Completed {
                order.payment_status = PaymentStatus::Refunded;
            }
        }
        OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Processing => {}
    }

    order.order_status = target;
    order.updated_at = now;
    Ok(())
}

/// Cancel from whatever cancellable status the order is in
pub fn apply_cancel(order: &mut Order, now: DateTime<Utc>) -> Result<(), OrderError> {
    let current = order.order_status;
    if !can_transition(current, OrderStatus::Cancelled) {
        return Err(OrderError::invalid_transition(
            current,
            sources_of(OrderStatus::Cancelled),
        ));
    }
    apply_transition(order, OrderStatus::Cancelled, current, now)
}

fn set_once(slot: &mut Option<DateTime<Utc>>, now: DateTime<Utc>) {
    if slot.is_none() {
        *slot = Some(now);
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
