// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Marketplace order processing engine.
//!
//! The [`Engine`] is the central component tying the workflow together:
//! orders create time-bounded stock holds, successful payments consume
//! those holds, and every stock change flows through the append-only
//! inventory journal.
//!
//! # Workflow
//!
//! - **Order creation**: the order is stored first, then one reservation
//!   per line item is attempted with a 15-minute hold. A failed hold never
//!   fails the order; it is logged and captured as a [`Fault`].
//! - **Payment settlement**: a `Paid` update moves the order to
//!   `Processing` and consumes the matching reservation per item
//!   (customer scope first, then anonymous holds), falling back to a
//!   direct sale event when no hold exists.
//! - **Expiry sweep**: stale holds are released back to stock one at a
//!   time; a hold that loses the race to a concurrent consume is skipped.
//!
//! # Thread Safety
//!
//! Stores are [`DashMap`]s and each record guards its own mutable state,
//! so independent requests proceed in parallel. No operation holds two
//! record locks at once.

use crate::base::{Cents, EventId, OrderId, PaymentId, ProductId, ReservationId, SessionId, Sku, UserId};
use crate::coupon::{Coupon, CouponVerdict, RejectReason};
use crate::error::MarketError;
use crate::inventory::{EventJournal, EventKind, InventoryEvent};
use crate::order::{NewOrder, Order, OrderItem, OrderSnapshot, OrderStatus};
use crate::payment::{
    self, Payment, PaymentMethod, PaymentSnapshot, PaymentTransition, PaymentUpdate,
};
use crate::product::Product;
use crate::reservation::{Reservation, ReservationSnapshot};
use chrono::{DateTime, Duration, Utc};
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// How long an order-creation hold lasts before the sweep may reclaim it.
const ORDER_HOLD_MINUTES: i64 = 15;

/// Which best-effort path failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A stock hold could not be placed during order creation.
    OrderHold,
    /// Settlement bookkeeping failed after the payment update was applied.
    Settlement,
    /// A stock decrement was clamped at zero.
    StockClamp,
    /// The expiry sweep could not release a reservation.
    Sweep,
}

/// Captured soft failure from a best-effort side effect.
///
/// Primary operations never fail because of these; the queue makes them
/// queryable instead of only visible in logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub kind: FaultKind,
    pub detail: String,
}

/// Marketplace engine managing products, reservations, orders, payments,
/// and coupons over a shared inventory journal.
///
/// # Invariants
///
/// - Product stock is mutated only by journal events and never goes
///   negative (the delta application clamps at zero).
/// - A reservation is consumed or released at most once; both transitions
///   require the current status to be `ACTIVE`.
/// - A `Paid` payment is terminal, so settlement runs at most once per
///   order no matter how often the gateway repeats itself.
/// - Consuming a reservation records the sale without a second stock
///   decrement; the stock already left available when the hold was placed.
pub struct Engine {
    products: DashMap<ProductId, Product>,
    reservations: DashMap<ReservationId, Arc<Reservation>>,
    orders: DashMap<OrderId, Arc<Order>>,
    /// Payments keyed by order: at most one record per order.
    payments: DashMap<OrderId, Arc<Payment>>,
    coupons: DashMap<String, Coupon>,
    journal: EventJournal,
    /// Soft failures from best-effort side effects, in occurrence order.
    faults: SegQueue<Fault>,
    next_event: AtomicU64,
    next_reservation: AtomicU64,
    next_order: AtomicU64,
    next_payment: AtomicU64,
}

impl Engine {
    /// Creates a new engine with no products, orders, or journal history.
    pub fn new() -> Self {
        Engine {
            products: DashMap::new(),
            reservations: DashMap::new(),
            orders: DashMap::new(),
            payments: DashMap::new(),
            coupons: DashMap::new(),
            journal: EventJournal::new(),
            faults: SegQueue::new(),
            next_event: AtomicU64::new(1),
            next_reservation: AtomicU64::new(1),
            next_order: AtomicU64::new(1),
            next_payment: AtomicU64::new(1),
        }
    }

    // === Products ===

    /// Registers a product's stock record.
    ///
    /// # Errors
    ///
    /// - [`MarketError::NegativeStock`] - Initial stock below zero.
    /// - [`MarketError::DuplicateProduct`] - Product id already registered.
    pub fn add_product(&self, product_id: ProductId, initial_stock: i64) -> Result<(), MarketError> {
        if initial_stock < 0 {
            return Err(MarketError::NegativeStock);
        }
        match self.products.entry(product_id) {
            Entry::Occupied(_) => Err(MarketError::DuplicateProduct),
            Entry::Vacant(entry) => {
                entry.insert(Product::new(product_id, initial_stock));
                Ok(())
            }
        }
    }

    /// Currently available stock, or `None` for an unregistered product.
    pub fn product_stock(&self, product_id: &ProductId) -> Option<i64> {
        self.products.get(product_id).map(|p| p.stock())
    }

    /// Returns an iterator over all product stock records.
    pub fn products(
        &self,
    ) -> impl Iterator<Item = dashmap::mapref::multiple::RefMulti<'_, ProductId, Product>> {
        self.products.iter()
    }

    /// The append-only inventory journal.
    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    // === Inventory ledger ===

    /// Records an inventory event and applies its delta to product stock.
    ///
    /// The event is appended to the journal first; if the product is not
    /// registered the event still stands as an audit record and the stock
    /// mutation is skipped. Stock is clamped at zero, and an engaged clamp
    /// is captured as a [`FaultKind::StockClamp`] fault.
    ///
    /// # Errors
    ///
    /// [`MarketError::InvalidQuantity`] - Quantity is zero.
    pub fn record_stock_event(
        &self,
        product_id: ProductId,
        variant_sku: Option<Sku>,
        kind: EventKind,
        quantity: i64,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Arc<InventoryEvent>, MarketError> {
        if quantity == 0 {
            return Err(MarketError::InvalidQuantity);
        }
        let event = self.append_event(product_id, variant_sku, kind, quantity, note, now);

        match self.products.get(&product_id) {
            Some(product) => {
                let (_, clamped) = product.apply_delta(event.signed_delta());
                if clamped {
                    self.record_fault(
                        FaultKind::StockClamp,
                        format!("product {product_id}: event {} clamped stock at zero", event.event_id),
                    );
                }
            }
            None => {
                // Audit entry stands; there is no stock record to touch.
                tracing::debug!(product = %product_id, "stock event for unregistered product");
            }
        }
        Ok(event)
    }

    /// Appends to the journal without touching stock.
    fn append_event(
        &self,
        product_id: ProductId,
        variant_sku: Option<Sku>,
        kind: EventKind,
        quantity: i64,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Arc<InventoryEvent> {
        let event_id = EventId(self.next_event.fetch_add(1, Ordering::Relaxed));
        self.journal.append(InventoryEvent {
            event_id,
            product_id,
            variant_sku,
            kind,
            quantity,
            note,
            created_at: now,
        })
    }

    // === Reservations ===

    /// Places a hold on product stock.
    ///
    /// Inserts an `ACTIVE` reservation, then raises a `RESERVE` event that
    /// decrements available stock.
    ///
    /// # Errors
    ///
    /// [`MarketError::InvalidQuantity`] - Quantity is not positive.
    #[allow(clippy::too_many_arguments)]
    pub fn reserve(
        &self,
        product_id: ProductId,
        variant_sku: Option<Sku>,
        user_id: Option<UserId>,
        order_id: Option<OrderId>,
        session_id: Option<SessionId>,
        quantity: i64,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ReservationSnapshot, MarketError> {
        if quantity <= 0 {
            return Err(MarketError::InvalidQuantity);
        }
        let id = ReservationId(self.next_reservation.fetch_add(1, Ordering::Relaxed));
        let reservation = Arc::new(Reservation::new(
            id,
            product_id,
            variant_sku.clone(),
            user_id,
            order_id,
            session_id,
            quantity,
            expires_at,
            now,
        ));
        self.reservations.insert(id, Arc::clone(&reservation));

        self.record_stock_event(
            product_id,
            variant_sku,
            EventKind::Reserve,
            quantity,
            Some(format!("reservation {id}")),
            now,
        )?;
        Ok(reservation.snapshot())
    }

    /// Consumes a hold after its payment succeeded.
    ///
    /// The sale entry records the settlement in the journal without a
    /// second stock decrement: the stock already left available when the
    /// hold was placed.
    ///
    /// # Errors
    ///
    /// - [`MarketError::ReservationNotFound`] - Unknown reservation id.
    /// - [`MarketError::ReservationClosed`] - Already consumed or released.
    pub fn consume_reservation(
        &self,
        id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<ReservationSnapshot, MarketError> {
        let reservation = self
            .reservations
            .get(&id)
            .map(|r| Arc::clone(r.value()))
            .ok_or(MarketError::ReservationNotFound)?;
        reservation.mark_consumed()?;

        self.append_event(
            reservation.product_id(),
            reservation.variant_sku().cloned(),
            EventKind::Sale,
            reservation.quantity(),
            Some(format!("settled reservation {id}")),
            now,
        );
        Ok(reservation.snapshot())
    }

    /// Releases a hold back to available stock.
    ///
    /// Used both for explicit cancellation and by the expiry sweep.
    ///
    /// # Errors
    ///
    /// - [`MarketError::ReservationNotFound`] - Unknown reservation id.
    /// - [`MarketError::ReservationClosed`] - Already consumed or released.
    pub fn release_reservation(
        &self,
        id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<ReservationSnapshot, MarketError> {
        let reservation = self
            .reservations
            .get(&id)
            .map(|r| Arc::clone(r.value()))
            .ok_or(MarketError::ReservationNotFound)?;
        reservation.mark_expired()?;

        self.record_stock_event(
            reservation.product_id(),
            reservation.variant_sku().cloned(),
            EventKind::Release,
            reservation.quantity(),
            Some(format!("released reservation {id}")),
            now,
        )?;
        Ok(reservation.snapshot())
    }

    /// Releases every `ACTIVE` hold whose expiry has passed.
    ///
    /// Holds are released one at a time so a failure on one cannot block
    /// the others; a hold that was consumed between the scan and the
    /// release is skipped. Returns the number of holds released.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let stale: Vec<ReservationId> = self
            .reservations
            .iter()
            .filter(|r| r.is_stale_at(now))
            .map(|r| r.id())
            .collect();

        let mut released = 0;
        for id in stale {
            match self.release_reservation(id, now) {
                Ok(_) => released += 1,
                // Lost the race to a concurrent consume; nothing to reclaim.
                Err(MarketError::ReservationClosed) => {}
                Err(e) => self.record_fault(FaultKind::Sweep, format!("reservation {id}: {e}")),
            }
        }
        released
    }

    pub fn get_reservation(&self, id: &ReservationId) -> Option<ReservationSnapshot> {
        self.reservations.get(id).map(|r| r.snapshot())
    }

    /// Holds placed for one order, in creation order.
    pub fn reservations_for_order(&self, order_id: OrderId) -> Vec<ReservationSnapshot> {
        let mut holds: Vec<ReservationSnapshot> = self
            .reservations
            .iter()
            .filter(|r| r.order_id() == Some(order_id))
            .map(|r| r.snapshot())
            .collect();
        holds.sort_by_key(|r| r.id.0);
        holds
    }

    /// Earliest `ACTIVE` hold on a product owned by the given user.
    pub fn active_reservation_for_user(
        &self,
        product_id: ProductId,
        user_id: UserId,
    ) -> Option<ReservationId> {
        self.earliest_active(|r| r.product_id() == product_id && r.user_id() == Some(user_id))
    }

    /// Earliest `ACTIVE` hold on a product owned by the given session.
    pub fn active_reservation_for_session(
        &self,
        product_id: ProductId,
        session_id: SessionId,
    ) -> Option<ReservationId> {
        self.earliest_active(|r| {
            r.product_id() == product_id && r.session_id() == Some(session_id)
        })
    }

    /// Earliest `ACTIVE` hold on a product not owned by any user: an
    /// anonymous-session hold or an anonymous order's hold.
    fn anonymous_hold(&self, product_id: ProductId) -> Option<ReservationId> {
        self.earliest_active(|r| r.product_id() == product_id && r.user_id().is_none())
    }

    /// Oldest matching hold wins, so ambiguous matches settle FIFO.
    fn earliest_active<F>(&self, matches: F) -> Option<ReservationId>
    where
        F: Fn(&Reservation) -> bool,
    {
        self.reservations
            .iter()
            .filter(|r| {
                let reservation = r.value().as_ref();
                reservation.is_active() && matches(reservation)
            })
            .min_by_key(|r| (r.created_at(), r.id().0))
            .map(|r| r.id())
    }

    // === Orders ===

    /// Creates an order and places a best-effort hold per line item.
    ///
    /// The order is stored first; each item then gets a reservation
    /// attempt with a 15-minute hold scoped to the order and customer. A
    /// failed attempt is logged and captured as a fault, and the order is
    /// returned successfully regardless. Totals and unit prices are
    /// trusted as supplied.
    ///
    /// # Errors
    ///
    /// [`MarketError::EmptyOrder`] - No line items.
    pub fn create_order(
        &self,
        new_order: NewOrder,
        now: DateTime<Utc>,
    ) -> Result<OrderSnapshot, MarketError> {
        if new_order.items.is_empty() {
            return Err(MarketError::EmptyOrder);
        }
        let id = OrderId(self.next_order.fetch_add(1, Ordering::Relaxed));
        let order = Arc::new(Order::new(id, new_order, now));
        self.orders.insert(id, Arc::clone(&order));

        let expires_at = now + Duration::minutes(ORDER_HOLD_MINUTES);
        for item in order.items() {
            if let Err(e) = self.reserve(
                item.product_id,
                item.variant_sku.clone(),
                order.customer_id(),
                Some(id),
                None,
                item.quantity,
                expires_at,
                now,
            ) {
                // Best effort: the order stands even when a hold fails.
                self.record_fault(
                    FaultKind::OrderHold,
                    format!("order {id}: product {}: {e}", item.product_id),
                );
            }
        }
        Ok(order.snapshot())
    }

    pub fn get_order(&self, id: &OrderId) -> Option<OrderSnapshot> {
        self.orders.get(id).map(|o| o.snapshot())
    }

    /// # Errors
    ///
    /// [`MarketError::OrderNotFound`] - Unknown order id.
    pub fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<OrderSnapshot, MarketError> {
        let order = self
            .orders
            .get(&id)
            .map(|o| Arc::clone(o.value()))
            .ok_or(MarketError::OrderNotFound)?;
        order.set_status(status);
        Ok(order.snapshot())
    }

    /// # Errors
    ///
    /// [`MarketError::OrderNotFound`] - Unknown order id.
    pub fn delete_order(&self, id: OrderId) -> Result<(), MarketError> {
        self.orders
            .remove(&id)
            .map(|_| ())
            .ok_or(MarketError::OrderNotFound)
    }

    /// Lists orders filtered by customer and status, paged. `page` is
    /// 1-based.
    pub fn list_orders(
        &self,
        customer_id: Option<UserId>,
        status: Option<OrderStatus>,
        page: usize,
        limit: usize,
    ) -> Vec<OrderSnapshot> {
        let mut orders: Vec<OrderSnapshot> = self
            .orders
            .iter()
            .map(|o| o.snapshot())
            .filter(|o| customer_id.is_none() || o.customer_id == customer_id)
            .filter(|o| status.is_none_or(|s| o.status == s))
            .collect();
        orders.sort_by_key(|o| o.id.0);
        orders
            .into_iter()
            .skip(page.saturating_sub(1) * limit)
            .take(limit)
            .collect()
    }

    // === Payments ===

    /// Records a checkout-intent payment for an existing order, or returns
    /// the one already on file.
    ///
    /// # Errors
    ///
    /// [`MarketError::OrderNotFound`] - Unknown order id.
    pub fn create_payment(
        &self,
        order_id: OrderId,
        method: PaymentMethod,
        amount_cents: Cents,
        currency: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentSnapshot, MarketError> {
        if !self.orders.contains_key(&order_id) {
            return Err(MarketError::OrderNotFound);
        }
        let payment = {
            let entry = self.payments.entry(order_id).or_insert_with(|| {
                let id = PaymentId(self.next_payment.fetch_add(1, Ordering::Relaxed));
                Arc::new(Payment::new(id, order_id, method, amount_cents, currency, now))
            });
            Arc::clone(entry.value())
        };
        Ok(payment.snapshot())
    }

    pub fn get_payment(&self, order_id: &OrderId) -> Option<PaymentSnapshot> {
        self.payments.get(order_id).map(|p| p.snapshot())
    }

    /// Applies a payment status change from a webhook or internal update.
    ///
    /// The payment record is created lazily if the webhook arrives first.
    /// Transitions are forward-only: once `Paid`, replayed successes and
    /// out-of-order failures are acknowledged without effect. On the
    /// transition to `Paid` the order moves to `Processing` and settlement
    /// runs per item: consume the customer's hold, else an anonymous hold,
    /// else record a direct sale. Settlement errors are captured as faults
    /// and never roll back the payment update.
    pub fn handle_payment_update(
        &self,
        update: PaymentUpdate,
        now: DateTime<Utc>,
    ) -> Result<PaymentSnapshot, MarketError> {
        let payment = {
            let entry = self.payments.entry(update.order_id).or_insert_with(|| {
                let id = PaymentId(self.next_payment.fetch_add(1, Ordering::Relaxed));
                Arc::new(Payment::new(
                    id,
                    update.order_id,
                    PaymentMethod::Card,
                    update.amount_cents.unwrap_or(0),
                    "USD",
                    now,
                ))
            });
            Arc::clone(entry.value())
        };

        match payment.apply_update(&update) {
            PaymentTransition::Updated { became_paid: true } => {
                self.settle_order(update.order_id, now);
            }
            PaymentTransition::Updated { became_paid: false } => {}
            PaymentTransition::Frozen => {
                tracing::debug!(order = %update.order_id, "ignoring update for settled payment");
            }
        }
        Ok(payment.snapshot())
    }

    /// Handles a signed gateway webhook.
    ///
    /// The signature is verified over the raw body before anything is
    /// trusted; on failure nothing is mutated. Event types the engine does
    /// not understand are acknowledged with `Ok(None)`.
    ///
    /// # Errors
    ///
    /// - [`MarketError::MissingWebhookSecret`] - Empty shared secret.
    /// - [`MarketError::InvalidSignature`] - Signature mismatch.
    /// - [`MarketError::MalformedPayload`] - Body is not a valid envelope.
    pub fn handle_signed_webhook(
        &self,
        payload: &[u8],
        signature_hex: &str,
        secret: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PaymentSnapshot>, MarketError> {
        if secret.is_empty() {
            return Err(MarketError::MissingWebhookSecret);
        }
        payment::verify_signature(payload, signature_hex, secret)?;

        match payment::decode_gateway_event(payload)? {
            Some(update) => Ok(Some(self.handle_payment_update(update, now)?)),
            None => Ok(None),
        }
    }

    fn settle_order(&self, order_id: OrderId, now: DateTime<Utc>) {
        let Some(order) = self.orders.get(&order_id).map(|o| Arc::clone(o.value())) else {
            self.record_fault(FaultKind::Settlement, format!("order {order_id} not found"));
            return;
        };
        order.set_status(OrderStatus::Processing);

        for item in order.items() {
            if let Err(e) = self.settle_item(&order, item, now) {
                self.record_fault(
                    FaultKind::Settlement,
                    format!("order {order_id}: product {}: {e}", item.product_id),
                );
            }
        }
    }

    fn settle_item(
        &self,
        order: &Order,
        item: &OrderItem,
        now: DateTime<Utc>,
    ) -> Result<(), MarketError> {
        if let Some(customer) = order.customer_id() {
            if let Some(id) = self.active_reservation_for_user(item.product_id, customer) {
                self.consume_reservation(id, now)?;
                return Ok(());
            }
        }
        if let Some(id) = self.anonymous_hold(item.product_id) {
            self.consume_reservation(id, now)?;
            return Ok(());
        }
        // No hold to consume: settle as a direct sale.
        self.record_stock_event(
            item.product_id,
            item.variant_sku.clone(),
            EventKind::Sale,
            item.quantity,
            Some(format!("direct sale for order {}", order.id())),
            now,
        )?;
        Ok(())
    }

    // === Coupons ===

    /// # Errors
    ///
    /// [`MarketError::DuplicateCoupon`] - Code already registered.
    pub fn add_coupon(&self, coupon: Coupon) -> Result<(), MarketError> {
        match self.coupons.entry(coupon.code.clone()) {
            Entry::Occupied(_) => Err(MarketError::DuplicateCoupon),
            Entry::Vacant(entry) => {
                entry.insert(coupon);
                Ok(())
            }
        }
    }

    pub fn get_coupon(&self, code: &str) -> Option<Coupon> {
        self.coupons.get(code).map(|c| c.clone())
    }

    /// Coupons sorted by code, optionally filtered on the active flag.
    pub fn list_coupons(&self, active: Option<bool>) -> Vec<Coupon> {
        let mut coupons: Vec<Coupon> = self
            .coupons
            .iter()
            .filter(|c| active.is_none_or(|a| c.active == a))
            .map(|c| c.clone())
            .collect();
        coupons.sort_by(|a, b| a.code.cmp(&b.code));
        coupons
    }

    /// Validates a code against a candidate order. Pure: usage counters
    /// are untouched; call [`Engine::redeem_coupon`] after real
    /// consumption.
    pub fn validate_coupon(
        &self,
        code: &str,
        total_cents: Cents,
        category_slugs: &[String],
        now: DateTime<Utc>,
    ) -> CouponVerdict {
        match self.coupons.get(code) {
            None => CouponVerdict::Rejected {
                reason: RejectReason::NotFound,
            },
            Some(coupon) => coupon.check(total_cents, category_slugs, now),
        }
    }

    /// Increments a coupon's usage counter, returning the new count.
    ///
    /// # Errors
    ///
    /// [`MarketError::CouponNotFound`] - Unknown code.
    pub fn redeem_coupon(&self, code: &str) -> Result<u32, MarketError> {
        let mut coupon = self
            .coupons
            .get_mut(code)
            .ok_or(MarketError::CouponNotFound)?;
        coupon.used_count += 1;
        Ok(coupon.used_count)
    }

    // === Faults ===

    /// Drains captured soft failures, oldest first.
    pub fn drain_faults(&self) -> Vec<Fault> {
        let mut faults = Vec::new();
        while let Some(fault) = self.faults.pop() {
            faults.push(fault);
        }
        faults
    }

    fn record_fault(&self, kind: FaultKind, detail: String) {
        tracing::warn!(kind = ?kind, %detail, "best-effort side effect failed");
        self.faults.push(Fault { kind, detail });
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
