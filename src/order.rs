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

//! Orders and line items.
//!
//! Orders trust their caller-supplied totals and unit prices: nothing is
//! recomputed or cross-checked against the catalog. Items are immutable
//! after creation; only the status field changes over an order's life.

use crate::base::{Cents, OrderId, ProductId, Sku, UserId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Order lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

/// One line of an order, denormalized at checkout time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub vendor_id: Option<UserId>,
    pub title: Option<String>,
    pub variant_sku: Option<Sku>,
    pub unit_price_cents: Cents,
    pub quantity: i64,
}

/// Input for creating an order.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub customer_id: Option<UserId>,
    pub items: Vec<OrderItem>,
    pub total_cents: Cents,
    pub shipping_address: Option<String>,
    pub coupon_code: Option<String>,
}

/// An order record; everything but the status is fixed at creation.
#[derive(Debug)]
pub struct Order {
    id: OrderId,
    customer_id: Option<UserId>,
    items: Vec<OrderItem>,
    total_cents: Cents,
    shipping_address: Option<String>,
    coupon_code: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    status: Mutex<OrderStatus>,
}

impl Order {
    pub(crate) fn new(
        id: OrderId,
        new_order: NewOrder,
        created_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            id,
            customer_id: new_order.customer_id,
            items: new_order.items,
            total_cents: new_order.total_cents,
            shipping_address: new_order.shipping_address,
            coupon_code: new_order.coupon_code,
            created_at,
            status: Mutex::new(OrderStatus::Pending),
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn customer_id(&self) -> Option<UserId> {
        self.customer_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total_cents(&self) -> Cents {
        self.total_cents
    }

    pub fn status(&self) -> OrderStatus {
        *self.status.lock()
    }

    pub(crate) fn set_status(&self, status: OrderStatus) {
        *self.status.lock() = status;
    }

    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            id: self.id,
            customer_id: self.customer_id,
            items: self.items.clone(),
            total_cents: self.total_cents,
            shipping_address: self.shipping_address.clone(),
            coupon_code: self.coupon_code.clone(),
            created_at: self.created_at,
            status: self.status(),
        }
    }
}

/// Point-in-time copy of an order, for API surfaces and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub customer_id: Option<UserId>,
    pub items: Vec<OrderItem>,
    pub total_cents: Cents,
    pub shipping_address: Option<String>,
    pub coupon_code: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub status: OrderStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_order(items: Vec<OrderItem>, total_cents: Cents) -> Order {
        Order::new(
            OrderId(1),
            NewOrder {
                customer_id: Some(UserId(5)),
                items,
                total_cents,
                shipping_address: Some("1 Main St".to_string()),
                coupon_code: None,
            },
            Utc::now(),
        )
    }

    fn item(product: u32, quantity: i64, unit_price_cents: Cents) -> OrderItem {
        OrderItem {
            product_id: ProductId(product),
            vendor_id: None,
            title: None,
            variant_sku: None,
            unit_price_cents,
            quantity,
        }
    }

    #[test]
    fn new_order_starts_pending() {
        let order = make_order(vec![item(1, 2, 500)], 1000);
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn total_is_trusted_not_recomputed() {
        // 2 x 500 is 1000, but the caller said 999 and the caller wins.
        let order = make_order(vec![item(1, 2, 500)], 999);
        assert_eq!(order.total_cents(), 999);
    }

    #[test]
    fn status_update_is_visible_in_snapshot() {
        let order = make_order(vec![item(1, 1, 100)], 100);
        order.set_status(OrderStatus::Processing);

        let snap = order.snapshot();
        assert_eq!(snap.status, OrderStatus::Processing);
        assert_eq!(snap.items.len(), 1);
    }

    #[test]
    fn status_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Processing).unwrap(),
            "\"PROCESSING\""
        );
    }
}
