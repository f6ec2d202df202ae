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

//! # Marketplace Engine
//!
//! This library provides the order processing core of a multi-vendor
//! marketplace: stock reservations with expiry, payment settlement, an
//! append-only inventory ledger, and coupon validation.
//!
//! ## Core Components
//!
//! - [`Engine`]: Central processor tying orders, reservations, payments,
//!   and the inventory journal together
//! - [`Reservation`]: Time-bounded hold on product stock pending payment
//! - [`EventKind`]: Inventory event types (adjust, sale, return, reserve,
//!   release) with deterministic signed deltas
//! - [`Coupon`]: Discount codes with ordered, side-effect-free validation
//! - [`MarketError`]: Error types for workflow failures
//!
//! ## Example
//!
//! ```
//! use chrono::Utc;
//! use marketplace_engine_rs::{Engine, EventKind, ProductId};
//!
//! let engine = Engine::new();
//! engine.add_product(ProductId(1), 10).unwrap();
//!
//! // Record a direct sale of 2 units
//! engine
//!     .record_stock_event(ProductId(1), None, EventKind::Sale, 2, None, Utc::now())
//!     .unwrap();
//!
//! assert_eq!(engine.product_stock(&ProductId(1)), Some(8));
//! ```
//!
//! ## Thread Safety
//!
//! The engine handles concurrent access to its stores, allowing order
//! creation, webhook settlement, and the expiry sweep to run in parallel
//! across different records.

mod base;
pub mod coupon;
mod engine;
pub mod error;
pub mod inventory;
mod order;
pub mod payment;
pub mod product;
mod reservation;

pub use base::{
    Cents, EventId, OrderId, PaymentId, ProductId, ReservationId, SessionId, Sku, UserId,
};
pub use coupon::{Coupon, CouponVerdict, DiscountRule, RejectReason};
pub use engine::{Engine, Fault, FaultKind};
pub use error::MarketError;
pub use inventory::{EventJournal, EventKind, InventoryEvent};
pub use order::{NewOrder, Order, OrderItem, OrderSnapshot, OrderStatus};
pub use payment::{
    PaymentMethod, PaymentSnapshot, PaymentStatus, PaymentUpdate, decode_gateway_event,
    sign_payload, verify_signature,
};
pub use product::Product;
pub use reservation::{Reservation, ReservationSnapshot, ReservationStatus};
