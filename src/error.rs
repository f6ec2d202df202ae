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

//! Error types for marketplace operations.

use thiserror::Error;

/// Marketplace engine errors.
///
/// Split along the lines callers care about: validation failures reject the
/// request before anything is written, not-found failures are typed per
/// entity, state conflicts mean an operation raced a terminal transition,
/// and integrity failures mean an untrusted webhook payload was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    /// Quantity is zero where a non-zero quantity is required
    #[error("quantity must be non-zero")]
    InvalidQuantity,

    /// Order was submitted without any line items
    #[error("order must contain at least one item")]
    EmptyOrder,

    /// Initial stock for a product registration is negative
    #[error("initial stock cannot be negative")]
    NegativeStock,

    /// Product id is already registered
    #[error("product already registered")]
    DuplicateProduct,

    /// Referenced product does not exist
    #[error("product not found")]
    ProductNotFound,

    /// Referenced order does not exist
    #[error("order not found")]
    OrderNotFound,

    /// Referenced reservation does not exist
    #[error("reservation not found")]
    ReservationNotFound,

    /// Reservation has already been consumed or released
    #[error("reservation is no longer active")]
    ReservationClosed,

    /// No payment record exists for the order
    #[error("payment not found")]
    PaymentNotFound,

    /// Coupon code is already registered
    #[error("coupon code already exists")]
    DuplicateCoupon,

    /// Referenced coupon does not exist
    #[error("coupon not found")]
    CouponNotFound,

    /// Webhook signing secret is not configured
    #[error("webhook signing secret is not configured")]
    MissingWebhookSecret,

    /// Webhook signature did not match the payload
    #[error("webhook signature verification failed")]
    InvalidSignature,

    /// Webhook body could not be parsed
    #[error("malformed webhook payload")]
    MalformedPayload,
}
