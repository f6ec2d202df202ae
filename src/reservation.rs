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

//! Time-bounded stock reservations.
//!
//! Implemented state machine:
//!
//  Active ──consume──► Consumed
//     │
//     └────release──► Expired
//!
//! Terminal states are final: a reservation is consumed or released at most
//! once, and both transitions are compare-and-set under the record lock so
//! the expiry sweep can run concurrently with live consumption.

use crate::base::{OrderId, ProductId, ReservationId, SessionId, Sku, UserId};
use crate::error::MarketError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Reservation lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Active,
    Consumed,
    Expired,
}

/// A hold on product stock pending payment completion.
///
/// Every field except `status` is fixed at creation.
#[derive(Debug)]
pub struct Reservation {
    id: ReservationId,
    product_id: ProductId,
    variant_sku: Option<Sku>,
    user_id: Option<UserId>,
    order_id: Option<OrderId>,
    session_id: Option<SessionId>,
    quantity: i64,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    status: Mutex<ReservationStatus>,
}

impl Reservation {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ReservationId,
        product_id: ProductId,
        variant_sku: Option<Sku>,
        user_id: Option<UserId>,
        order_id: Option<OrderId>,
        session_id: Option<SessionId>,
        quantity: i64,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            product_id,
            variant_sku,
            user_id,
            order_id,
            session_id,
            quantity,
            expires_at,
            created_at,
            status: Mutex::new(ReservationStatus::Active),
        }
    }

    pub fn id(&self) -> ReservationId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn variant_sku(&self) -> Option<&Sku> {
        self.variant_sku.as_ref()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> ReservationStatus {
        *self.status.lock()
    }

    pub fn is_active(&self) -> bool {
        self.status() == ReservationStatus::Active
    }

    /// True when the hold has lapsed but not yet been consumed or released.
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at < now
    }

    /// Active → Consumed, rejecting the transition from any other state.
    pub(crate) fn mark_consumed(&self) -> Result<(), MarketError> {
        let mut status = self.status.lock();
        if *status != ReservationStatus::Active {
            return Err(MarketError::ReservationClosed);
        }
        *status = ReservationStatus::Consumed;
        Ok(())
    }

    /// Active → Expired, rejecting the transition from any other state.
    pub(crate) fn mark_expired(&self) -> Result<(), MarketError> {
        let mut status = self.status.lock();
        if *status != ReservationStatus::Active {
            return Err(MarketError::ReservationClosed);
        }
        *status = ReservationStatus::Expired;
        Ok(())
    }

    pub fn snapshot(&self) -> ReservationSnapshot {
        ReservationSnapshot {
            id: self.id,
            product_id: self.product_id,
            variant_sku: self.variant_sku.clone(),
            user_id: self.user_id,
            order_id: self.order_id,
            session_id: self.session_id,
            quantity: self.quantity,
            expires_at: self.expires_at,
            created_at: self.created_at,
            status: self.status(),
        }
    }
}

/// Point-in-time copy of a reservation, for API surfaces and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationSnapshot {
    pub id: ReservationId,
    pub product_id: ProductId,
    pub variant_sku: Option<Sku>,
    pub user_id: Option<UserId>,
    pub order_id: Option<OrderId>,
    pub session_id: Option<SessionId>,
    pub quantity: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub status: ReservationStatus,
}
