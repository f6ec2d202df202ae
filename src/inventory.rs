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

//! Inventory events and the append-only journal.
//!
//! Every stock change is recorded as an immutable [`InventoryEvent`] before
//! the product record is touched; the journal is the authoritative record
//! of why stock changed. The signed delta derived from `(kind, quantity)`
//! is deterministic:
//!
//! | Kind              | Delta   |
//! |-------------------|---------|
//! | `Sale`, `Reserve` | `-|q|`  |
//! | `Return`, `Release` | `+|q|` |
//! | `Adjust`          | `q` verbatim (may be negative) |

use crate::base::{EventId, ProductId, Sku};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cause of a stock quantity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Manual correction; quantity applies verbatim and may be negative.
    Adjust,
    /// Stock sold (settlement or direct sale).
    Sale,
    /// Stock returned by a customer.
    Return,
    /// Stock held by a reservation.
    Reserve,
    /// Held stock released back to available.
    Release,
}

impl EventKind {
    /// Signed stock delta for this kind and raw quantity.
    pub fn signed_delta(self, quantity: i64) -> i64 {
        match self {
            Self::Sale | Self::Reserve => -quantity.abs(),
            Self::Return | Self::Release => quantity.abs(),
            Self::Adjust => quantity,
        }
    }
}

/// Immutable journal entry describing one stock change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryEvent {
    pub event_id: EventId,
    pub product_id: ProductId,
    pub variant_sku: Option<Sku>,
    pub kind: EventKind,
    pub quantity: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InventoryEvent {
    pub fn signed_delta(&self) -> i64 {
        self.kind.signed_delta(self.quantity)
    }
}

/// Append-only journal of inventory events.
///
/// Entries are kept in insertion order; event ids are allocated
/// monotonically by the engine, so id order and journal order agree.
#[derive(Debug, Default)]
pub struct EventJournal {
    entries: RwLock<Vec<Arc<InventoryEvent>>>,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&self, event: InventoryEvent) -> Arc<InventoryEvent> {
        let event = Arc::new(event);
        self.entries.write().push(Arc::clone(&event));
        event
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// All entries, in journal order.
    pub fn snapshot(&self) -> Vec<Arc<InventoryEvent>> {
        self.entries.read().clone()
    }

    /// Entries for one product, in journal order.
    pub fn for_product(&self, product_id: ProductId) -> Vec<Arc<InventoryEvent>> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.product_id == product_id)
            .cloned()
            .collect()
    }
}
