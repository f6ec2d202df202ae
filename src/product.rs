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

//! Stock-bearing product records.
//!
//! A [`Product`] tracks nothing but available stock; the catalog (titles,
//! prices, vendors) lives outside the engine. Stock is mutated exclusively
//! through inventory journal events, and the applied delta is clamped so
//! that stock can never be reported negative.
//!
//! # Example
//!
//! ```
//! use marketplace_engine_rs::{Product, ProductId};
//!
//! let product = Product::new(ProductId(1), 10);
//! assert_eq!(product.stock(), 10);
//! ```

use crate::base::ProductId;
use parking_lot::Mutex;
use serde::ser::{Serialize, SerializeStruct, Serializer};

#[derive(Debug)]
struct ProductData {
    product_id: ProductId,
    stock: i64,
}

impl ProductData {
    fn new(product_id: ProductId, stock: i64) -> Self {
        Self { product_id, stock }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.stock >= 0,
            "Invariant violated: stock went negative: {}",
            self.stock
        );
    }

    /// Applies a signed stock delta, clamping the result at zero.
    ///
    /// Returns the new stock level and whether the clamp engaged.
    fn apply_delta(&mut self, delta: i64) -> (i64, bool) {
        let raw = self.stock + delta;
        let clamped = raw < 0;
        self.stock = raw.max(0);
        self.assert_invariants();
        (self.stock, clamped)
    }
}

/// A product's stock record.
#[derive(Debug)]
pub struct Product {
    inner: Mutex<ProductData>,
}

impl Product {
    pub fn new(product_id: ProductId, initial_stock: i64) -> Self {
        Self {
            inner: Mutex::new(ProductData::new(product_id, initial_stock.max(0))),
        }
    }

    pub fn id(&self) -> ProductId {
        self.inner.lock().product_id
    }

    /// Currently available stock (never negative).
    pub fn stock(&self) -> i64 {
        self.inner.lock().stock
    }

    /// Applies a signed delta under the record lock.
    ///
    /// Returns `(new_stock, clamped)`; `clamped` is true when the delta
    /// would have taken stock below zero.
    pub(crate) fn apply_delta(&self, delta: i64) -> (i64, bool) {
        self.inner.lock().apply_delta(delta)
    }
}

impl Serialize for Product {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.inner.lock();
        let mut state = serializer.serialize_struct("Product", 2)?;
        state.serialize_field("product", &data.product_id)?;
        state.serialize_field("stock", &data.stock)?;
        state.end()
    }
}
