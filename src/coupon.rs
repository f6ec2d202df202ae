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

//! Coupon validation.
//!
//! Validation is a pure decision over the coupon record and the candidate
//! order: checks run in a fixed order and the first failing check decides
//! the rejection reason. Validation never mutates the usage counter; a
//! redeem is a separate, explicit step taken only after real consumption.

use crate::base::Cents;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discount applied by a coupon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountRule {
    /// Percentage of the order total, floored to whole cents.
    Percentage { percent: u32 },
    /// Flat amount off.
    Fixed { amount_cents: Cents },
    /// Shipping is handled by the caller; the order discount is zero.
    FreeShipping,
}

/// A discount code and its applicability constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub rule: DiscountRule,
    pub active: bool,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_uses: Option<u32>,
    #[serde(default)]
    pub used_count: u32,
    #[serde(default)]
    pub min_order_cents: Option<Cents>,
    /// Category slugs the coupon is restricted to; empty means unrestricted.
    #[serde(default)]
    pub applicable_categories: Vec<String>,
}

/// Why a coupon was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    NotFound,
    Inactive,
    NotStarted,
    Expired,
    MaxUses,
    MinOrder,
    CategoryMismatch,
}

/// Outcome of validating a code against a candidate order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "valid", rename_all = "lowercase")]
pub enum CouponVerdict {
    #[serde(rename = "true")]
    Accepted { coupon: Coupon, discount_cents: Cents },
    #[serde(rename = "false")]
    Rejected { reason: RejectReason },
}

impl CouponVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn discount_cents(&self) -> Option<Cents> {
        match self {
            Self::Accepted { discount_cents, .. } => Some(*discount_cents),
            Self::Rejected { .. } => None,
        }
    }
}

impl Coupon {
    /// Runs the ordered applicability checks against a candidate order.
    ///
    /// Check order: inactive, not yet started, expired, uses exhausted,
    /// below minimum order amount, category mismatch. The discount is
    /// always capped at the candidate total.
    pub fn check(
        &self,
        total_cents: Cents,
        category_slugs: &[String],
        now: DateTime<Utc>,
    ) -> CouponVerdict {
        if !self.active {
            return CouponVerdict::Rejected {
                reason: RejectReason::Inactive,
            };
        }
        if let Some(from) = self.valid_from {
            if from > now {
                return CouponVerdict::Rejected {
                    reason: RejectReason::NotStarted,
                };
            }
        }
        if let Some(to) = self.valid_to {
            if to < now {
                return CouponVerdict::Rejected {
                    reason: RejectReason::Expired,
                };
            }
        }
        if let Some(max) = self.max_uses {
            if self.used_count >= max {
                return CouponVerdict::Rejected {
                    reason: RejectReason::MaxUses,
                };
            }
        }
        if let Some(min) = self.min_order_cents {
            if total_cents < min {
                return CouponVerdict::Rejected {
                    reason: RejectReason::MinOrder,
                };
            }
        }
        if !self.applicable_categories.is_empty() {
            let intersects = category_slugs
                .iter()
                .any(|slug| self.applicable_categories.contains(slug));
            if !intersects {
                return CouponVerdict::Rejected {
                    reason: RejectReason::CategoryMismatch,
                };
            }
        }

        let discount = match self.rule {
            DiscountRule::Percentage { percent } => total_cents * Cents::from(percent) / 100,
            DiscountRule::Fixed { amount_cents } => amount_cents,
            DiscountRule::FreeShipping => 0,
        };

        CouponVerdict::Accepted {
            coupon: self.clone(),
            discount_cents: discount.min(total_cents),
        }
    }
}
