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

//! Coupon validation matrix against the engine.

use chrono::{Duration, Utc};
use marketplace_engine_rs::{Coupon, CouponVerdict, DiscountRule, Engine, RejectReason};

fn coupon(code: &str, rule: DiscountRule) -> Coupon {
    Coupon {
        code: code.to_string(),
        rule,
        active: true,
        valid_from: None,
        valid_to: None,
        max_uses: None,
        used_count: 0,
        min_order_cents: None,
        applicable_categories: vec![],
    }
}

fn engine_with(coupons: Vec<Coupon>) -> Engine {
    let engine = Engine::new();
    for c in coupons {
        engine.add_coupon(c).unwrap();
    }
    engine
}

fn rejection(verdict: CouponVerdict) -> RejectReason {
    match verdict {
        CouponVerdict::Rejected { reason } => reason,
        CouponVerdict::Accepted { .. } => panic!("expected a rejection"),
    }
}

#[test]
fn fixed_coupon_against_larger_total() {
    // The documented reference case: FIXED 500 against 2000 applies 500.
    let engine = engine_with(vec![coupon("TEST1", DiscountRule::Fixed { amount_cents: 500 })]);

    let verdict = engine.validate_coupon("TEST1", 2000, &[], Utc::now());
    match verdict {
        CouponVerdict::Accepted {
            coupon,
            discount_cents,
        } => {
            assert_eq!(coupon.code, "TEST1");
            assert_eq!(discount_cents, 500);
        }
        CouponVerdict::Rejected { .. } => panic!("expected acceptance"),
    }
}

#[test]
fn inactive_rejects_regardless_of_other_fields() {
    let mut c = coupon("TEST1", DiscountRule::Fixed { amount_cents: 500 });
    c.active = false;
    let engine = engine_with(vec![c]);

    assert_eq!(
        rejection(engine.validate_coupon("TEST1", 2000, &[], Utc::now())),
        RejectReason::Inactive
    );
}

#[test]
fn validation_is_deterministic() {
    let engine = engine_with(vec![coupon("TEST1", DiscountRule::Fixed { amount_cents: 500 })]);
    let first = engine.validate_coupon("TEST1", 2000, &[], Utc::now());
    let second = engine.validate_coupon("TEST1", 2000, &[], Utc::now());
    assert_eq!(first, second);
}

#[test]
fn check_order_not_found_first() {
    let engine = Engine::new();
    assert_eq!(
        rejection(engine.validate_coupon("GHOST", 2000, &[], Utc::now())),
        RejectReason::NotFound
    );
}

#[test]
fn check_order_inactive_before_window() {
    let now = Utc::now();
    let mut c = coupon("C", DiscountRule::Fixed { amount_cents: 100 });
    c.active = false;
    c.valid_from = Some(now + Duration::days(1)); // also not started
    let engine = engine_with(vec![c]);

    assert_eq!(
        rejection(engine.validate_coupon("C", 2000, &[], now)),
        RejectReason::Inactive
    );
}

#[test]
fn check_order_window_before_uses() {
    let now = Utc::now();
    let mut c = coupon("C", DiscountRule::Fixed { amount_cents: 100 });
    c.valid_to = Some(now - Duration::days(1));
    c.max_uses = Some(1);
    c.used_count = 1; // also exhausted
    let engine = engine_with(vec![c]);

    assert_eq!(
        rejection(engine.validate_coupon("C", 2000, &[], now)),
        RejectReason::Expired
    );
}

#[test]
fn check_order_uses_before_minimum() {
    let mut c = coupon("C", DiscountRule::Fixed { amount_cents: 100 });
    c.max_uses = Some(1);
    c.used_count = 1;
    c.min_order_cents = Some(100_000); // also below minimum
    let engine = engine_with(vec![c]);

    assert_eq!(
        rejection(engine.validate_coupon("C", 2000, &[], Utc::now())),
        RejectReason::MaxUses
    );
}

#[test]
fn check_order_minimum_before_categories() {
    let mut c = coupon("C", DiscountRule::Fixed { amount_cents: 100 });
    c.min_order_cents = Some(100_000);
    c.applicable_categories = vec!["books".to_string()]; // also mismatched
    let engine = engine_with(vec![c]);

    assert_eq!(
        rejection(engine.validate_coupon("C", 2000, &[], Utc::now())),
        RejectReason::MinOrder
    );
}

#[test]
fn category_mismatch_is_the_last_gate() {
    let mut c = coupon("C", DiscountRule::Fixed { amount_cents: 100 });
    c.applicable_categories = vec!["books".to_string()];
    let engine = engine_with(vec![c]);

    assert_eq!(
        rejection(engine.validate_coupon("C", 2000, &["garden".to_string()], Utc::now())),
        RejectReason::CategoryMismatch
    );
    assert!(
        engine
            .validate_coupon("C", 2000, &["books".to_string()], Utc::now())
            .is_accepted()
    );
}

#[test]
fn percentage_floors_to_whole_cents() {
    let engine = engine_with(vec![coupon("PCT", DiscountRule::Percentage { percent: 15 })]);
    // 15% of 999 is 149.85, floored to 149.
    assert_eq!(
        engine
            .validate_coupon("PCT", 999, &[], Utc::now())
            .discount_cents(),
        Some(149)
    );
}

#[test]
fn discount_never_exceeds_the_total() {
    let engine = engine_with(vec![coupon(
        "BIG",
        DiscountRule::Fixed { amount_cents: 10_000 },
    )]);
    assert_eq!(
        engine
            .validate_coupon("BIG", 2500, &[], Utc::now())
            .discount_cents(),
        Some(2500)
    );
}

#[test]
fn free_shipping_has_zero_order_discount() {
    let engine = engine_with(vec![coupon("SHIP", DiscountRule::FreeShipping)]);
    assert_eq!(
        engine
            .validate_coupon("SHIP", 2500, &[], Utc::now())
            .discount_cents(),
        Some(0)
    );
}

#[test]
fn window_boundaries_are_inclusive() {
    let now = Utc::now();
    let mut c = coupon("EDGE", DiscountRule::Fixed { amount_cents: 100 });
    c.valid_from = Some(now);
    c.valid_to = Some(now);
    let engine = engine_with(vec![c]);

    assert!(engine.validate_coupon("EDGE", 2000, &[], now).is_accepted());
}

#[test]
fn minimum_order_boundary_is_inclusive() {
    let mut c = coupon("MIN", DiscountRule::Fixed { amount_cents: 100 });
    c.min_order_cents = Some(2000);
    let engine = engine_with(vec![c]);

    assert!(engine.validate_coupon("MIN", 2000, &[], Utc::now()).is_accepted());
    assert_eq!(
        rejection(engine.validate_coupon("MIN", 1999, &[], Utc::now())),
        RejectReason::MinOrder
    );
}
