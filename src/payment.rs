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

//! Payment records and gateway webhook decoding.
//!
//! A payment is keyed by its order: at most one record per order, created
//! at checkout intent or lazily when the first webhook arrives. Status
//! transitions are forward-only — once `Paid`, later updates (a replayed
//! success, an out-of-order failure) are acknowledged without effect, which
//! makes settlement idempotent against repeated webhook delivery.
//!
//! Gateway payloads come in two shapes:
//! - a signed raw body, verified with HMAC-SHA256 against a shared secret
//!   before anything is trusted;
//! - a fallback parsed JSON body:
//!   `{orderId, status, transactionRef?, gateway?, amountCents?}`.

use crate::base::{Cents, OrderId, PaymentId};
use crate::error::MarketError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Payment lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    Wallet,
    BankTransfer,
    CashOnDelivery,
}

#[derive(Debug)]
struct PaymentState {
    status: PaymentStatus,
    gateway: Option<String>,
    transaction_ref: Option<String>,
}

/// Payment record for one order.
#[derive(Debug)]
pub struct Payment {
    id: PaymentId,
    order_id: OrderId,
    method: PaymentMethod,
    amount_cents: Cents,
    currency: String,
    created_at: DateTime<Utc>,
    state: Mutex<PaymentState>,
}

/// Result of applying a gateway update to a payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PaymentTransition {
    /// Status moved; true when the payment just became `Paid`.
    Updated { became_paid: bool },
    /// The payment was already `Paid`; the update was ignored.
    Frozen,
}

impl Payment {
    pub(crate) fn new(
        id: PaymentId,
        order_id: OrderId,
        method: PaymentMethod,
        amount_cents: Cents,
        currency: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_id,
            method,
            amount_cents,
            currency: currency.into(),
            created_at,
            state: Mutex::new(PaymentState {
                status: PaymentStatus::Pending,
                gateway: None,
                transaction_ref: None,
            }),
        }
    }

    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn status(&self) -> PaymentStatus {
        self.state.lock().status
    }

    /// Applies a gateway update under the record lock.
    ///
    /// `Paid` is terminal: any update arriving afterwards is reported as
    /// [`PaymentTransition::Frozen`] and changes nothing. The transaction
    /// reference and gateway name are write-once (first gateway wins).
    pub(crate) fn apply_update(&self, update: &PaymentUpdate) -> PaymentTransition {
        let mut state = self.state.lock();
        if state.status == PaymentStatus::Paid {
            return PaymentTransition::Frozen;
        }
        state.status = update.status;
        if state.transaction_ref.is_none() {
            state.transaction_ref = update.transaction_ref.clone();
        }
        if state.gateway.is_none() {
            state.gateway = update.gateway.clone();
        }
        PaymentTransition::Updated {
            became_paid: update.status == PaymentStatus::Paid,
        }
    }

    pub fn snapshot(&self) -> PaymentSnapshot {
        let state = self.state.lock();
        PaymentSnapshot {
            id: self.id,
            order_id: self.order_id,
            method: self.method,
            amount_cents: self.amount_cents,
            currency: self.currency.clone(),
            gateway: state.gateway.clone(),
            transaction_ref: state.transaction_ref.clone(),
            status: state.status,
            created_at: self.created_at,
        }
    }
}

/// Point-in-time copy of a payment, for API surfaces and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentSnapshot {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub method: PaymentMethod,
    pub amount_cents: Cents,
    pub currency: String,
    pub gateway: Option<String>,
    pub transaction_ref: Option<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// Payment status change, from a webhook or an internal update.
///
/// This is the documented fallback wire shape, hence the camelCase keys.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentUpdate {
    pub order_id: OrderId,
    pub status: PaymentStatus,
    #[serde(default)]
    pub transaction_ref: Option<String>,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub amount_cents: Option<Cents>,
}

/// Raw gateway webhook envelope.
#[derive(Debug, Deserialize)]
struct GatewayEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: GatewayEventData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayEventData {
    order_id: OrderId,
    #[serde(default)]
    transaction_ref: Option<String>,
    #[serde(default)]
    gateway: Option<String>,
    #[serde(default)]
    amount_cents: Option<Cents>,
}

/// Verifies an HMAC-SHA256 hex signature over a raw webhook body.
///
/// # Errors
///
/// [`MarketError::InvalidSignature`] when the signature is not valid hex or
/// does not match the payload.
pub fn verify_signature(
    payload: &[u8],
    signature_hex: &str,
    secret: &str,
) -> Result<(), MarketError> {
    let signature =
        hex::decode(signature_hex.trim()).map_err(|_| MarketError::InvalidSignature)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| MarketError::MissingWebhookSecret)?;
    mac.update(payload);
    mac.verify_slice(&signature)
        .map_err(|_| MarketError::InvalidSignature)
}

/// Signs a payload the way the gateway does. Mostly useful for tests and
/// local tooling.
pub fn sign_payload(payload: &[u8], secret: &str) -> String {
    // new_from_slice accepts any key length for HMAC.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Decodes a verified gateway payload into an internal update.
///
/// Returns `Ok(None)` for event types the engine does not understand —
/// those are acknowledged, never treated as errors.
///
/// # Errors
///
/// [`MarketError::MalformedPayload`] when the body is not a valid envelope.
pub fn decode_gateway_event(payload: &[u8]) -> Result<Option<PaymentUpdate>, MarketError> {
    let envelope: GatewayEnvelope =
        serde_json::from_slice(payload).map_err(|_| MarketError::MalformedPayload)?;

    let status = match envelope.event_type.as_str() {
        "payment.succeeded" => PaymentStatus::Paid,
        "payment.failed" => PaymentStatus::Failed,
        _ => return Ok(None),
    };

    Ok(Some(PaymentUpdate {
        order_id: envelope.data.order_id,
        status,
        transaction_ref: envelope.data.transaction_ref,
        gateway: envelope.data.gateway,
        amount_cents: envelope.data.amount_cents,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_payment() -> Payment {
        Payment::new(
            PaymentId(1),
            OrderId(10),
            PaymentMethod::Card,
            2500,
            "USD",
            Utc::now(),
        )
    }

    fn paid_update(transaction_ref: Option<&str>) -> PaymentUpdate {
        PaymentUpdate {
            order_id: OrderId(10),
            status: PaymentStatus::Paid,
            transaction_ref: transaction_ref.map(String::from),
            gateway: Some("stripe".to_string()),
            amount_cents: Some(2500),
        }
    }

    #[test]
    fn update_to_paid_reports_became_paid() {
        let payment = make_payment();
        let transition = payment.apply_update(&paid_update(Some("tx_1")));
        assert_eq!(transition, PaymentTransition::Updated { became_paid: true });
        assert_eq!(payment.status(), PaymentStatus::Paid);
    }

    #[test]
    fn paid_is_terminal() {
        let payment = make_payment();
        payment.apply_update(&paid_update(Some("tx_1")));

        // Replayed success: frozen.
        assert_eq!(
            payment.apply_update(&paid_update(Some("tx_2"))),
            PaymentTransition::Frozen
        );
        // Out-of-order failure: frozen too.
        let failed = PaymentUpdate {
            status: PaymentStatus::Failed,
            ..paid_update(None)
        };
        assert_eq!(payment.apply_update(&failed), PaymentTransition::Frozen);
        assert_eq!(payment.status(), PaymentStatus::Paid);
    }

    #[test]
    fn failed_then_paid_is_allowed() {
        let payment = make_payment();
        let failed = PaymentUpdate {
            status: PaymentStatus::Failed,
            ..paid_update(None)
        };
        assert_eq!(
            payment.apply_update(&failed),
            PaymentTransition::Updated { became_paid: false }
        );
        assert_eq!(
            payment.apply_update(&paid_update(Some("tx_retry"))),
            PaymentTransition::Updated { became_paid: true }
        );
    }

    #[test]
    fn transaction_ref_is_write_once() {
        let payment = make_payment();
        let failed = PaymentUpdate {
            status: PaymentStatus::Failed,
            ..paid_update(Some("tx_first"))
        };
        payment.apply_update(&failed);
        payment.apply_update(&paid_update(Some("tx_second")));

        let snap = payment.snapshot();
        assert_eq!(snap.transaction_ref.as_deref(), Some("tx_first"));
    }

    #[test]
    fn signature_roundtrip() {
        let payload = br#"{"type":"payment.succeeded","data":{"orderId":1}}"#;
        let signature = sign_payload(payload, "whsec_test");
        verify_signature(payload, &signature, "whsec_test").unwrap();
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let payload = br#"{"type":"payment.succeeded","data":{"orderId":1}}"#;
        let signature = sign_payload(payload, "whsec_test");
        let tampered = br#"{"type":"payment.succeeded","data":{"orderId":2}}"#;
        assert_eq!(
            verify_signature(tampered, &signature, "whsec_test"),
            Err(MarketError::InvalidSignature)
        );
    }

    #[test]
    fn garbage_signature_fails_verification() {
        assert_eq!(
            verify_signature(b"{}", "not-hex!", "whsec_test"),
            Err(MarketError::InvalidSignature)
        );
    }

    #[test]
    fn decodes_succeeded_event() {
        let payload = br#"{
            "type": "payment.succeeded",
            "data": {"orderId": 42, "transactionRef": "tx_9", "gateway": "stripe", "amountCents": 1200}
        }"#;
        let update = decode_gateway_event(payload).unwrap().unwrap();
        assert_eq!(update.order_id, OrderId(42));
        assert_eq!(update.status, PaymentStatus::Paid);
        assert_eq!(update.transaction_ref.as_deref(), Some("tx_9"));
        assert_eq!(update.amount_cents, Some(1200));
    }

    #[test]
    fn decodes_failed_event() {
        let payload = br#"{"type": "payment.failed", "data": {"orderId": 42}}"#;
        let update = decode_gateway_event(payload).unwrap().unwrap();
        assert_eq!(update.status, PaymentStatus::Failed);
    }

    #[test]
    fn unknown_event_type_is_acknowledged_as_none() {
        let payload = br#"{"type": "customer.created", "data": {"orderId": 42}}"#;
        assert_eq!(decode_gateway_event(payload).unwrap(), None);
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert_eq!(
            decode_gateway_event(b"not json"),
            Err(MarketError::MalformedPayload)
        );
    }

    #[test]
    fn fallback_shape_parses_camel_case() {
        let body = br#"{"orderId": 7, "status": "PAID", "transactionRef": "tx_1"}"#;
        let update: PaymentUpdate = serde_json::from_slice(body).unwrap();
        assert_eq!(update.order_id, OrderId(7));
        assert_eq!(update.status, PaymentStatus::Paid);
        assert_eq!(update.gateway, None);
    }
}
