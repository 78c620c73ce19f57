//! Tests for gateway status mapping and callback payload handling
//!
//! These are the pure pieces the webhook path is built from: the status code
//! mapping, the donor-facing failure reasons, and the payload flattening that
//! feeds both. None of them touch the network or the database.

use yip_backend::gateway::{failure_reason, map_payment_status, PaymentState};
use yip_backend::services::callback::{parse_callback_payload, CallbackFields};

// ---------------------------------------------------------------------------
// Status code mapping
// ---------------------------------------------------------------------------

#[test]
fn success_codes_map_to_completed() {
    assert_eq!(map_payment_status("1"), PaymentState::Completed);
    assert_eq!(map_payment_status("success"), PaymentState::Completed);
    assert_eq!(map_payment_status("paid"), PaymentState::Completed);
    assert_eq!(map_payment_status("  PAID  "), PaymentState::Completed);
}

#[test]
fn failure_codes_map_to_failed() {
    assert_eq!(map_payment_status("3"), PaymentState::Failed);
    assert_eq!(map_payment_status("failed"), PaymentState::Failed);
    assert_eq!(map_payment_status("cancelled"), PaymentState::Failed);
}

#[test]
fn in_progress_and_unknown_codes_map_to_pending() {
    assert_eq!(map_payment_status("2"), PaymentState::Pending);
    assert_eq!(map_payment_status("99"), PaymentState::Pending);
    assert_eq!(map_payment_status(""), PaymentState::Pending);
    assert_eq!(map_payment_status("0"), PaymentState::Pending);
    assert_eq!(map_payment_status("processing"), PaymentState::Pending);
    assert_eq!(map_payment_status("garbage-value"), PaymentState::Pending);
}

#[test]
fn only_explicit_success_codes_ever_complete() {
    // A gateway firmware update introducing new codes must never be able to
    // mark money as received.
    let success_codes = ["1", "success", "paid"];
    for raw in ["4", "5", "00", "ok", "done", "settled", "TRUE", "-1", "1.0"] {
        assert!(
            !success_codes.contains(&raw),
            "sample {} overlaps the success set",
            raw
        );
        assert_ne!(
            map_payment_status(raw),
            PaymentState::Completed,
            "unrecognized code {} must not complete a payment",
            raw
        );
    }
}

// ---------------------------------------------------------------------------
// Failure reasons
// ---------------------------------------------------------------------------

#[test]
fn known_failure_codes_get_friendly_messages() {
    assert_eq!(
        failure_reason(Some("insufficient_funds")),
        "Insufficient funds in the selected account"
    );
    assert_eq!(
        failure_reason(Some("user_cancelled")),
        "Payment was cancelled before completion"
    );
    assert_eq!(
        failure_reason(Some("session_expired")),
        "The payment session expired before completion"
    );
    assert_eq!(
        failure_reason(Some("card_declined")),
        "The payment was declined by the issuing bank"
    );
}

#[test]
fn unknown_reason_passes_through_unchanged() {
    assert_eq!(
        failure_reason(Some("FPX downtime window")),
        "FPX downtime window"
    );
}

#[test]
fn absent_reason_falls_back_to_generic_message() {
    assert_eq!(failure_reason(None), "Payment was not completed");
    assert_eq!(failure_reason(Some("")), "Payment was not completed");
    assert_eq!(failure_reason(Some("   ")), "Payment was not completed");
}

// ---------------------------------------------------------------------------
// Payload parsing across delivery channels
// ---------------------------------------------------------------------------

#[test]
fn json_form_and_query_bodies_flatten_to_the_same_fields() {
    let json_map = parse_callback_payload(
        Some("application/json"),
        br#"{"order_id":"YIP-AB12","status":"1","transaction_id":"TP100"}"#,
    );
    let form_map = parse_callback_payload(
        Some("application/x-www-form-urlencoded"),
        b"order_id=YIP-AB12&status=1&transaction_id=TP100",
    );
    let query_map = parse_callback_payload(None, b"order_id=YIP-AB12&status=1&transaction_id=TP100");

    for map in [&json_map, &form_map, &query_map] {
        let fields = CallbackFields::from_map(map);
        assert_eq!(fields.reference.as_deref(), Some("YIP-AB12"));
        assert_eq!(fields.status.as_deref(), Some("1"));
        assert_eq!(fields.transaction_id.as_deref(), Some("TP100"));
    }
}

#[test]
fn reference_alias_precedence_is_fixed() {
    let body = b"reference=D&payment_reference=C&refno=B&order_id=A&status=1";
    let map = parse_callback_payload(None, body);
    let fields = CallbackFields::from_map(&map);
    assert_eq!(fields.reference.as_deref(), Some("A"));

    let body = b"reference=D&payment_reference=C&refno=B&status=1";
    let map = parse_callback_payload(None, body);
    let fields = CallbackFields::from_map(&map);
    assert_eq!(fields.reference.as_deref(), Some("B"));
}

#[test]
fn blank_alias_values_are_skipped() {
    let body = b"order_id=&refno=YIP-CD34&status=3";
    let map = parse_callback_payload(None, body);
    let fields = CallbackFields::from_map(&map);
    assert_eq!(fields.reference.as_deref(), Some("YIP-CD34"));
}

#[test]
fn payload_without_any_reference_alias_yields_none() {
    let map = parse_callback_payload(Some("application/json"), br#"{"status":"1","amount":"5000"}"#);
    let fields = CallbackFields::from_map(&map);
    assert!(fields.reference.is_none());
}

#[test]
fn malformed_json_body_yields_an_empty_map() {
    let map = parse_callback_payload(Some("application/json"), b"{not json");
    assert!(map.is_empty());
}
