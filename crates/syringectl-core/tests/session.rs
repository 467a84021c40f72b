use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use syringectl_core::prelude::*;
use syringectl_core::protocol::{ProtocolResponse, TransportError};

/// Transport replaying canned replies and recording what was written
#[derive(Default)]
struct ScriptedTransport {
    replies: VecDeque<Vec<u8>>,
    sent: Vec<String>,
    fail_on_send: bool,
}

impl ScriptedTransport {
    fn with_replies(bodies: &[&str]) -> Self {
        Self {
            replies: bodies.iter().map(|b| frame(b)).collect(),
            ..Default::default()
        }
    }
}

impl Transport for ScriptedTransport {
    fn exchange(&mut self, out: &[u8]) -> Result<Vec<u8>, TransportError> {
        if self.fail_on_send {
            return Err(TransportError::Serial("Serial write failed".to_string()));
        }
        self.sent.push(String::from_utf8_lossy(out).into_owned());
        Ok(self.replies.pop_front().unwrap_or_default())
    }
}

fn frame(body: &str) -> Vec<u8> {
    let mut raw = vec![0x02];
    raw.extend_from_slice(body.as_bytes());
    raw.push(0x03);
    raw
}

fn session(bodies: &[&str]) -> PumpSession<ScriptedTransport> {
    PumpSession::new(ScriptedTransport::with_replies(bodies))
}

fn sent(session: &PumpSession<ScriptedTransport>) -> Vec<&str> {
    session.transport().sent.iter().map(String::as_str).collect()
}

const PUMP: PumpAddress = PumpAddress::DEFAULT;

#[test]
fn test_reverse_infuse_to_withdraw() {
    let mut s = session(&["00P", "00SINF", "00S", "00SWDR"]);
    let confirmed = s.reverse_direction(PUMP).unwrap();
    assert_eq!(confirmed, Direction::Withdraw);
    assert_eq!(sent(&s), vec!["0STP\r", "0DIR\r", "0DIRWDR\r", "0DIR\r"]);
}

#[test]
fn test_reverse_withdraw_to_infuse_when_already_stopped() {
    let mut s = session(&["00S?NA", "00SWDR", "00S", "00SINF"]);
    assert_eq!(s.reverse_direction(PUMP).unwrap(), Direction::Infuse);
    assert_eq!(sent(&s)[2], "0DIRINF\r");
}

#[test]
fn test_reverse_unknown_confirmation_is_error() {
    let mut s = session(&["00P", "00SINF", "00S", "00S"]);
    let err = s.reverse_direction(PUMP).unwrap_err();
    assert!(matches!(
        err,
        SessionError::DirectionNotConfirmed {
            expected: Direction::Withdraw,
            actual: Direction::Unknown,
        }
    ));
}

#[test]
fn test_reverse_unknown_initial_direction_issues_no_set() {
    let mut s = session(&["00P", "00S"]);
    let err = s.reverse_direction(PUMP).unwrap_err();
    assert_eq!(err.response_error(), Some(ResponseError::Unparseable));
    assert_eq!(sent(&s), vec!["0STP\r", "0DIR\r"]);
}

#[test]
fn test_reverse_propagates_stop_alarm() {
    let mut s = session(&["00A?S"]);
    let err = s.reverse_direction(PUMP).unwrap_err();
    assert!(matches!(
        err.response_error(),
        Some(ResponseError::Alarm(_))
    ));
    assert_eq!(sent(&s).len(), 1);
}

#[test]
fn test_stop_already_stopped_is_not_applicable() {
    let mut s = session(&["00S?NA"]);
    let err = s.stop(PUMP).unwrap_err();
    assert_eq!(err.response_error(), Some(ResponseError::NotApplicable));
}

#[test]
fn test_query_rate_normalises_to_microliters() {
    let mut s = session(&["00S7.500MH", "00S7.500MH"]);
    let rate = s.query_rate(PUMP).unwrap();
    assert_eq!(rate, RateValue::microliters_per_hour(7500.0));

    let native = s.query_rate_native(PUMP).unwrap();
    assert_eq!(native, RateValue::milliliters_per_hour(7.5));
}

#[test]
fn test_set_rate_switches_to_mh() {
    let mut s = session(&["00S", "00S"]);
    s.set_rate(PUMP, RateValue::microliters_per_hour(7500.0)).unwrap();
    s.set_rate(PUMP, RateValue::microliters_per_hour(1.0)).unwrap();
    assert_eq!(sent(&s), vec!["0RAT7.5MH\r", "0RAT1UH\r"]);
}

#[test]
fn test_set_rate_out_of_range() {
    let mut s = session(&["00S?OOR"]);
    let err = s.set_rate(PUMP, RateValue::microliters_per_hour(10.0)).unwrap_err();
    assert_eq!(err.response_error(), Some(ResponseError::OutOfRange));
}

#[test]
fn test_unknown_syringe_rejected_before_sending() {
    let mut s = session(&[]);
    let err = s.set_diameter_label(PUMP, "7ml").unwrap_err();
    assert!(matches!(
        err,
        SessionError::Validation(ValidationError::UnknownSyringeSize(_))
    ));
    assert!(sent(&s).is_empty());
}

#[test]
fn test_negative_rate_rejected_before_sending() {
    let mut s = session(&[]);
    let err = s
        .set_rate(PUMP, RateValue::microliters_per_hour(-5.0))
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Validation(ValidationError::InvalidMagnitude(_))
    ));
    assert!(sent(&s).is_empty());
}

#[test]
fn test_diameter_query() {
    let mut s = session(&["00S11.99", "00S12.70"]);
    let known = s.query_diameter(PUMP).unwrap();
    assert_eq!(known.size, Some(SyringeSize::Ml5));

    let unknown = s.query_diameter(PUMP).unwrap();
    assert_eq!(unknown.size, None);
    assert_eq!(unknown.raw_mm, 12.7);
}

#[test]
fn test_set_diameter_label() {
    let mut s = session(&["00S"]);
    s.set_diameter_label(PUMP, "60ml").unwrap();
    assert_eq!(sent(&s), vec!["0DIA26.59\r"]);
}

#[test]
fn test_volume_operations() {
    let mut s = session(&["00S", "00S", "00S3.14UL"]);
    s.set_volume_unit(PUMP, VolumeUnit::Microliters).unwrap();
    s.set_volume(PUMP, 3.14).unwrap();
    let reading = s.query_volume(PUMP).unwrap();
    assert_eq!(reading.value, 3.14);
    assert_eq!(reading.unit, VolumeUnit::Microliters);
    assert_eq!(sent(&s), vec!["0VOLUL\r", "0VOL3.14\r", "0VOL\r"]);
}

#[test]
fn test_dispensed() {
    let mut s = session(&["00SI1.000W0.500ML", "00S"]);
    let dispensed = s.query_dispensed(PUMP).unwrap();
    assert_eq!(dispensed.infused, 1.0);
    assert_eq!(dispensed.withdrawn, 0.5);
    assert_eq!(dispensed.unit, VolumeUnit::Milliliters);

    s.clear_dispensed(PUMP, Direction::Withdraw).unwrap();
    assert_eq!(sent(&s)[1], "0CLDWDR\r");
}

#[test]
fn test_run_returns_status() {
    let mut s = session(&["00I"]);
    assert_eq!(s.run(PUMP).unwrap(), PumpStatus::Infusing);
}

#[test]
fn test_set_address_is_broadcast() {
    let mut s = session(&["05S"]);
    let new_address = PumpAddress::new(5).unwrap();
    s.set_address(new_address, Some(19200)).unwrap();
    assert_eq!(sent(&s), vec!["*ADR5B19200\r"]);
}

#[test]
fn test_garbled_reply_is_unparseable() {
    let mut s = PumpSession::new(ScriptedTransport {
        replies: VecDeque::from(vec![b"00S10.0".to_vec()]),
        ..Default::default()
    });
    let err = s.query_rate(PUMP).unwrap_err();
    assert_eq!(err.response_error(), Some(ResponseError::Unparseable));
}

#[test]
fn test_no_reply_is_unparseable() {
    let mut s = session(&[]);
    let err = s.run(PUMP).unwrap_err();
    assert_eq!(err.response_error(), Some(ResponseError::Unparseable));
}

#[test]
fn test_transport_failure() {
    let mut s = PumpSession::new(ScriptedTransport {
        fail_on_send: true,
        ..Default::default()
    });
    assert!(matches!(s.run(PUMP), Err(SessionError::Transport(_))));
}

#[test]
fn test_batched_rates_single_frame() {
    let mut raw = frame("00S");
    raw.extend(frame("01S"));
    let mut s = PumpSession::new(ScriptedTransport {
        replies: VecDeque::from(vec![raw]),
        ..Default::default()
    });
    let responses = s
        .set_rates_batched(&[
            (PumpAddress::new(0).unwrap(), RateValue::microliters_per_hour(100.0)),
            (PumpAddress::new(1).unwrap(), RateValue::microliters_per_hour(7500.0)),
        ])
        .unwrap();
    assert_eq!(sent(&s), vec!["0RAT100UH*1RAT7.5MH\r"]);
    assert_eq!(responses.len(), 2);
    assert!(responses.iter().all(|r| !r.is_error()));
}

#[test]
fn test_exchange_raw_appends_terminator() {
    let mut s = session(&["00S?"]);
    let responses = s.exchange_raw("0FOO").unwrap();
    assert_eq!(sent(&s), vec!["0FOO\r"]);
    assert_eq!(
        responses,
        vec![ProtocolResponse::Error(ResponseError::NotUnderstood)]
    );
}

#[test]
fn test_halt_tolerates_stopped_pump() {
    let mut s = session(&["00S?NA", "00S"]);
    s.halt(PUMP).unwrap();
    assert_eq!(sent(&s), vec!["0STP\r", "0RAT0UH\r"]);
}

#[test]
fn test_prime() {
    let mut s = session(&["00S", "00I"]);
    assert_eq!(s.prime(PUMP).unwrap(), PumpStatus::Infusing);
    assert_eq!(sent(&s), vec!["0RAT10MH\r", "0RUN\r"]);
}
