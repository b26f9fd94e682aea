//! Protocol E packet layout and codec.
//!
//! Two fixed-layout messages travel over the link, both wrapped as
//! `STX | payload | ETX | LRC`:
//!
//! - [`Ask`] (host → terminal): 34-byte payload.
//! - [`Response`] (terminal → host): 80-byte payload with the card report, or
//!   25 bytes when the host asked for a limited answer.
//!
//! Every field is ASCII. Amounts are written in cents, zero-padded to eight
//! digits.

use crate::currency::CurrencyResolver;
use crate::ecr::lrc::{lrc, lrc_check};
use crate::error::{Result, TeliumError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

// ---------------------------------------------------------------------------
// Wire constants
// ---------------------------------------------------------------------------

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const EOT: u8 = 0x04;
pub const ENQ: u8 = 0x05;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;

/// STX + ETX + LRC.
pub const FRAME_OVERHEAD: usize = 3;

pub const ASK_PAYLOAD_SIZE: usize = 34;
pub const FULL_ANSWER_PAYLOAD_SIZE: usize = 80;
pub const LIMITED_ANSWER_PAYLOAD_SIZE: usize = 25;
pub const REPORT_SIZE: usize = 55;
pub const PRIVATE_SIZE: usize = 10;

const ANSWER_PAYLOAD_SIZES: &[usize] = &[FULL_ANSWER_PAYLOAD_SIZE, LIMITED_ANSWER_PAYLOAD_SIZE];

// ---------------------------------------------------------------------------
// Code tables
// ---------------------------------------------------------------------------

/// Size of the answer the host asks the terminal for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerFlag {
    /// Answer carries the 55-byte card/authorization report.
    Full,
    /// Answer without report.
    Limited,
}

impl AnswerFlag {
    pub fn code(self) -> char {
        match self {
            AnswerFlag::Full => '0',
            AnswerFlag::Limited => '2',
        }
    }

    pub fn from_code(code: char) -> Result<Self> {
        match code {
            '0' => Ok(AnswerFlag::Full),
            '2' => Ok(AnswerFlag::Limited),
            other => Err(TeliumError::UnrecognizedAnswerFlag(other)),
        }
    }

    /// Payload size of the answer this flag asks for.
    pub fn payload_len(self) -> usize {
        match self {
            AnswerFlag::Full => FULL_ANSWER_PAYLOAD_SIZE,
            AnswerFlag::Limited => LIMITED_ANSWER_PAYLOAD_SIZE,
        }
    }

    /// Bytes on the wire, framing included.
    pub fn frame_len(self) -> usize {
        self.payload_len() + FRAME_OVERHEAD
    }
}

/// Means of payment (ask byte 11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    Card,
    Check,
    Amex,
    Cetelem,
    Cofinoga,
    Diners,
    Franfinance,
    Jcb,
    AccordFinance,
    Moneo,
    Cup,
    FintraxEmv,
    Other,
}

impl PaymentMode {
    pub fn code(self) -> char {
        match self {
            PaymentMode::Card => '1',
            PaymentMode::Check => 'C',
            PaymentMode::Amex => '2',
            PaymentMode::Cetelem => '3',
            PaymentMode::Cofinoga => '5',
            PaymentMode::Diners => '6',
            PaymentMode::Franfinance => '8',
            PaymentMode::Jcb => '9',
            PaymentMode::AccordFinance => 'A',
            PaymentMode::Moneo => 'O',
            PaymentMode::Cup => 'U',
            PaymentMode::FintraxEmv => 'F',
            PaymentMode::Other => '0',
        }
    }
}

/// Operation requested from the terminal (ask byte 12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Debit,
    Credit,
    Refund,
    Auto,
}

impl TransactionType {
    pub fn code(self) -> char {
        match self {
            TransactionType::Debit => '0',
            TransactionType::Credit => '1',
            TransactionType::Refund => '2',
            TransactionType::Auto => '4',
        }
    }
}

impl FromStr for TransactionType {
    type Err = TeliumError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "debit" => Ok(TransactionType::Debit),
            "credit" => Ok(TransactionType::Credit),
            "refund" => Ok(TransactionType::Refund),
            "auto" => Ok(TransactionType::Auto),
            _ => Err(TeliumError::FieldFormat {
                field: "transaction_type",
                value: s.to_string(),
            }),
        }
    }
}

/// When the terminal should answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delay {
    /// Answer once the transaction is over, with a meaningful result.
    WaitForTransaction,
    /// Answer right away, without a valid status.
    Instant,
}

impl Delay {
    pub fn code(self) -> &'static str {
        match self {
            Delay::WaitForTransaction => "A010",
            Delay::Instant => "A011",
        }
    }
}

/// Whether the terminal must call the bank for every payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authorization {
    Forced,
    DeviceDecides,
}

impl Authorization {
    pub fn code(self) -> &'static str {
        match self {
            Authorization::Forced => "B011",
            Authorization::DeviceDecides => "B010",
        }
    }
}

/// Transaction result digit of a [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionResult {
    Success,
    Rejected,
    /// Timed out or could not be verified.
    NotVerified,
    Other(u8),
}

impl From<u8> for TransactionResult {
    fn from(digit: u8) -> Self {
        match digit {
            0 => TransactionResult::Success,
            7 => TransactionResult::Rejected,
            9 => TransactionResult::NotVerified,
            other => TransactionResult::Other(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// A currency amount held in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u32);

impl Amount {
    /// Smallest amount a terminal accepts (0.01).
    pub const MIN_REQUESTABLE: Amount = Amount(1);
    /// Largest amount a terminal accepts (99999.99).
    pub const MAX_REQUESTABLE: Amount = Amount(9_999_999);

    const MAX_DECIMALS: usize = 2;

    pub fn from_cents(cents: u32) -> Self {
        Amount(cents)
    }

    pub fn cents(self) -> u32 {
        self.0
    }

    /// Convert a float amount, rejecting more than two decimals.
    ///
    /// The decimal count is taken from the shortest round-trip representation,
    /// so `12.5` and `12.50` are both fine while `0.1 + 0.2` is not.
    pub fn from_f64(value: f64) -> Result<Self> {
        if !value.is_finite() || value < 0.0 {
            return Err(TeliumError::AmountOutOfRange(value.to_string()));
        }
        let repr = value.to_string();
        let decimals = repr.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0);
        if decimals > Self::MAX_DECIMALS {
            return Err(TeliumError::AmountOutOfRange(repr));
        }
        let cents = (value * 100.0).round();
        if cents > u32::MAX as f64 {
            return Err(TeliumError::AmountOutOfRange(repr));
        }
        Ok(Amount(cents as u32))
    }

    /// Within the range a terminal will accept in an ask.
    pub fn is_requestable(self) -> bool {
        (Self::MIN_REQUESTABLE..=Self::MAX_REQUESTABLE).contains(&self)
    }

    fn to_wire(self) -> String {
        format!("{:08}", self.0)
    }

    /// Eight digits: six for the integer part, two for cents.
    fn from_wire(raw: &[u8]) -> Result<Self> {
        let digits = digits("amount", raw)?;
        let cents = digits.parse::<u32>().map_err(|_| TeliumError::FieldFormat {
            field: "amount",
            value: digits.to_string(),
        })?;
        Ok(Amount(cents))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Amount {
    type Err = TeliumError;

    /// Parse `"12"`, `"12.5"` or `"12.50"`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (int_part, frac_part) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        let well_formed = !int_part.is_empty()
            && int_part.bytes().all(|b| b.is_ascii_digit())
            && frac_part.bytes().all(|b| b.is_ascii_digit());
        if !well_formed {
            return Err(TeliumError::FieldFormat {
                field: "amount",
                value: s.to_string(),
            });
        }
        if frac_part.len() > Self::MAX_DECIMALS {
            return Err(TeliumError::AmountOutOfRange(s.to_string()));
        }

        let out_of_range = || TeliumError::AmountOutOfRange(s.to_string());
        let units: u32 = int_part.parse().map_err(|_| out_of_range())?;
        let frac: u32 = format!("{frac_part:0<2}").parse().map_err(|_| out_of_range())?;
        units
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac))
            .map(Amount)
            .ok_or_else(out_of_range)
    }
}

// ---------------------------------------------------------------------------
// Ask
// ---------------------------------------------------------------------------

/// Host-to-terminal payment request.
///
/// Text fields are kept as their wire representation; [`encode_ask`] checks
/// the total width rather than trusting each field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ask {
    /// Checkout id, two digits.
    pub pos_number: String,
    pub amount: Amount,
    pub answer_flag: char,
    pub payment_mode: char,
    pub transaction_type: char,
    /// ISO 4217 numeric code, three digits.
    pub currency_numeric: String,
    /// Host-reserved, sent blank.
    pub private: String,
    pub delay: String,
    pub authorization: String,
}

/// Knobs of [`Ask::new_payment`]; defaults match the most common checkout.
#[derive(Debug, Clone, Copy)]
pub struct PaymentOptions {
    pub pos_number: u32,
    pub payment_mode: PaymentMode,
    pub wait_for_transaction_end: bool,
    pub collect_payment_source_info: bool,
    pub force_bank_verification: bool,
}

impl Default for PaymentOptions {
    fn default() -> Self {
        Self {
            pos_number: 1,
            payment_mode: PaymentMode::Card,
            wait_for_transaction_end: true,
            collect_payment_source_info: true,
            force_bank_verification: false,
        }
    }
}

impl Ask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pos_number: u32,
        amount: Amount,
        answer_flag: AnswerFlag,
        payment_mode: PaymentMode,
        transaction_type: TransactionType,
        currency_numeric: &str,
        delay: Delay,
        authorization: Authorization,
    ) -> Result<Self> {
        if !(1..=99).contains(&pos_number) {
            return Err(TeliumError::PosNumberOutOfRange(pos_number));
        }
        if !amount.is_requestable() {
            return Err(TeliumError::AmountOutOfRange(amount.to_string()));
        }
        if currency_numeric.len() != 3 || !currency_numeric.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TeliumError::FieldFormat {
                field: "currency_numeric",
                value: currency_numeric.to_string(),
            });
        }

        Ok(Self {
            pos_number: format!("{pos_number:02}"),
            amount,
            answer_flag: answer_flag.code(),
            payment_mode: payment_mode.code(),
            transaction_type: transaction_type.code(),
            currency_numeric: currency_numeric.to_string(),
            private: " ".repeat(PRIVATE_SIZE),
            delay: delay.code().to_string(),
            authorization: authorization.code().to_string(),
        })
    }

    /// Build the usual card payment ask.
    ///
    /// `currency` may be an alphabetic code (`"EUR"`) resolved through
    /// `resolver`, or already numeric (`"978"`).
    pub fn new_payment(
        amount: Amount,
        transaction_type: TransactionType,
        currency: &str,
        resolver: &dyn CurrencyResolver,
        options: PaymentOptions,
    ) -> Result<Self> {
        let currency_numeric = if currency.bytes().all(|b| b.is_ascii_digit()) {
            currency.to_string()
        } else {
            resolver.numeric_code(currency)?
        };

        Self::new(
            options.pos_number,
            amount,
            if options.collect_payment_source_info {
                AnswerFlag::Full
            } else {
                AnswerFlag::Limited
            },
            options.payment_mode,
            transaction_type,
            &currency_numeric,
            if options.wait_for_transaction_end {
                Delay::WaitForTransaction
            } else {
                Delay::Instant
            },
            if options.force_bank_verification {
                Authorization::Forced
            } else {
                Authorization::DeviceDecides
            },
        )
    }

    /// Answer size this ask requests.
    pub fn expected_answer(&self) -> Result<AnswerFlag> {
        AnswerFlag::from_code(self.answer_flag)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_ask(self)
    }

    pub fn decode(frame: &[u8]) -> Result<Self> {
        decode_ask(frame)
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Terminal-to-host transaction result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub pos_number: String,
    /// Single digit: 0 success, 7 rejected, 9 not verified.
    pub transaction_result: u8,
    pub amount: Amount,
    pub payment_mode: char,
    /// 55 bytes of card/authorization data, empty for a limited answer.
    pub report: String,
    pub currency_numeric: String,
    /// Terminal-assigned transaction id, or the echoed host value.
    pub private: String,
}

impl Response {
    pub fn outcome(&self) -> TransactionResult {
        TransactionResult::from(self.transaction_result)
    }

    pub fn has_succeeded(&self) -> bool {
        self.outcome() == TransactionResult::Success
    }

    /// Alias of `private`.
    pub fn transaction_id(&self) -> &str {
        &self.private
    }

    pub fn answer_size(&self) -> AnswerFlag {
        if self.report.is_empty() {
            AnswerFlag::Limited
        } else {
            AnswerFlag::Full
        }
    }

    /// Test and simulation use only; hosts never send responses.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_response(self)
    }

    pub fn decode(frame: &[u8]) -> Result<Self> {
        decode_response(frame)
    }
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// What to do with a received frame whose checksum does not add up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumPolicy {
    #[default]
    Strict,
    /// Log the mismatch and decode anyway, for inspection only.
    Lenient,
}

/// `STX | payload | ETX | LRC(payload + ETX)`.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    out.push(STX);
    out.extend_from_slice(payload);
    out.push(ETX);
    let checksum = lrc(&out[1..]);
    out.push(checksum);
    out
}

fn verify_checksum(frame: &[u8], policy: ChecksumPolicy) -> Result<()> {
    if lrc_check(frame) {
        return Ok(());
    }
    let (expected, actual) = match frame {
        [_, body @ .., last] => (lrc(body), *last),
        _ => (0, frame.first().copied().unwrap_or(0)),
    };
    match policy {
        ChecksumPolicy::Lenient if frame.len() >= FRAME_OVERHEAD => {
            warn!(
                "LRC mismatch tolerated (computed 0x{expected:02X}, got 0x{actual:02X}), frame kept for inspection"
            );
            Ok(())
        }
        _ => Err(TeliumError::ChecksumMismatch { expected, actual }),
    }
}

/// Payload between STX and ETX. The caller has already verified the checksum.
fn payload<'a>(frame: &'a [u8], expected: &'static [usize]) -> Result<&'a [u8]> {
    if frame.len() < FRAME_OVERHEAD {
        return Err(TeliumError::LengthMismatch {
            expected,
            actual: 0,
        });
    }
    let body = &frame[1..frame.len() - 2];
    if !expected.contains(&body.len()) {
        return Err(TeliumError::LengthMismatch {
            expected,
            actual: body.len(),
        });
    }
    Ok(body)
}

fn digits<'a>(field: &'static str, raw: &'a [u8]) -> Result<&'a str> {
    if raw.is_empty() || !raw.iter().all(u8::is_ascii_digit) {
        return Err(TeliumError::FieldFormat {
            field,
            value: String::from_utf8_lossy(raw).into_owned(),
        });
    }
    // All ASCII digits, so always valid UTF-8.
    std::str::from_utf8(raw).map_err(|_| TeliumError::FieldFormat {
        field,
        value: String::from_utf8_lossy(raw).into_owned(),
    })
}

fn text(field: &'static str, raw: &[u8]) -> Result<String> {
    if !raw.is_ascii() {
        return Err(TeliumError::FieldFormat {
            field,
            value: String::from_utf8_lossy(raw).into_owned(),
        });
    }
    Ok(String::from_utf8_lossy(raw).into_owned())
}

fn code(field: &'static str, raw: u8) -> Result<char> {
    if !raw.is_ascii() {
        return Err(TeliumError::FieldFormat {
            field,
            value: format!("0x{raw:02X}"),
        });
    }
    Ok(raw as char)
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Encode an ask into its 37-byte frame.
pub fn encode_ask(ask: &Ask) -> Result<Vec<u8>> {
    if !ask.amount.is_requestable() {
        return Err(TeliumError::AmountOutOfRange(ask.amount.to_string()));
    }

    let mut packet = Vec::with_capacity(ASK_PAYLOAD_SIZE);
    packet.extend_from_slice(ask.pos_number.as_bytes()); // 0:2
    packet.extend_from_slice(ask.amount.to_wire().as_bytes()); // 2:10
    push_char(&mut packet, ask.answer_flag); // 10
    push_char(&mut packet, ask.payment_mode); // 11
    push_char(&mut packet, ask.transaction_type); // 12
    packet.extend_from_slice(ask.currency_numeric.as_bytes()); // 13:16
    packet.extend_from_slice(ask.private.as_bytes()); // 16:26
    packet.extend_from_slice(ask.delay.as_bytes()); // 26:30
    packet.extend_from_slice(ask.authorization.as_bytes()); // 30:34

    if packet.len() != ASK_PAYLOAD_SIZE {
        return Err(TeliumError::LengthMismatch {
            expected: &[ASK_PAYLOAD_SIZE],
            actual: packet.len(),
        });
    }

    Ok(frame(&packet))
}

/// Decode an ask frame, as a simulated terminal would.
pub fn decode_ask(frame: &[u8]) -> Result<Ask> {
    verify_checksum(frame, ChecksumPolicy::Strict)?;
    let raw = payload(frame, &[ASK_PAYLOAD_SIZE])?;

    Ok(Ask {
        pos_number: digits("pos_number", &raw[0..2])?.to_string(),
        amount: Amount::from_wire(&raw[2..10])?,
        answer_flag: code("answer_flag", raw[10])?,
        payment_mode: code("payment_mode", raw[11])?,
        transaction_type: code("transaction_type", raw[12])?,
        currency_numeric: digits("currency_numeric", &raw[13..16])?.to_string(),
        private: text("private", &raw[16..26])?,
        delay: text("delay", &raw[26..30])?,
        authorization: text("authorization", &raw[30..34])?,
    })
}

/// Encode a response frame (83 or 28 bytes). Simulation use.
pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    if response.transaction_result > 9 {
        return Err(TeliumError::FieldFormat {
            field: "transaction_result",
            value: response.transaction_result.to_string(),
        });
    }

    let mut packet = Vec::with_capacity(FULL_ANSWER_PAYLOAD_SIZE);
    packet.extend_from_slice(response.pos_number.as_bytes());
    packet.push(b'0' + response.transaction_result);
    packet.extend_from_slice(response.amount.to_wire().as_bytes());
    push_char(&mut packet, response.payment_mode);
    packet.extend_from_slice(response.report.as_bytes());
    packet.extend_from_slice(response.currency_numeric.as_bytes());
    packet.extend_from_slice(response.private.as_bytes());

    if !ANSWER_PAYLOAD_SIZES.contains(&packet.len()) {
        return Err(TeliumError::LengthMismatch {
            expected: ANSWER_PAYLOAD_SIZES,
            actual: packet.len(),
        });
    }

    Ok(frame(&packet))
}

/// Decode a terminal answer, rejecting any checksum mismatch.
pub fn decode_response(frame: &[u8]) -> Result<Response> {
    decode_response_with(frame, ChecksumPolicy::Strict)
}

pub fn decode_response_with(frame: &[u8], policy: ChecksumPolicy) -> Result<Response> {
    verify_checksum(frame, policy)?;
    let raw = payload(frame, ANSWER_PAYLOAD_SIZES)?;

    let (report, currency, private) = if raw.len() == FULL_ANSWER_PAYLOAD_SIZE {
        (&raw[12..67], &raw[67..70], &raw[70..80])
    } else {
        (&raw[12..12], &raw[12..15], &raw[15..25])
    };

    let result = digits("transaction_result", &raw[2..3])?;

    Ok(Response {
        pos_number: digits("pos_number", &raw[0..2])?.to_string(),
        transaction_result: result.as_bytes()[0] - b'0',
        amount: Amount::from_wire(&raw[3..11])?,
        payment_mode: code("payment_mode", raw[11])?,
        report: text("report", report)?,
        currency_numeric: digits("currency_numeric", currency)?.to_string(),
        private: text("private", private)?,
    })
}

fn push_char(packet: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    packet.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::Iso4217;

    fn scenario_ask() -> Ask {
        Ask::new(
            1,
            Amount::from_f64(12.50).unwrap(),
            AnswerFlag::Full,
            PaymentMode::Card,
            TransactionType::Debit,
            "978",
            Delay::WaitForTransaction,
            Authorization::DeviceDecides,
        )
        .unwrap()
    }

    fn full_response() -> Response {
        Response {
            pos_number: "01".into(),
            transaction_result: 0,
            amount: Amount::from_cents(1250),
            payment_mode: '1',
            report: format!("{:<55}", "4970100000000014 0125 VISA"),
            currency_numeric: "978".into(),
            private: "0000004242".into(),
        }
    }

    fn limited_response() -> Response {
        Response {
            report: String::new(),
            transaction_result: 7,
            ..full_response()
        }
    }

    #[test]
    fn test_scenario_ask_frame_layout() {
        let encoded = encode_ask(&scenario_ask()).unwrap();
        assert_eq!(encoded.len(), 37);
        assert_eq!(encoded[0], STX);
        assert_eq!(encoded[35], ETX);
        assert_eq!(&encoded[3..11], b"00001250");
        assert_eq!(&encoded[1..3], b"01");
        assert_eq!(encoded[11], b'0'); // answer flag: full
        assert_eq!(encoded[12], b'1'); // card
        assert_eq!(encoded[13], b'0'); // debit
        assert_eq!(&encoded[14..17], b"978");
        assert_eq!(&encoded[17..27], b"          ");
        assert_eq!(&encoded[27..31], b"A010");
        assert_eq!(&encoded[31..35], b"B010");
        assert!(lrc_check(&encoded));
    }

    #[test]
    fn test_ask_round_trip() {
        let ask = scenario_ask();
        let decoded = decode_ask(&encode_ask(&ask).unwrap()).unwrap();
        assert_eq!(decoded, ask);
    }

    #[test]
    fn test_ask_round_trip_limited_instant_forced() {
        let ask = Ask::new(
            42,
            Amount::from_f64(91.1).unwrap(),
            AnswerFlag::Limited,
            PaymentMode::Check,
            TransactionType::Refund,
            "840",
            Delay::Instant,
            Authorization::Forced,
        )
        .unwrap();
        let decoded = Ask::decode(&ask.encode().unwrap()).unwrap();
        assert_eq!(decoded, ask);
        assert_eq!(decoded.pos_number, "42");
        assert_eq!(decoded.amount.cents(), 9110);
        assert_eq!(decoded.expected_answer().unwrap(), AnswerFlag::Limited);
    }

    #[test]
    fn test_amount_bounds_encode() {
        let mut ask = scenario_ask();
        ask.amount = Amount::from_f64(0.01).unwrap();
        assert!(encode_ask(&ask).is_ok());
        ask.amount = Amount::from_f64(99999.99).unwrap();
        let encoded = encode_ask(&ask).unwrap();
        assert_eq!(&encoded[3..11], b"09999999");

        ask.amount = Amount::from_f64(0.0).unwrap();
        assert!(matches!(encode_ask(&ask), Err(TeliumError::AmountOutOfRange(_))));
        ask.amount = Amount::from_f64(100000.00).unwrap();
        assert!(matches!(encode_ask(&ask), Err(TeliumError::AmountOutOfRange(_))));
    }

    #[test]
    fn test_amount_too_many_decimals() {
        assert!(matches!(
            Amount::from_f64(12.505),
            Err(TeliumError::AmountOutOfRange(_))
        ));
        assert!(matches!(
            "12.505".parse::<Amount>(),
            Err(TeliumError::AmountOutOfRange(_))
        ));
        assert!(Amount::from_f64(-1.0).is_err());
        assert!(Amount::from_f64(f64::NAN).is_err());
    }

    #[test]
    fn test_amount_rounds_float_noise() {
        assert_eq!(Amount::from_f64(0.29).unwrap().cents(), 29);
        assert_eq!(Amount::from_f64(55.1).unwrap().cents(), 5510);
        assert_eq!(Amount::from_f64(666.66).unwrap().cents(), 66666);
    }

    #[test]
    fn test_amount_parse_and_display() {
        assert_eq!("12".parse::<Amount>().unwrap().cents(), 1200);
        assert_eq!("12.5".parse::<Amount>().unwrap().cents(), 1250);
        assert_eq!("0.07".parse::<Amount>().unwrap().to_string(), "0.07");
        assert_eq!(Amount::from_cents(9_999_999).to_string(), "99999.99");
        assert!(matches!(
            "12,50".parse::<Amount>(),
            Err(TeliumError::FieldFormat { .. })
        ));
        assert!(".5".parse::<Amount>().is_err());
    }

    #[test]
    fn test_ask_new_validates() {
        let amount = Amount::from_cents(100);
        let build = |pos, currency: &str| {
            Ask::new(
                pos,
                amount,
                AnswerFlag::Full,
                PaymentMode::Card,
                TransactionType::Debit,
                currency,
                Delay::WaitForTransaction,
                Authorization::DeviceDecides,
            )
        };
        assert!(matches!(build(0, "978"), Err(TeliumError::PosNumberOutOfRange(0))));
        assert!(matches!(build(100, "978"), Err(TeliumError::PosNumberOutOfRange(100))));
        assert!(matches!(build(1, "EUR"), Err(TeliumError::FieldFormat { .. })));
        assert_eq!(build(7, "978").unwrap().pos_number, "07");
    }

    #[test]
    fn test_encode_ask_length_mismatch() {
        let mut ask = scenario_ask();
        ask.delay = "NOT USING SPECIFIED CONSTANT".into();
        assert!(matches!(
            encode_ask(&ask),
            Err(TeliumError::LengthMismatch { actual: 58, .. })
        ));
    }

    #[test]
    fn test_new_payment_defaults() {
        let ask = Ask::new_payment(
            Amount::from_f64(55.1).unwrap(),
            TransactionType::Debit,
            "eur",
            &Iso4217,
            PaymentOptions::default(),
        )
        .unwrap();
        assert_eq!(ask.pos_number, "01");
        assert_eq!(ask.currency_numeric, "978");
        assert_eq!(ask.answer_flag, '0');
        assert_eq!(ask.payment_mode, '1');
        assert_eq!(ask.transaction_type, '0');
        assert_eq!(ask.delay, "A010");
        assert_eq!(ask.authorization, "B010");
        assert_eq!(ask.private, " ".repeat(10));
    }

    #[test]
    fn test_new_payment_numeric_currency_and_options() {
        let ask = Ask::new_payment(
            Amount::from_cents(500),
            TransactionType::Refund,
            "840",
            &Iso4217,
            PaymentOptions {
                pos_number: 12,
                wait_for_transaction_end: false,
                collect_payment_source_info: false,
                force_bank_verification: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(ask.currency_numeric, "840");
        assert_eq!(ask.answer_flag, '2');
        assert_eq!(ask.delay, "A011");
        assert_eq!(ask.authorization, "B011");
        assert_eq!(ask.transaction_type, '2');
    }

    #[test]
    fn test_new_payment_unknown_currency() {
        let result = Ask::new_payment(
            Amount::from_cents(500),
            TransactionType::Debit,
            "EURO",
            &Iso4217,
            PaymentOptions::default(),
        );
        assert!(matches!(result, Err(TeliumError::UnknownCurrency(_))));
    }

    #[test]
    fn test_transaction_type_from_str() {
        assert_eq!("Debit".parse::<TransactionType>().unwrap(), TransactionType::Debit);
        assert_eq!("auto".parse::<TransactionType>().unwrap(), TransactionType::Auto);
        assert!("cash".parse::<TransactionType>().is_err());
    }

    #[test]
    fn test_answer_flag_codes() {
        assert_eq!(AnswerFlag::from_code('0').unwrap(), AnswerFlag::Full);
        assert_eq!(AnswerFlag::from_code('2').unwrap(), AnswerFlag::Limited);
        assert!(matches!(
            AnswerFlag::from_code('X'),
            Err(TeliumError::UnrecognizedAnswerFlag('X'))
        ));
        assert_eq!(AnswerFlag::Full.frame_len(), 83);
        assert_eq!(AnswerFlag::Limited.frame_len(), 28);
    }

    #[test]
    fn test_response_round_trip_full() {
        let response = full_response();
        let encoded = encode_response(&response).unwrap();
        assert_eq!(encoded.len(), 83);
        let decoded = decode_response(&encoded).unwrap();
        assert_eq!(decoded, response);
        assert!(decoded.has_succeeded());
        assert_eq!(decoded.transaction_id(), "0000004242");
        assert_eq!(decoded.answer_size(), AnswerFlag::Full);
    }

    #[test]
    fn test_response_round_trip_limited() {
        let response = limited_response();
        let encoded = response.encode().unwrap();
        assert_eq!(encoded.len(), 28);
        let decoded = Response::decode(&encoded).unwrap();
        assert_eq!(decoded, response);
        assert_eq!(decoded.report, "");
        assert_eq!(decoded.outcome(), TransactionResult::Rejected);
        assert!(!decoded.has_succeeded());
    }

    #[test]
    fn test_response_field_offsets_full() {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"05");
        payload.push(b'9');
        payload.extend_from_slice(b"00123456");
        payload.push(b'C');
        payload.extend_from_slice(&[b'R'; 55]);
        payload.extend_from_slice(b"826");
        payload.extend_from_slice(b"ABCDEFGHIJ");
        let decoded = decode_response(&frame(&payload)).unwrap();
        assert_eq!(decoded.pos_number, "05");
        assert_eq!(decoded.outcome(), TransactionResult::NotVerified);
        assert_eq!(decoded.amount.to_string(), "1234.56");
        assert_eq!(decoded.payment_mode, 'C');
        assert_eq!(decoded.report, "R".repeat(55));
        assert_eq!(decoded.currency_numeric, "826");
        assert_eq!(decoded.private, "ABCDEFGHIJ");
    }

    #[test]
    fn test_response_payload_lengths() {
        for len in [79usize, 81, 24, 26, 0] {
            let payload = vec![b'0'; len];
            assert!(
                matches!(
                    decode_response(&frame(&payload)),
                    Err(TeliumError::LengthMismatch { actual, .. }) if actual == len
                ),
                "length {len} should be rejected"
            );
        }
        assert!(decode_response(&frame(&[b'0'; 80])).is_ok());
        assert!(decode_response(&frame(&[b'0'; 25])).is_ok());
    }

    #[test]
    fn test_scenario_d_length_before_checksum() {
        let frame = frame(&[b'0'; 83]);
        assert!(lrc_check(&frame));
        assert!(matches!(
            decode_response(&frame),
            Err(TeliumError::LengthMismatch { actual: 83, .. })
        ));
    }

    #[test]
    fn test_decode_garbage_is_checksum_mismatch() {
        assert!(matches!(
            decode_response(b"ShouldNotBeDecoded"),
            Err(TeliumError::ChecksumMismatch { .. })
        ));
        assert!(matches!(
            decode_ask(b"ShouldNotBeDecoded"),
            Err(TeliumError::ChecksumMismatch { .. })
        ));
        assert!(matches!(
            decode_response(&[]),
            Err(TeliumError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_ask_wrong_length() {
        let frame = frame(b"000000000");
        assert!(matches!(
            decode_ask(&frame),
            Err(TeliumError::LengthMismatch { actual: 9, .. })
        ));
    }

    #[test]
    fn test_decode_non_digit_amount() {
        let mut payload = vec![b'0'; 25];
        payload[5] = b'X';
        assert!(matches!(
            decode_response(&frame(&payload)),
            Err(TeliumError::FieldFormat { field: "amount", .. })
        ));

        let mut payload = vec![b'0'; 25];
        payload[2] = b'-';
        assert!(matches!(
            decode_response(&frame(&payload)),
            Err(TeliumError::FieldFormat {
                field: "transaction_result",
                ..
            })
        ));
    }

    #[test]
    fn test_lenient_checksum_keeps_frame() {
        let mut frame = encode_response(&limited_response()).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(matches!(
            decode_response(&frame),
            Err(TeliumError::ChecksumMismatch { .. })
        ));
        let decoded = decode_response_with(&frame, ChecksumPolicy::Lenient).unwrap();
        assert_eq!(decoded, limited_response());
    }

    #[test]
    fn test_encode_response_rejects_bad_sizes() {
        let mut response = full_response();
        response.report = "0".repeat(54);
        assert!(matches!(
            encode_response(&response),
            Err(TeliumError::LengthMismatch { actual: 79, .. })
        ));
        response.report = "0".repeat(55);
        response.transaction_result = 12;
        assert!(matches!(
            encode_response(&response),
            Err(TeliumError::FieldFormat { .. })
        ));
    }

    #[test]
    fn test_ask_serializes_to_json() {
        let json = serde_json::to_value(scenario_ask()).unwrap();
        assert_eq!(json["pos_number"], "01");
        assert_eq!(json["amount"], 1250);
        assert_eq!(json["answer_flag"], "0");
    }
}
