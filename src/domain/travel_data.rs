//! Ledger rows and the field rules applied to client payloads.
//!
//! Clients send loosely shaped JSON. [`TravelDataPatch::from_json`] checks every
//! known field's type, drops `null` values, and ignores fields the client may not
//! set (`id`, `owner_id`, timestamps).

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::Type;
use time::{
    Date, Month, OffsetDateTime, format_description::BorrowedFormatItem,
    macros::format_description,
};
use uuid::Uuid;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const MAX_TEXT_LEN: usize = 512;

/// Flight state of the booked segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Type)]
#[sqlx(type_name = "flight_status")]
pub enum FlightStatus {
    #[default]
    Coming,
    Gone,
    Cancelled,
}

impl FlightStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coming => "Coming",
            Self::Gone => "Gone",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl Display for FlightStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlightStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Coming" => Ok(Self::Coming),
            "Gone" => Ok(Self::Gone),
            "Cancelled" => Ok(Self::Cancelled),
            _ => Err(()),
        }
    }
}

/// Settlement state of the customer payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Type)]
#[sqlx(type_name = "payment_status")]
pub enum PaymentStatus {
    Paid,
    #[default]
    Pending,
    Partial,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paid => "Paid",
            Self::Pending => "Pending",
            Self::Partial => "Partial",
        }
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Paid" => Ok(Self::Paid),
            "Pending" => Ok(Self::Pending),
            "Partial" => Ok(Self::Partial),
            _ => Err(()),
        }
    }
}

/// One stored ledger transaction row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelDataRecord {
    pub id: Uuid,
    pub session_id: Option<String>,
    pub date: String,
    pub voucher: String,
    pub reference: Option<String>,
    pub narration: Option<String>,
    pub debit: f64,
    pub credit: f64,
    pub balance: f64,
    pub customer_name: String,
    pub route: String,
    pub pnr: String,
    pub flying_date: Option<String>,
    pub flight_status: FlightStatus,
    pub customer_rate: f64,
    pub company_rate: f64,
    pub profit: f64,
    pub payment_status: PaymentStatus,
    pub owner_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A field-level validation failure reported back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Prefix the field path, e.g. `records[2].` + `voucher`.
    pub fn nested(self, prefix: &str) -> Self {
        Self {
            field: format!("{prefix}{}", self.field),
            message: self.message,
        }
    }
}

/// Client-settable fields, each optional. `None` means "leave unchanged".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TravelDataPatch {
    pub session_id: Option<String>,
    pub date: Option<String>,
    pub voucher: Option<String>,
    pub reference: Option<String>,
    pub narration: Option<String>,
    pub debit: Option<f64>,
    pub credit: Option<f64>,
    pub balance: Option<f64>,
    pub customer_name: Option<String>,
    pub route: Option<String>,
    pub pnr: Option<String>,
    pub flying_date: Option<String>,
    pub flight_status: Option<FlightStatus>,
    pub customer_rate: Option<f64>,
    pub company_rate: Option<f64>,
    pub profit: Option<f64>,
    pub payment_status: Option<PaymentStatus>,
}

impl TravelDataPatch {
    /// Validate a JSON object into a patch. Nulls are dropped, unknown keys ignored.
    pub fn from_json(value: &Value) -> Result<Self, Vec<FieldError>> {
        let Some(object) = value.as_object() else {
            return Err(vec![FieldError::new("body", "expected a JSON object")]);
        };

        let mut reader = FieldReader {
            object,
            errors: Vec::new(),
        };

        let patch = Self {
            session_id: reader.text("session_id"),
            date: reader.date("date"),
            voucher: reader.text("voucher"),
            reference: reader.text("reference"),
            narration: reader.text("narration"),
            debit: reader.number("debit"),
            credit: reader.number("credit"),
            balance: reader.number("balance"),
            customer_name: reader.text("customer_name"),
            route: reader.text("route"),
            pnr: reader.text("pnr"),
            flying_date: reader.date("flying_date"),
            flight_status: reader.variant("flight_status", "Coming, Gone or Cancelled"),
            customer_rate: reader.number("customer_rate"),
            company_rate: reader.number("company_rate"),
            profit: reader.number("profit"),
            payment_status: reader.variant("payment_status", "Paid, Pending or Partial"),
        };

        if reader.errors.is_empty() {
            Ok(patch)
        } else {
            Err(reader.errors)
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overwrite the record's fields with every value present in the patch.
    pub fn apply_to(&self, record: &mut TravelDataRecord) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
        fn set_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *target = value.clone();
            }
        }

        set_opt(&mut record.session_id, &self.session_id);
        set(&mut record.date, &self.date);
        set(&mut record.voucher, &self.voucher);
        set_opt(&mut record.reference, &self.reference);
        set_opt(&mut record.narration, &self.narration);
        set(&mut record.debit, &self.debit);
        set(&mut record.credit, &self.credit);
        set(&mut record.balance, &self.balance);
        set(&mut record.customer_name, &self.customer_name);
        set(&mut record.route, &self.route);
        set(&mut record.pnr, &self.pnr);
        set_opt(&mut record.flying_date, &self.flying_date);
        set(&mut record.flight_status, &self.flight_status);
        set(&mut record.customer_rate, &self.customer_rate);
        set(&mut record.company_rate, &self.company_rate);
        set(&mut record.profit, &self.profit);
        set(&mut record.payment_status, &self.payment_status);
    }
}

/// Fully-defaulted values for inserting a new row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTravelData {
    pub id: Uuid,
    pub session_id: Option<String>,
    pub date: String,
    pub voucher: String,
    pub reference: Option<String>,
    pub narration: Option<String>,
    pub debit: f64,
    pub credit: f64,
    pub balance: f64,
    pub customer_name: String,
    pub route: String,
    pub pnr: String,
    pub flying_date: Option<String>,
    pub flight_status: FlightStatus,
    pub customer_rate: f64,
    pub company_rate: f64,
    pub profit: f64,
    pub payment_status: PaymentStatus,
    pub owner_id: Option<Uuid>,
}

impl NewTravelData {
    /// Fill every absent field with its default. Missing profit is derived from the rates.
    pub fn from_patch(patch: TravelDataPatch, owner_id: Option<Uuid>) -> Self {
        let customer_rate = patch.customer_rate.unwrap_or(0.0);
        let company_rate = patch.company_rate.unwrap_or(0.0);

        Self {
            id: Uuid::new_v4(),
            session_id: patch.session_id,
            date: patch.date.unwrap_or_default(),
            voucher: patch.voucher.unwrap_or_default(),
            reference: patch.reference,
            narration: patch.narration,
            debit: patch.debit.unwrap_or(0.0),
            credit: patch.credit.unwrap_or(0.0),
            balance: patch.balance.unwrap_or(0.0),
            customer_name: patch.customer_name.unwrap_or_default(),
            route: patch.route.unwrap_or_default(),
            pnr: patch.pnr.unwrap_or_default(),
            flying_date: patch.flying_date,
            flight_status: patch.flight_status.unwrap_or_default(),
            customer_rate,
            company_rate,
            profit: patch.profit.unwrap_or(customer_rate - company_rate),
            payment_status: patch.payment_status.unwrap_or_default(),
            owner_id,
        }
    }

    pub fn into_record(self, now: OffsetDateTime) -> TravelDataRecord {
        TravelDataRecord {
            id: self.id,
            session_id: self.session_id,
            date: self.date,
            voucher: self.voucher,
            reference: self.reference,
            narration: self.narration,
            debit: self.debit,
            credit: self.credit,
            balance: self.balance,
            customer_name: self.customer_name,
            route: self.route,
            pnr: self.pnr,
            flying_date: self.flying_date,
            flight_status: self.flight_status,
            customer_rate: self.customer_rate,
            company_rate: self.company_rate,
            profit: self.profit,
            payment_status: self.payment_status,
            owner_id: self.owner_id,
            created_at: now,
            updated_at: now,
        }
    }
}

struct FieldReader<'a> {
    object: &'a Map<String, Value>,
    errors: Vec<FieldError>,
}

impl FieldReader<'_> {
    fn present(&self, field: &str) -> Option<&Value> {
        self.object.get(field).filter(|value| !value.is_null())
    }

    fn text(&mut self, field: &'static str) -> Option<String> {
        match self.present(field)? {
            Value::String(value) => {
                let trimmed = value.trim();
                if trimmed.chars().count() > MAX_TEXT_LEN {
                    self.errors.push(FieldError::new(
                        field,
                        format!("must be at most {MAX_TEXT_LEN} characters"),
                    ));
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            _ => {
                self.errors.push(FieldError::new(field, "expected a string"));
                None
            }
        }
    }

    /// Spreadsheet dates arrive in whatever form the sheet used. Recognised
    /// calendar dates are stored as `YYYY-MM-DD`; other text is kept as typed.
    fn date(&mut self, field: &'static str) -> Option<String> {
        let value = self.text(field)?;
        Some(normalize_ledger_date(&value).unwrap_or(value))
    }

    fn number(&mut self, field: &'static str) -> Option<f64> {
        match self.present(field)?.as_f64() {
            Some(value) if value.is_finite() => Some(value),
            _ => {
                self.errors.push(FieldError::new(field, "expected a number"));
                None
            }
        }
    }

    fn variant<T: FromStr>(&mut self, field: &'static str, expected: &str) -> Option<T> {
        let parsed = self
            .present(field)?
            .as_str()
            .and_then(|raw| raw.parse::<T>().ok());
        if parsed.is_none() {
            self.errors
                .push(FieldError::new(field, format!("expected one of {expected}")));
        }
        parsed
    }
}

/// Parse `YYYY-MM-DD`, day-first `DD/MM/YYYY` (also `-` or `.` separated) and
/// `DD-Mon-YYYY`, returning the ISO form.
pub fn normalize_ledger_date(raw: &str) -> Option<String> {
    if let Ok(date) = Date::parse(raw, DATE_FORMAT) {
        return date.format(DATE_FORMAT).ok();
    }

    let separator = ['/', '-', '.'].into_iter().find(|sep| raw.contains(*sep))?;
    let parts: Vec<&str> = raw.split(separator).map(str::trim).collect();
    let [first, second, third] = parts.as_slice() else {
        return None;
    };

    let (year, month, day) = if first.len() == 4 {
        (*first, *second, *third)
    } else {
        (*third, *second, *first)
    };
    if year.len() != 4 {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    let month = match month.parse::<u8>() {
        Ok(number) => Month::try_from(number).ok()?,
        Err(_) => month_from_name(month)?,
    };
    let day: u8 = day.parse().ok()?;
    Date::from_calendar_date(year, month, day)
        .ok()?
        .format(DATE_FORMAT)
        .ok()
}

fn month_from_name(name: &str) -> Option<Month> {
    let prefix: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => Month::January,
        "feb" => Month::February,
        "mar" => Month::March,
        "apr" => Month::April,
        "may" => Month::May,
        "jun" => Month::June,
        "jul" => Month::July,
        "aug" => Month::August,
        "sep" => Month::September,
        "oct" => Month::October,
        "nov" => Month::November,
        "dec" => Month::December,
        _ => return None,
    };
    Some(month)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_record() -> TravelDataRecord {
        let patch = TravelDataPatch::from_json(&json!({
            "date": "2024-01-01",
            "voucher": "V1",
            "customer_name": "Acme",
            "route": "LHE-DXB",
            "pnr": "ABC123",
            "customer_rate": 100,
            "company_rate": 80,
        }))
        .expect("valid payload");
        NewTravelData::from_patch(patch, None).into_record(OffsetDateTime::now_utc())
    }

    #[test]
    fn nulls_are_dropped_and_unknown_fields_ignored() {
        let patch = TravelDataPatch::from_json(&json!({
            "voucher": null,
            "owner_id": "00000000-0000-0000-0000-000000000000",
            "flight_status": "Gone",
        }))
        .expect("valid payload");

        assert_eq!(patch.voucher, None);
        assert_eq!(patch.flight_status, Some(FlightStatus::Gone));
        assert!(!patch.is_empty());
    }

    #[test]
    fn all_null_payload_is_empty() {
        let patch = TravelDataPatch::from_json(&json!({ "voucher": null, "debit": null }))
            .expect("nulls are valid");
        assert!(patch.is_empty());
    }

    #[test]
    fn type_errors_are_collected_per_field() {
        let errors = TravelDataPatch::from_json(&json!({
            "debit": "ten",
            "flight_status": "Landed",
            "date": 20240102,
            "voucher": 5,
        }))
        .expect_err("invalid payload");

        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["date", "voucher", "debit", "flight_status"]);
    }

    #[test]
    fn spreadsheet_dates_are_normalised_or_kept() {
        let patch = TravelDataPatch::from_json(&json!({
            "date": "01/02/2024",
            "flying_date": "7-Mar-2024",
        }))
        .expect("dates are text");
        assert_eq!(patch.date.as_deref(), Some("2024-02-01"));
        assert_eq!(patch.flying_date.as_deref(), Some("2024-03-07"));

        let patch = TravelDataPatch::from_json(&json!({ "date": "Q1 closing", "flying_date": "31/02/2024" }))
            .expect("unrecognised dates are kept");
        assert_eq!(patch.date.as_deref(), Some("Q1 closing"));
        assert_eq!(patch.flying_date.as_deref(), Some("31/02/2024"));

        assert_eq!(normalize_ledger_date("2024-01-05").as_deref(), Some("2024-01-05"));
        assert_eq!(normalize_ledger_date("05.01.2024").as_deref(), Some("2024-01-05"));
        assert_eq!(normalize_ledger_date("2024/1/5").as_deref(), Some("2024-01-05"));
        assert_eq!(normalize_ledger_date("5/1/24"), None);
    }

    #[test]
    fn text_limit_counts_characters() {
        let within = "é".repeat(MAX_TEXT_LEN);
        let patch = TravelDataPatch::from_json(&json!({ "narration": within }))
            .expect("multibyte text within the limit");
        assert_eq!(patch.narration.map(|n| n.chars().count()), Some(MAX_TEXT_LEN));

        let errors = TravelDataPatch::from_json(&json!({ "narration": "é".repeat(MAX_TEXT_LEN + 1) }))
            .expect_err("too long");
        assert_eq!(errors[0].field, "narration");
    }

    #[test]
    fn non_object_body_is_rejected() {
        let errors = TravelDataPatch::from_json(&json!([1, 2])).expect_err("array body");
        assert_eq!(errors[0].field, "body");
    }

    #[test]
    fn create_defaults_and_derived_profit() {
        let record = sample_record();
        assert_eq!(record.profit, 20.0);
        assert_eq!(record.debit, 0.0);
        assert_eq!(record.flight_status, FlightStatus::Coming);
        assert_eq!(record.payment_status, PaymentStatus::Pending);
    }

    #[test]
    fn explicit_profit_is_kept() {
        let patch = TravelDataPatch {
            customer_rate: Some(100.0),
            company_rate: Some(80.0),
            profit: Some(5.0),
            ..Default::default()
        };
        assert_eq!(NewTravelData::from_patch(patch, None).profit, 5.0);
    }

    #[test]
    fn apply_overwrites_only_present_fields() {
        let mut record = sample_record();
        let before = record.clone();

        let patch = TravelDataPatch {
            flight_status: Some(FlightStatus::Gone),
            ..Default::default()
        };
        patch.apply_to(&mut record);

        assert_eq!(record.flight_status, FlightStatus::Gone);
        record.flight_status = before.flight_status;
        assert_eq!(record, before);
    }

    #[test]
    fn record_serializes_rfc3339_timestamps() {
        let record = sample_record();
        let value = serde_json::to_value(&record).expect("serialize");
        assert!(value["created_at"].as_str().is_some());
        assert_eq!(value["flight_status"], "Coming");
    }
}
