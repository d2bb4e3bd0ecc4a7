//! Upload sessions group the rows imported from one ledger file.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::travel_data::{FieldError, normalize_ledger_date};

/// Opening balance carried at the top of an imported ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningBalance {
    pub date: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSessionRecord {
    pub id: Uuid,
    pub filename: String,
    pub opening_balance: Option<OpeningBalance>,
    pub total_records: i64,
    pub owner_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUploadSession {
    pub id: Uuid,
    pub filename: String,
    pub opening_balance: Option<OpeningBalance>,
    pub owner_id: Option<Uuid>,
}

impl NewUploadSession {
    pub fn new(
        filename: &str,
        opening_balance: Option<OpeningBalance>,
        owner_id: Option<Uuid>,
    ) -> Result<Self, FieldError> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(FieldError::new("filename", "must not be empty"));
        }
        if let Some(balance) = opening_balance.as_ref()
            && !balance.amount.is_finite()
        {
            return Err(FieldError::new(
                "opening_balance.amount",
                "expected a finite number",
            ));
        }
        let opening_balance = opening_balance.map(|balance| OpeningBalance {
            date: normalize_ledger_date(balance.date.trim())
                .unwrap_or_else(|| balance.date.trim().to_string()),
            amount: balance.amount,
        });

        Ok(Self {
            id: Uuid::new_v4(),
            filename: filename.to_string(),
            opening_balance,
            owner_id,
        })
    }

    /// Rows reference their session by the textual form of its id.
    pub fn session_key(&self) -> String {
        self.id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_filename_is_rejected() {
        let err = NewUploadSession::new("   ", None, None).expect_err("blank filename");
        assert_eq!(err.field, "filename");
    }

    #[test]
    fn filename_is_trimmed() {
        let session = NewUploadSession::new(" ledger.xlsx ", None, None).expect("valid");
        assert_eq!(session.filename, "ledger.xlsx");
    }

    #[test]
    fn opening_balance_date_is_normalised() {
        let session = NewUploadSession::new(
            "march.xlsx",
            Some(OpeningBalance {
                date: "01/03/2024".to_string(),
                amount: 10.0,
            }),
            None,
        )
        .expect("valid session");
        assert_eq!(session.opening_balance.as_ref().expect("balance").date, "2024-03-01");
        assert_eq!(session.session_key(), session.id.to_string());
    }
}
