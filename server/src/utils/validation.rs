use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::utils::error::AppError;

pub const PASSWORD_MIN_LENGTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    RequiredField,
    PasswordMinLength,
    PasswordConfirmationMinLength,
    InvalidUuid,
    InvalidToken,
    InvalidProfileType,
    InvalidEmail,
    PasswordsDontMatch,
    InvalidCpf,
    InvalidCnpj,
    InvalidCpfOrCnpj,
    InvalidDatetime,
    DateInPast,
    EndDateGtStartDate,
    InvalidTicketQnt,
    InvalidTicketPrice,
    InvalidEventStatus,
    InvalidTicketStatus,
    InvalidSortField,
    InvalidPagination,
}

impl ValidationCode {
    pub fn message(self) -> &'static str {
        match self {
            Self::RequiredField => "Required field",
            Self::PasswordMinLength => "Password must contain at least 8 characters",
            Self::PasswordConfirmationMinLength => {
                "Password confirmation must contain at least 8 characters"
            }
            Self::InvalidUuid => "Invalid UUID",
            Self::InvalidToken => "Invalid token",
            Self::InvalidProfileType => "Invalid profile type",
            Self::InvalidEmail => "Invalid email format",
            Self::PasswordsDontMatch => "Password and confirmation do not match",
            Self::InvalidCpf => "Invalid CPF",
            Self::InvalidCnpj => "Invalid CNPJ",
            Self::InvalidCpfOrCnpj => "Invalid CPF or CNPJ",
            Self::InvalidDatetime => "Invalid date/time format",
            Self::DateInPast => "Date must be in the future",
            Self::EndDateGtStartDate => "End date must be after start date",
            Self::InvalidTicketQnt => "Invalid ticket quantity",
            Self::InvalidTicketPrice => "Ticket price must be a non-negative number",
            Self::InvalidEventStatus => "Invalid event status",
            Self::InvalidTicketStatus => "Invalid ticket status",
            Self::InvalidSortField => "Invalid sort field",
            Self::InvalidPagination => "Invalid pagination parameter",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub code: ValidationCode,
    pub message: &'static str,
}

impl FieldError {
    pub fn new(field: impl Into<String>, code: ValidationCode) -> Self {
        Self {
            field: field.into(),
            code,
            message: code.message(),
        }
    }
}

/// Collects field errors so a request reports every problem at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, code: ValidationCode) {
        self.errors.push(FieldError::new(field, code));
    }

    pub fn has_error(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// Trimmed, non-empty string.
    pub fn required(&mut self, field: &str, value: Option<&str>) -> Option<String> {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => Some(v.to_string()),
            _ => {
                self.push(field, ValidationCode::RequiredField);
                None
            }
        }
    }

    /// Absent is fine, present-but-blank is not.
    pub fn optional_non_blank(&mut self, field: &str, value: Option<&str>) -> Option<String> {
        let value = value?;
        self.required(field, Some(value))
    }

    pub fn email(&mut self, field: &str, value: Option<&str>) -> Option<String> {
        match value.map(str::trim) {
            Some(v) if is_valid_email(v) => Some(v.to_ascii_lowercase()),
            _ => {
                self.push(field, ValidationCode::InvalidEmail);
                None
            }
        }
    }

    pub fn uuid(&mut self, field: &str, value: Option<&str>) -> Option<Uuid> {
        match value.map(|v| Uuid::parse_str(v.trim())) {
            Some(Ok(id)) => Some(id),
            _ => {
                self.push(field, ValidationCode::InvalidUuid);
                None
            }
        }
    }

    pub fn datetime(&mut self, field: &str, value: Option<&str>) -> Option<DateTime<Utc>> {
        match value.map(parse_datetime) {
            Some(Some(at)) => Some(at),
            _ => {
                self.push(field, ValidationCode::InvalidDatetime);
                None
            }
        }
    }

    /// A count that must be a positive `i32`.
    pub fn quantity(&mut self, field: &str, value: Option<i64>) -> Option<i32> {
        match value.map(i32::try_from) {
            Some(Ok(v)) if v > 0 => Some(v),
            _ => {
                self.push(field, ValidationCode::InvalidTicketQnt);
                None
            }
        }
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}

/// Accepts RFC 3339 timestamps (`2030-01-01T20:00:00Z`, with offset or not).
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

pub fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !value.chars().any(char::is_whitespace)
        && domain
            .split('.')
            .filter(|label| !label.is_empty())
            .count()
            >= 2
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Parses a path parameter as a UUID.
pub fn parse_id(field: &str, value: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(value.trim())
        .map_err(|_| AppError::Validation(vec![FieldError::new(field, ValidationCode::InvalidUuid)]))
}
