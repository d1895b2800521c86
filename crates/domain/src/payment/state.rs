//! Payment status and type.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of a payment.
///
/// A payment leaves `Pending` exactly once: to `Success` or `Failed` through
/// the gateway callback, or to `Cancelled` by the payer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Success,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    /// Returns true while the payment can still be resolved.
    pub fn is_pending(&self) -> bool {
        matches!(self, PaymentStatus::Pending)
    }

    /// Maps a gateway callback code: 2 is success, 3 is failure.
    pub fn from_callback_code(code: i32) -> Result<Self, DomainError> {
        match code {
            2 => Ok(PaymentStatus::Success),
            3 => Ok(PaymentStatus::Failed),
            other => Err(DomainError::validation(format!(
                "invalid callback status: {other}"
            ))),
        }
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "success" => Ok(PaymentStatus::Success),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// How the payer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Alipay,
    Wechat,
    CreditCard,
}

impl PaymentType {
    /// Maps the numeric code used by clients (1, 2, 3).
    pub fn from_code(code: i32) -> Result<Self, DomainError> {
        match code {
            1 => Ok(PaymentType::Alipay),
            2 => Ok(PaymentType::Wechat),
            3 => Ok(PaymentType::CreditCard),
            other => Err(DomainError::UnknownPaymentType(other)),
        }
    }

    /// Returns the numeric code.
    pub fn code(&self) -> i32 {
        match self {
            PaymentType::Alipay => 1,
            PaymentType::Wechat => 2,
            PaymentType::CreditCard => 3,
        }
    }
}
