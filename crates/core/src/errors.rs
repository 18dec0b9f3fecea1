use thiserror::Error;

use crate::domain::item::{CheckoutItemId, SkuId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("checkout request contains no items")]
    EmptyCheckout,
    #[error("invalid checkout item `{item_id:?}`: {reason}")]
    InvalidCheckoutItem { item_id: CheckoutItemId, reason: String },
    #[error("insufficient stock for sku `{sku_id:?}`: requested {requested}, available {available}")]
    InsufficientStock { sku_id: SkuId, requested: u32, available: u32 },
    #[error("coupon `{code}` is not available")]
    CouponUnavailable { code: String },
}

/// Raised by a calculator. Calculators only check their own applicability, so
/// any failure here is a configuration fault and is never retried.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("calculator `{calculator}` failed: {message}")]
    CalculatorFailed { calculator: String, message: String },
}

/// Provider-level fault. The coupon chain downgrades these to a negative
/// result; they never reach the request layer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CouponError {
    #[error("coupon store failure: {0}")]
    Store(String),
    #[error("coupon provider `{provider}` failed: {message}")]
    Provider { provider: String, message: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Conflict { .. } => {
                "The checkout could not be completed in its current state. Review the cart and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(
                error @ (DomainError::InsufficientStock { .. }
                | DomainError::CouponUnavailable { .. }),
            ) => Self::Conflict { message: error.to_string(), correlation_id: unassigned() },
            ApplicationError::Domain(DomainError::EmptyCheckout)
            | ApplicationError::Domain(DomainError::InvalidCheckoutItem { .. }) => {
                Self::BadRequest {
                    message: "domain validation failed".to_owned(),
                    correlation_id: unassigned(),
                }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Pricing(error @ PricingError::CalculatorFailed { .. }) => {
                Self::Internal { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}
