//! Checks on codes typed in by the user, run before anything is sent

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::api::ApiError;
use crate::models::{DiscountType, NewCoupon};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiscountError {
    #[error("Invalid discount amount")]
    Invalid,

    #[error("Percentage discount must be between 0 and 100")]
    PercentOutOfRange,

    #[error("Dollar discount must be greater than 0")]
    DollarNotPositive,
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Please enter a coupon code")]
    MissingCode,

    #[error(transparent)]
    Discount(#[from] DiscountError),

    #[error("{}", .0.user_message())]
    Api(#[from] ApiError),
}

/// Leading decimal number, so "10%" or "5 dollars" read as 10 and 5
static LEADING_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?").expect("number pattern is valid")
});

/// Parse an optional discount amount as typed.
///
/// Only the leading number counts and trailing text is ignored. An empty
/// amount is allowed; otherwise percentages must fall in (0, 100] and dollar
/// amounts must be positive.
pub fn parse_discount(raw: &str, kind: DiscountType) -> Result<Option<f64>, DiscountError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let amount: f64 = LEADING_NUMBER
        .find(raw)
        .and_then(|number| number.as_str().parse().ok())
        .ok_or(DiscountError::Invalid)?;

    match kind {
        DiscountType::Percent if amount <= 0.0 || amount > 100.0 => {
            Err(DiscountError::PercentOutOfRange)
        }
        DiscountType::Dollar if amount <= 0.0 => Err(DiscountError::DollarNotPositive),
        _ => Ok(Some(amount)),
    }
}

/// The message to show for a typed discount, if it is unacceptable
pub fn discount_error(raw: &str, kind: DiscountType) -> Option<DiscountError> {
    parse_discount(raw, kind).err()
}

/// Build a submission from form input, or say what is wrong with it
pub fn validate_submission(
    domain: &str,
    code: &str,
    discount: &str,
    kind: DiscountType,
) -> Result<NewCoupon, SubmissionError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(SubmissionError::MissingCode);
    }

    let discount_amount = parse_discount(discount, kind)?;

    Ok(NewCoupon {
        code: code.to_string(),
        domain: domain.to_string(),
        discount_amount,
        discount_type: kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_over_one_hundred_is_rejected() {
        assert_eq!(
            discount_error("150", DiscountType::Percent),
            Some(DiscountError::PercentOutOfRange)
        );
    }

    #[test]
    fn reasonable_percent_is_accepted() {
        assert_eq!(discount_error("10", DiscountType::Percent), None);
        assert_eq!(discount_error("100", DiscountType::Percent), None);
    }

    #[test]
    fn zero_dollars_is_rejected() {
        assert_eq!(
            discount_error("0", DiscountType::Dollar),
            Some(DiscountError::DollarNotPositive)
        );
        assert_eq!(
            discount_error("0", DiscountType::Percent),
            Some(DiscountError::PercentOutOfRange)
        );
    }

    #[test]
    fn empty_amount_is_optional() {
        assert_eq!(discount_error("", DiscountType::Dollar), None);
        assert_eq!(discount_error("  ", DiscountType::Percent), None);
    }

    #[test]
    fn garbage_amount_is_invalid() {
        assert_eq!(
            discount_error("ten", DiscountType::Dollar),
            Some(DiscountError::Invalid)
        );
        assert_eq!(
            discount_error("NaN", DiscountType::Dollar),
            Some(DiscountError::Invalid)
        );
    }

    #[test]
    fn trailing_text_after_the_amount_is_ignored() {
        assert_eq!(parse_discount("10%", DiscountType::Percent), Ok(Some(10.0)));
        assert_eq!(parse_discount("5 dollars", DiscountType::Dollar), Ok(Some(5.0)));
        assert_eq!(parse_discount(".5", DiscountType::Dollar), Ok(Some(0.5)));
        assert_eq!(
            discount_error("150%", DiscountType::Percent),
            Some(DiscountError::PercentOutOfRange)
        );
        assert_eq!(
            discount_error("$5", DiscountType::Dollar),
            Some(DiscountError::Invalid)
        );
    }

    #[test]
    fn submission_requires_a_code() {
        let err = validate_submission("shop.example", "  ", "5", DiscountType::Dollar).unwrap_err();
        assert!(matches!(err, SubmissionError::MissingCode));
        assert_eq!(err.to_string(), "Please enter a coupon code");
    }

    #[test]
    fn submission_carries_parsed_amount() {
        let coupon =
            validate_submission("shop.example", " SAVE5 ", "5.50", DiscountType::Dollar).unwrap();
        assert_eq!(coupon.code, "SAVE5");
        assert_eq!(coupon.discount_amount, Some(5.5));
        assert_eq!(coupon.domain, "shop.example");
    }

    #[test]
    fn rejected_submission_surfaces_server_message() {
        let err = SubmissionError::from(ApiError::Rejected("Coupon already exists".to_string()));
        assert_eq!(err.to_string(), "Coupon already exists");

        let err = SubmissionError::from(ApiError::Identity("offline".to_string()));
        assert_eq!(err.to_string(), "Failed to add coupon code. Please try again.");
    }
}
