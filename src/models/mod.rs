//! Data models for coupon candidates, trial outcomes and API payloads

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a coupon's advertised discount is expressed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    #[default]
    Dollar,
    Percent,
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dollar => f.write_str("dollar"),
            Self::Percent => f.write_str("percent"),
        }
    }
}

impl FromStr for DiscountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dollar" | "$" => Ok(Self::Dollar),
            "percent" | "%" => Ok(Self::Percent),
            other => Err(format!("unknown discount type: {other}")),
        }
    }
}

/// A code known to the coupon service for one domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateCode {
    pub id: i64,
    pub code: String,
    #[serde(default)]
    pub discount_amount: Option<f64>,
    #[serde(default)]
    pub discount_type: DiscountType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
}

/// Body of `GET /coupons/{domain}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CouponList {
    #[serde(default)]
    pub coupons: Vec<CandidateCode>,
}

/// Outcome of applying one code
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialResult {
    /// False when the code never reached the page (no apply control, page error)
    pub attempted: bool,
    pub observed_total: Option<f64>,
}

impl TrialResult {
    pub const fn skipped() -> Self {
        Self {
            attempted: false,
            observed_total: None,
        }
    }

    pub const fn observed(total: Option<f64>) -> Self {
        Self {
            attempted: true,
            observed_total: total,
        }
    }
}

/// Winning code of a trial run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestCoupon {
    pub code: String,
    /// Session baseline minus the total with this code applied
    pub discount: f64,
}

/// Body of `PUT /coupons/{domain}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponOutcome {
    pub id: i64,
    pub worked: bool,
    /// Observed discount as a percentage of the baseline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_discount: Option<f64>,
}

impl CouponOutcome {
    pub fn from_totals(id: i64, total: Option<f64>, baseline: f64) -> Self {
        match total {
            Some(total) if total < baseline => Self {
                id,
                worked: true,
                actual_discount: Some((baseline - total) / baseline * 100.0),
            },
            _ => Self {
                id,
                worked: false,
                actual_discount: None,
            },
        }
    }
}

/// Body of `POST /coupons`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCoupon {
    pub code: String,
    pub domain: String,
    pub discount_amount: Option<f64>,
    pub discount_type: DiscountType,
}

/// Body of `POST /analytics/savings`
#[derive(Debug, Clone, Serialize)]
pub struct SavingsReport {
    pub amount_saved: f64,
}

/// Body of `GET /user-id`
#[derive(Debug, Clone, Deserialize)]
pub struct UserIdResponse {
    pub user_id: String,
}

/// Error body returned by the coupon service
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// What the notification surface shows once a promo field is found
#[derive(Debug, Clone, PartialEq)]
pub struct CouponNotice {
    pub domain: String,
    pub coupons: Vec<CandidateCode>,
    pub found_at: DateTime<Utc>,
}

impl CouponNotice {
    pub fn new(domain: impl Into<String>, coupons: Vec<CandidateCode>) -> Self {
        Self {
            domain: domain.into(),
            coupons,
            found_at: Utc::now(),
        }
    }

    /// Largest advertised dollar and percent discounts
    pub fn max_discounts(&self) -> (f64, f64) {
        self.coupons
            .iter()
            .fold((0.0_f64, 0.0_f64), |(dollar, percent), coupon| {
                match (coupon.discount_amount, coupon.discount_type) {
                    (Some(amount), DiscountType::Percent) => (dollar, percent.max(amount)),
                    (Some(amount), DiscountType::Dollar) => (dollar.max(amount), percent),
                    (None, _) => (dollar, percent),
                }
            })
    }

    pub fn summary(&self) -> String {
        let count = self.coupons.len();
        if count == 0 {
            return "No coupon codes found for this website yet. Want to add one?".to_string();
        }

        let plural = if count == 1 { "" } else { "s" };
        let (dollar, percent) = self.max_discounts();
        let savings = if dollar > 0.0 && percent > 0.0 {
            format!(" with up to ${dollar:.2} or {percent}% in savings")
        } else if dollar > 0.0 {
            format!(" with up to ${dollar:.2} in savings")
        } else if percent > 0.0 {
            format!(" with up to {percent}% in savings")
        } else {
            String::new()
        };

        format!("Found {count} potential coupon{plural}{savings}")
    }
}

/// Message shown after a full trial run
pub fn result_message(best: Option<&BestCoupon>) -> String {
    match best {
        Some(best) => format!(
            "Best coupon found: {} (Saves ${:.2})",
            best.code, best.discount
        ),
        None => "Unfortunately, none of the codes worked.".to_string(),
    }
}

/// Discord embed structure for rich notifications
#[derive(Debug, Serialize)]
pub struct DiscordEmbed {
    pub title: String,
    pub description: String,
    pub url: String,
    pub color: u32,
    pub timestamp: String,
    pub fields: Vec<DiscordField>,
}

/// Key-value field for Discord embeds
#[derive(Debug, Serialize)]
pub struct DiscordField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Discord webhook message payload
#[derive(Debug, Serialize)]
pub struct DiscordMessage {
    pub embeds: Vec<DiscordEmbed>,
}
