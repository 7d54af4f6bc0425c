//! Traits and interfaces for site-agnostic coupon discovery
//!
//! The engine never talks to a concrete browser. Everything it needs from the
//! live page, the coupon service and the surrounding shell goes through the
//! traits below, so a host binding only has to implement these seams.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;

use crate::api::ApiError;
use crate::models::{BestCoupon, CandidateCode, CouponNotice, CouponOutcome, NewCoupon};
use crate::page::PageError;

/// Opaque reference to an element of the live page.
///
/// Handles are weak: the element may be detached at any time, so callers
/// re-check [`Page::is_attached`] before acting on one they kept around.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementHandle(pub u64);

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bounding box of an element in viewport coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    /// Distance between the top-left corners of two boxes
    pub fn corner_distance(&self, other: &Self) -> f64 {
        (self.left - other.left).hypot(self.top - other.top)
    }
}

/// Element families the locators enumerate.
///
/// Each family has a CSS equivalent (see [`ElementQuery::css`]) so bindings
/// backed by a real browser can hand the query straight to `querySelectorAll`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementQuery {
    /// Inputs that are not hidden by type or by the `hidden` attribute
    TextInputs,
    /// Anything a user might click to apply a code
    Clickables,
    /// Controls that may remove an already applied code
    ResetControls,
}

impl ElementQuery {
    pub const fn css(self) -> &'static str {
        match self {
            Self::TextInputs => r#"input:not([type="hidden"]):not([hidden])"#,
            Self::Clickables => {
                r#"button, input[type="submit"], input[type="button"], a, span[role="button"], div[role="button"]"#
            }
            Self::ResetControls => r#"button, a, input[type="button"], input[type="submit"]"#,
        }
    }
}

/// Point-in-time description of one element.
///
/// Everything the locators read about an element arrives in one snapshot so
/// a remote binding needs a single round trip per element.
#[derive(Debug, Clone, Default)]
pub struct ElementSnapshot {
    pub handle: ElementHandle,
    /// Lowercase tag name
    pub tag: String,
    /// Attributes in source order
    pub attributes: Vec<(String, String)>,
    /// Concatenated descendant text (`textContent`)
    pub text: String,
    /// Current form value
    pub value: String,
    /// False when hidden by `display`, `visibility` or zero opacity
    pub visible: bool,
    /// Layout box, when the binding knows it
    pub rect: Option<Rect>,
    pub parent: Option<ElementHandle>,
    pub previous_sibling: Option<ElementHandle>,
    pub next_sibling: Option<ElementHandle>,
    /// Nearest `form` ancestor
    pub form: Option<ElementHandle>,
    pub parent_text: Option<String>,
    pub previous_sibling_text: Option<String>,
    pub next_sibling_text: Option<String>,
}

impl ElementSnapshot {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Lowercased `type` of an input, `"text"` when absent
    pub fn input_type(&self) -> String {
        self.attr("type")
            .map_or_else(|| "text".to_string(), |t| t.trim().to_lowercase())
    }

    /// Visible label: the text content, or the value when there is no text
    pub fn label(&self) -> String {
        let source = if self.text.is_empty() {
            &self.value
        } else {
            &self.text
        };
        source.trim().to_lowercase()
    }
}

/// The live page the engine inspects and drives
#[async_trait]
pub trait Page: Send + Sync {
    /// Full URL of the current document
    async fn url(&self) -> String;

    /// Rendered text of the document (`innerText` of the body)
    async fn visible_text(&self) -> String;

    /// Elements of one family, in document order
    async fn query(&self, query: ElementQuery) -> Vec<ElementHandle>;

    /// Snapshot of an element, `None` once it is detached
    async fn describe(&self, element: ElementHandle) -> Option<ElementSnapshot>;

    /// Whether the element is still part of the document
    async fn is_attached(&self, element: ElementHandle) -> bool;

    /// Assign a form value and dispatch `input` and `change` so listeners
    /// bound by the host page react to it
    async fn set_value(&self, element: ElementHandle, value: &str) -> Result<(), PageError>;

    /// Click an element
    async fn click(&self, element: ElementHandle) -> Result<(), PageError>;

    /// Hostname of the current document
    async fn hostname(&self) -> Option<String> {
        let url = self.url().await;
        reqwest::Url::parse(&url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

/// Remote coupon database
#[async_trait]
pub trait CouponService: Send + Sync {
    /// Candidate codes known for a domain
    async fn fetch_coupons(&self, domain: &str) -> Result<Vec<CandidateCode>, ApiError>;

    /// Submit a code entered by the user
    async fn submit_coupon(&self, coupon: &NewCoupon) -> Result<(), ApiError>;

    /// Report whether a candidate worked on a domain
    async fn report_outcome(&self, domain: &str, outcome: &CouponOutcome) -> Result<(), ApiError>;

    /// Report money saved by a working code
    async fn report_savings(&self, amount_saved: f64) -> Result<(), ApiError>;
}

/// Surface that shows results to the user
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publish the number of candidates known for the page
    async fn update_badge(&self, domain: &str, count: usize) -> Result<()>;

    /// Announce that a promo field was found and how many codes could be tried
    async fn show_coupons(&self, notice: &CouponNotice) -> Result<()>;

    /// Announce the outcome of a full trial run
    async fn show_result(&self, domain: &str, best: Option<&BestCoupon>) -> Result<()>;
}
