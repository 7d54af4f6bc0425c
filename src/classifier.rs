//! Decides whether a page looks like a checkout step

use tracing::debug;

use crate::price::PRICE_PATTERN;
use crate::traits::Page;

pub const CHECKOUT_KEYWORDS: &[&str] = &[
    "payment",
    "checkout",
    "order",
    "shipping",
    "billing",
    "cart",
    "purchase",
    "total",
    "subtotal",
    "pay now",
];

/// Classify from a URL and the page's rendered text.
///
/// A checkout page either has a checkout keyword in its URL and at least one
/// in its text, or shows a dollar amount alongside two or more keywords.
pub fn classify(url: &str, text: &str) -> bool {
    let url = url.to_lowercase();
    let text = text.to_lowercase();

    let url_has_keyword = CHECKOUT_KEYWORDS.iter().any(|k| url.contains(k));
    let keywords_in_text = CHECKOUT_KEYWORDS.iter().filter(|k| text.contains(*k)).count();
    let has_price = PRICE_PATTERN.is_match(&text);

    debug!(
        url_has_keyword,
        keywords_in_text, has_price, "Checkout classification signals"
    );

    (url_has_keyword && keywords_in_text >= 1) || (has_price && keywords_in_text >= 2)
}

pub async fn is_checkout_page(page: &dyn Page) -> bool {
    classify(&page.url().await, &page.visible_text().await)
}
