//! Reads the displayed order total from page text

use std::sync::LazyLock;

use regex::Regex;

use crate::traits::Page;

/// `$<digits>.<2 digits>`
pub(crate) static PRICE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\d+\.\d{2})").expect("price pattern is valid"));

/// First dollar amount in `text`
pub fn parse_first_price(text: &str) -> Option<f64> {
    PRICE_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|amount| amount.as_str().parse().ok())
}

/// Current total shown on the page.
///
/// The first amount in the rendered text is taken as the total; checkout
/// pages tend to put the order total ahead of line items.
pub async fn read_displayed_total(page: &dyn Page) -> Option<f64> {
    parse_first_price(&page.visible_text().await)
}
