//! Promo-code input discovery

use tracing::{debug, info};

use crate::classifier::is_checkout_page;
use crate::traits::{ElementHandle, ElementQuery, ElementSnapshot, Page};

pub const PROMO_KEYWORDS: &[&str] = &[
    "promo",
    "coupon",
    "discount",
    "voucher",
    "gift",
    "offer",
    "redeem",
    "promotion",
    "rewards",
    "redemption",
    "claim",
    "code",
];

/// Terms that mark address and account fields, which often mention "code"
pub const EXCLUDE_KEYWORDS: &[&str] = &[
    "postal",
    "zip",
    "postcode",
    "post code",
    "zipcode",
    "address",
    "shipping",
    "billing",
    "mail",
    "security",
];

/// Input kinds that cannot hold a typed code
const NON_CODE_TYPES: &[&str] = &[
    "submit", "button", "checkbox", "radio", "file", "email", "tel", "password",
];

/// Everything around an input that may describe it, lowercased
pub fn context_string(input: &ElementSnapshot) -> String {
    let mut parts: Vec<&str> = Vec::new();
    parts.extend(input.parent_text.as_deref());
    parts.extend(input.previous_sibling_text.as_deref());
    parts.extend(input.next_sibling_text.as_deref());
    parts.extend(input.attr("placeholder"));
    parts.extend(input.attr("name"));
    parts.extend(input.attr("id"));
    parts.extend(input.attributes.iter().map(|(_, value)| value.as_str()));

    parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whether a single input looks like a promo-code field.
///
/// Exclusion wins over any number of promo hits.
pub fn is_promo_input(input: &ElementSnapshot) -> bool {
    if !input.visible || NON_CODE_TYPES.contains(&input.input_type().as_str()) {
        return false;
    }

    let context = context_string(input);
    if let Some(term) = EXCLUDE_KEYWORDS.iter().find(|k| context.contains(*k)) {
        debug!("Skipping input {}: context mentions '{}'", input.handle, term);
        return false;
    }

    PROMO_KEYWORDS.iter().any(|k| context.contains(k))
}

/// First promo-code input of a checkout page, in document order
pub async fn find_promo_field(page: &dyn Page) -> Option<ElementHandle> {
    if !is_checkout_page(page).await {
        debug!("Not a checkout page, skipping promo field search");
        return None;
    }

    for handle in page.query(ElementQuery::TextInputs).await {
        let Some(input) = page.describe(handle).await else {
            continue;
        };

        if is_promo_input(&input) {
            info!("Found promo field {}", handle);
            return Some(handle);
        }
    }

    None
}
