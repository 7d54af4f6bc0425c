//! Heuristics that find the promo field and its apply control on unknown markup

mod action;
mod field;

pub use action::{APPLY_LABELS, MatchTier, find_apply_button, select_apply_button};
pub use field::{EXCLUDE_KEYWORDS, PROMO_KEYWORDS, context_string, find_promo_field, is_promo_input};
