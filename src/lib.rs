//! Finds promo-code fields on checkout pages, tries known codes against the
//! cart total and keeps the one that saves the most.

pub mod api;
pub mod classifier;
pub mod config;
pub mod coupon_scout;
pub mod database;
pub mod discord;
pub mod locator;
pub mod models;
pub mod notify;
pub mod page;
pub mod price;
pub mod traits;
pub mod trial;
pub mod validation;
pub mod watch;

pub use api::{ApiError, CouponClient};
pub use config::Config;
pub use coupon_scout::CouponScout;
pub use database::PreferenceStore;
pub use models::{BestCoupon, CandidateCode, DiscountType, TrialResult};
pub use page::{HtmlPage, PageError, PageFetcher};
pub use traits::{CouponService, ElementHandle, Notifier, Page};
pub use trial::{TrialConfig, TrialEngine};
pub use watch::{WatchConfig, WatchScheduler, WatchState};
