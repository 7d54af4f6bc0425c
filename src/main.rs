use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info};

use coupon_scout::classifier::is_checkout_page;
use coupon_scout::discord::DiscordNotifier;
use coupon_scout::locator::{find_apply_button, find_promo_field};
use coupon_scout::notify::{Fanout, LogNotifier};
use coupon_scout::price::read_displayed_total;
use coupon_scout::{
    Config, CouponClient, CouponScout, DiscountType, Notifier, Page, PageFetcher,
    PreferenceStore, WatchScheduler,
};

#[derive(Parser)]
#[command(name = "coupon-scout", version, about = "Find and try coupon codes on checkout pages")]
struct Cli {
    /// Coupon service base URL
    #[arg(long, env = "COUPON_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a page once and report what the heuristics see
    Inspect { url: String },
    /// Re-fetch a page until a promo field shows up or the watch times out
    Watch { url: String },
    /// List the codes known for a domain
    Coupons { domain: String },
    /// Submit a code for a domain
    Submit {
        domain: String,
        code: String,
        #[arg(long, default_value = "")]
        discount: String,
        #[arg(long = "type", default_value = "dollar")]
        kind: DiscountType,
    },
    /// Stop looking for coupons on a domain
    Disable { domain: String },
    /// Look for coupons on a domain again
    Enable { domain: String },
    /// List the domains coupon search is disabled for
    Disabled,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }

    info!("Starting coupon scout against {}", config.api_url);

    let store = PreferenceStore::new(&config.database_url).await?;
    let client = CouponClient::new(config.api_url.clone(), store.clone())?;
    let discord = DiscordNotifier::new(config.discord_webhook_url.clone());
    let notifier = Fanout(vec![
        Box::new(LogNotifier) as Box<dyn Notifier>,
        Box::new(discord),
    ]);
    let scout = Arc::new(CouponScout::new(
        Arc::new(client),
        store,
        Arc::new(notifier),
        config.trial.clone(),
    ));

    match cli.command {
        Command::Inspect { url } => inspect(&url).await?,
        Command::Watch { url } => watch(&scout, &config, url).await?,
        Command::Coupons { domain } => {
            let coupons = scout.coupons_for(&domain).await;
            info!("{} coupons for {}", coupons.len(), domain);
            for coupon in coupons {
                let amount = coupon.discount_amount.map_or_else(String::new, |amount| {
                    format!(" ({amount} {})", coupon.discount_type)
                });
                println!("{}{}", coupon.code, amount);
            }
        }
        Command::Submit {
            domain,
            code,
            discount,
            kind,
        } => {
            if let Err(e) = scout.submit_coupon(&domain, &code, &discount, kind).await {
                error!("{}", e);
                return Err(e.into());
            }
            println!("Coupon code added successfully!");
        }
        Command::Disable { domain } => scout.set_site_disabled(&domain, true).await?,
        Command::Enable { domain } => scout.set_site_disabled(&domain, false).await?,
        Command::Disabled => {
            let domains = scout.disabled_sites().await?;
            if domains.is_empty() {
                info!("Coupon search is enabled everywhere");
            }
            for domain in domains {
                println!("{domain}");
            }
        }
    }

    Ok(())
}

async fn inspect(url: &str) -> Result<()> {
    let page = PageFetcher::new()?.fetch(url).await?;

    info!("Checkout page: {}", is_checkout_page(&page).await);

    let Some(input) = find_promo_field(&page).await else {
        info!("No promo field found");
        return Ok(());
    };

    match find_apply_button(&page, input).await {
        Some(button) => info!("Promo field {} applies with {}", input, button),
        None => info!("Promo field {} has no apply control", input),
    }

    match read_displayed_total(&page).await {
        Some(total) => info!("Displayed total: ${:.2}", total),
        None => info!("No total displayed"),
    }

    Ok(())
}

/// Poll a fetched page; a static fetch has no mutation feed, so the channel
/// is closed from the start and only the timed checks run
async fn watch(scout: &Arc<CouponScout>, config: &Config, url: String) -> Result<()> {
    let fetcher = PageFetcher::new()?;
    let (tx, mutations) = mpsc::unbounded_channel();
    drop(tx);

    let mut scheduler = WatchScheduler::new(config.watch.clone());
    let scout = Arc::clone(scout);
    scheduler.start(mutations, move || {
        let scout = Arc::clone(&scout);
        let fetcher = fetcher.clone();
        let url = url.clone();
        async move {
            match fetcher.fetch(&url).await {
                Ok(page) => {
                    let page: Arc<dyn Page> = Arc::new(page);
                    scout.check_for_promo_field(&page).await
                }
                Err(e) => {
                    error!("Error fetching {}: {}", url, e);
                    false
                }
            }
        }
    });

    let state = scheduler.finished().await;
    info!("Watch finished: {:?}", state);
    Ok(())
}
