//! # Storefront Cart Simulator
//!
//! Replays a JSON scenario against a cart session backed by in-memory
//! collaborators, printing the cart view after every step.
//!
//! ## Usage
//! ```bash
//! # Run a scenario
//! cargo run -p storefront-sync --bin storefront-sim -- demos/guest-login.json
//!
//! # With a config file
//! cargo run -p storefront-sync --bin storefront-sim -- demos/guest-login.json --config ./cart.toml
//!
//! # More logging
//! RUST_LOG=storefront_sync=debug cargo run -p storefront-sync --bin storefront-sim -- demos/guest-login.json
//! ```
//!
//! ## Scenario Format
//! ```json
//! {
//!   "remoteToken": "tok-1",
//!   "remoteCart": [{ "productId": "P1", "quantity": 2, "unitPrice": { "minor": 1000, "currency": "USD" }, "stockSnapshot": 8 }],
//!   "coupons": [{ "code": "SAVE10", "kind": { "type": "percentage", "percent": 10 } }],
//!   "stock": [{ "productId": "P1", "available": 8 }],
//!   "steps": [
//!     { "step": "mutate", "intent": { "intent": "set_quantity", "key": { "productId": "P3" }, "quantity": 1, ... } },
//!     { "step": "login", "token": "tok-1" },
//!     { "step": "checkout" }
//!   ]
//! }
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use storefront_core::cart::{CartLine, CartState};
use storefront_core::coupon::CouponDefinition;
use storefront_core::types::LineKey;
use storefront_sync::{
    CartIntent, CartSession, CartView, CheckoutGate, Identity, InMemoryCartStore,
    InMemoryCatalog, SessionState, StorefrontConfig, SyncError, SyncResult,
};

// =============================================================================
// Scenario
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Scenario {
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_remote_token")]
    remote_token: String,
    #[serde(default)]
    remote_cart: Vec<CartLine>,
    #[serde(default)]
    coupons: Vec<CouponDefinition>,
    #[serde(default)]
    stock: Vec<StockLevel>,
    steps: Vec<Step>,
}

fn default_remote_token() -> String {
    "demo-token".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StockLevel {
    #[serde(flatten)]
    key: LineKey,
    available: i64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case", rename_all_fields = "camelCase")]
enum Step {
    Mutate { intent: CartIntent },
    Login { token: String },
    Logout,
    FailWrites { enabled: bool },
    FailFetch { enabled: bool },
    CatalogOutage { enabled: bool },
    SetStock { key: LineKey, available: i64 },
    WriteLatency { ms: u64 },
    Retry,
    RetryMerge,
    Settle,
    Sleep { ms: u64 },
    Checkout,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> SyncResult<()> {
    let args: Vec<String> = env::args().collect();

    let mut scenario_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => scenario_path = Some(PathBuf::from(other)),
        }
        i += 1;
    }

    let Some(scenario_path) = scenario_path else {
        print_help();
        return Err(SyncError::Scenario("no scenario file given".into()));
    };

    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = Arc::new(match config_path {
        Some(path) => StorefrontConfig::load(Some(path))?,
        None => StorefrontConfig::load_or_default(None),
    });

    let contents = std::fs::read_to_string(&scenario_path)?;
    let scenario: Scenario = serde_json::from_str(&contents)?;

    println!("🛒 Storefront Cart Simulator");
    println!("============================");
    println!("Scenario: {}", scenario.name.as_deref().unwrap_or("(unnamed)"));
    println!("Currency: {}", config.currency());
    println!("Steps:    {}", scenario.steps.len());
    println!();

    run_scenario(config, scenario).await?;

    println!();
    println!("✓ Scenario complete!");
    Ok(())
}

fn print_help() {
    println!("Storefront Cart Simulator");
    println!();
    println!("Usage: storefront-sim <SCENARIO.json> [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>  Config file (default: platform config dir)");
    println!("  -h, --help           Show this help message");
}

async fn run_scenario(config: Arc<StorefrontConfig>, scenario: Scenario) -> SyncResult<()> {
    let currency = config.currency();

    // Collaborators
    let store = InMemoryCartStore::new(currency, config.cart.max_lines);
    let remote = CartState::from_lines(currency, config.cart.max_lines, scenario.remote_cart)
        .map_err(|e| SyncError::Scenario(format!("remote cart: {}", e)))?;
    store.seed(&scenario.remote_token, remote).await;

    let catalog = InMemoryCatalog::new();
    for coupon in scenario.coupons {
        catalog.insert_coupon(coupon).await;
    }
    for level in scenario.stock {
        catalog.set_stock(level.key, level.available).await;
    }

    let (identity_tx, identity_rx) = watch::channel(Identity::guest());
    let session = CartSession::new(
        Arc::clone(&config),
        Arc::new(store.clone()),
        Arc::new(catalog.clone()),
        identity_rx,
    )
    .spawn();
    let gate = CheckoutGate::new(Arc::new(catalog.clone()), config.fetch_timeout());

    // Print events as they arrive
    let mut events = session.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("    ⚡ {}", event);
        }
    });

    for (n, step) in scenario.steps.into_iter().enumerate() {
        println!("[{}] {:?}", n + 1, step);

        match step {
            Step::Mutate { intent } => match session.mutate(intent).await {
                Ok(view) => print_view(&view),
                Err(e) => println!("    ✗ rejected: {}", e),
            },
            Step::Login { token } => {
                identity_tx.send_replace(Identity::authenticated(token));
                let mut watch = session.watch();
                let view = watch
                    .wait_for(|v| {
                        v.authenticated
                            && v.state != SessionState::Merging
                            && v.outstanding_writes == 0
                    })
                    .await
                    .map_err(|_| SyncError::Scenario("session stopped".into()))?
                    .clone();
                print_view(&view);
            }
            Step::Logout => {
                identity_tx.send_replace(Identity::guest());
                let mut watch = session.watch();
                let view = watch
                    .wait_for(|v| v.state == SessionState::Detached)
                    .await
                    .map_err(|_| SyncError::Scenario("session stopped".into()))?
                    .clone();
                print_view(&view);
            }
            Step::FailWrites { enabled } => store.set_fail_writes(enabled).await,
            Step::FailFetch { enabled } => store.set_fail_fetch(enabled).await,
            Step::CatalogOutage { enabled } => catalog.set_unavailable(enabled).await,
            Step::SetStock { key, available } => catalog.set_stock(key, available).await,
            Step::WriteLatency { ms } => store.set_latency(Duration::from_millis(ms)).await,
            Step::Retry => {
                let queued = session.retry_pending().await?;
                println!("    ↻ re-sent {} keys", queued);
                print_view(&session.settled().await?);
            }
            Step::RetryMerge => {
                session.retry_merge().await?;
                print_view(&session.settled().await?);
            }
            Step::Settle => print_view(&session.settled().await?),
            Step::Sleep { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
            Step::Checkout => {
                let view = session.snapshot().await?;
                match gate.validate_view(&view).await {
                    Ok(()) => println!("    ✓ checkout allowed, total {}", view.pricing.total),
                    Err(blocked) => {
                        println!("    ✗ checkout blocked:");
                        for reason in blocked {
                            println!("      - {}", reason);
                        }
                    }
                }
            }
        }
    }

    session.shutdown().await?;
    printer.abort();

    println!();
    println!("Remote store received {} calls", store.calls().await);
    Ok(())
}

fn print_view(view: &CartView) {
    println!(
        "    state: {}  (local r{}, remote r{}, {} writes outstanding)",
        view.state, view.local_revision, view.remote_revision, view.outstanding_writes
    );
    for line in view.lines() {
        println!(
            "      {:<16} x{:<4} @ {}",
            line.key.to_string(),
            line.quantity,
            line.unit_price
        );
    }
    if let Some(coupon) = &view.coupon {
        let status = if coupon.validated { "active" } else { "inactive" };
        println!("      coupon {} ({})", coupon.code, status);
    }
    if !view.pending.is_empty() {
        let keys: Vec<String> = view.pending.iter().map(|k| k.to_string()).collect();
        println!("      pending: {}", keys.join(", "));
    }

    let p = &view.pricing;
    println!(
        "      subtotal {}  shipping {}  discount -{}  tax {}  total {}",
        p.subtotal, p.shipping_cost, p.discount_amount, p.tax_amount, p.total
    );
}
