//! Backtest Lab — strategy backtesting server and CLI
//!
//! Usage:
//!   backtest-lab serve --port 3001                         — Launch the HTTP API
//!   backtest-lab run --symbol AAPL --start 2023-01-01 \
//!       --end 2023-12-31 --strategy rsi                     — Run one backtest from CLI
//!   backtest-lab list | show <ID> | delete <ID>            — Manage saved backtests

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use engine::{
    BacktestError, BacktestRequest, BacktestService, ServiceConfig, SqliteBacktestStore,
    StrategyConfig, YahooClient, MAX_INITIAL_CAPITAL,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

const APP_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

const DEFAULT_DB_PATH: &str = "data/backtests.db";
const DEFAULT_USER: &str = "local";
const USER_HEADER: &str = "x-user-id";

type Service = BacktestService<YahooClient, SqliteBacktestStore>;

#[derive(Parser)]
#[command(name = "backtest-lab")]
#[command(about = "Backtest trading strategies on daily price history", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Owner of the backtests (CLI commands only)
    #[arg(long, global = true, default_value = DEFAULT_USER)]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = 3001)]
        port: u16,
    },
    /// Run a single backtest and save it
    Run {
        /// Ticker symbol, e.g. AAPL
        #[arg(long)]
        symbol: String,
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// Last day (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,
        #[arg(long, value_enum, default_value_t = StrategyKind::BuyAndHold)]
        strategy: StrategyKind,
        /// Short MA period (ma-crossover)
        #[arg(long, default_value_t = 20)]
        short: usize,
        /// Long MA period (ma-crossover)
        #[arg(long, default_value_t = 50)]
        long: usize,
        /// RSI lookback (rsi)
        #[arg(long, default_value_t = 14)]
        period: usize,
        #[arg(long, default_value_t = 30.0)]
        oversold: f64,
        #[arg(long, default_value_t = 70.0)]
        overbought: f64,
        /// Starting cash
        #[arg(long, default_value = "10000")]
        capital: Decimal,
        /// Label for the saved run (defaults to "<SYMBOL> <strategy>")
        #[arg(long)]
        name: Option<String>,
        /// Print every trade
        #[arg(long)]
        trades: bool,
    },
    /// List saved backtests
    List,
    /// Show one saved backtest
    Show { id: i64 },
    /// Delete a saved backtest
    Delete { id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyKind {
    BuyAndHold,
    MaCrossover,
    Rsi,
}

#[derive(Clone)]
struct AppState {
    service: Arc<Service>,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,persistence=debug,backtest_lab=debug,sqlx=warn")
    } else {
        EnvFilter::new("info,engine=info,backtest_lab=info,sqlx=warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

fn strategy_from_args(
    kind: StrategyKind,
    short: usize,
    long: usize,
    period: usize,
    oversold: f64,
    overbought: f64,
) -> StrategyConfig {
    match kind {
        StrategyKind::BuyAndHold => StrategyConfig::BuyAndHold,
        StrategyKind::MaCrossover => StrategyConfig::MovingAverageCrossover {
            short_period: short,
            long_period: long,
        },
        StrategyKind::Rsi => StrategyConfig::RsiStrategy {
            period,
            oversold,
            overbought,
        },
    }
}

fn db_path() -> String {
    std::env::var("BACKTEST_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string())
}

/// Open the database and wire the service from environment settings
async fn build_service() -> anyhow::Result<Service> {
    let db_path = db_path();
    let db = persistence::Database::new(&db_path).await.map_err(|e| {
        error!("Failed to initialize database: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })?;
    info!("Database initialized: {}", db_path);

    let source = match std::env::var("BACKTEST_PRICE_API_URL") {
        Ok(url) => YahooClient::with_base_url(url),
        Err(_) => YahooClient::new(),
    };
    let price_api = source.base_url().to_string();
    let store = SqliteBacktestStore::from_database(&db);
    let service = BacktestService::new(source, store, ServiceConfig::from_env());

    let config = service.config();
    info!(
        price_api = %price_api,
        fetch_timeout_secs = config.fetch_timeout.as_secs(),
        retry_backoff_ms = config.retry_backoff.as_millis() as u64,
        min_capital = %config.min_capital,
        "Backtest service configured"
    );

    Ok(service)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Serve { host, port } => {
            cmd_serve(&host, port).await?;
        }
        Commands::Run {
            symbol,
            start,
            end,
            strategy,
            short,
            long,
            period,
            oversold,
            overbought,
            capital,
            name,
            trades,
        } => {
            let strategy = strategy_from_args(strategy, short, long, period, oversold, overbought);
            let request = BacktestRequest {
                name: name.unwrap_or_else(|| format!("{} {}", symbol.to_uppercase(), strategy)),
                symbol,
                start_date: start,
                end_date: end,
                strategy,
                initial_capital: capital,
            };
            cmd_run(&cli.user, request, trades).await?;
        }
        Commands::List => cmd_list(&cli.user).await?,
        Commands::Show { id } => cmd_show(&cli.user, id).await?,
        Commands::Delete { id } => cmd_delete(&cli.user, id).await?,
    }

    Ok(())
}

// ============================================================================
// Serve command — Axum web server
// ============================================================================

async fn cmd_serve(host: &str, port: u16) -> anyhow::Result<()> {
    info!("Backtest Lab v{} starting...", APP_VERSION);

    let service = Arc::new(build_service().await?);
    let config = service.config();
    let capital_range = format!("{} - {}", config.min_capital, MAX_INITIAL_CAPITAL);
    let fetch_timeout_secs = config.fetch_timeout.as_secs();
    let state = AppState { service };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(api_health))
        .route("/backtests", get(api_list_backtests).post(api_create_backtest))
        .route(
            "/backtests/:id",
            get(api_get_backtest).delete(api_delete_backtest),
        )
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(cors);

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("\n=== Backtest Lab v{} ===", APP_VERSION);
    println!("Listening on http://{}", addr);
    println!("\nEndpoints:");
    println!("  GET    /api/health          - Health check");
    println!("  POST   /api/backtests       - Run and save a backtest");
    println!("  GET    /api/backtests       - List saved backtests");
    println!("  GET    /api/backtests/:id   - Full backtest result");
    println!("  DELETE /api/backtests/:id   - Delete a backtest");
    println!("\n  Caller identified by the {} header (default \"{}\")", USER_HEADER, DEFAULT_USER);
    println!("  Database: {}", db_path());
    println!("  Initial capital: {}", capital_range);
    println!("  Price fetch timeout: {}s (one retry)", fetch_timeout_secs);
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// CLI commands
// ============================================================================

async fn cmd_run(user_id: &str, request: BacktestRequest, show_trades: bool) -> anyhow::Result<()> {
    println!("\n=== Backtest Lab v{} ===", APP_VERSION);
    println!(
        "{} | {} -> {} | {} | capital {}",
        request.symbol, request.start_date, request.end_date, request.strategy, request.initial_capital
    );
    println!();

    let service = build_service().await?;
    let done = service
        .run_backtest(user_id, &request)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    let result = &done.result;

    println!("Backtest #{} saved", done.id);
    println!("  Final value:     {}", result.final_value.round_dp(2));
    println!(
        "  Total return:    {} ({}%)",
        result.total_return.round_dp(2),
        result.total_return_percent.round_dp(2)
    );
    println!("  Max drawdown:    {}%", result.max_drawdown_percent.round_dp(2));
    println!("  Sharpe (simpl.): {}", result.sharpe_ratio);
    println!("  Trades:          {}", result.trades.len());

    if show_trades {
        println!();
        for trade in &result.trades {
            println!(
                "  {}  {:<4}  {:>8} x {:<10} {}",
                trade.date,
                format!("{:?}", trade.side).to_uppercase(),
                trade.quantity,
                trade.price,
                trade.reason
            );
        }
    }

    Ok(())
}

async fn cmd_list(user_id: &str) -> anyhow::Result<()> {
    let service = build_service().await?;
    let summaries = service.list_backtests(user_id).await?;

    if summaries.is_empty() {
        println!("No saved backtests for {}", user_id);
        return Ok(());
    }

    println!(
        "{:>5}  {:<24} {:<8} {:<10} {:<10} {:>12} {:>9}",
        "ID", "NAME", "SYMBOL", "START", "END", "FINAL", "RETURN%"
    );
    for s in summaries {
        println!(
            "{:>5}  {:<24} {:<8} {:<10} {:<10} {:>12} {:>9}",
            s.id,
            s.name,
            s.symbol,
            s.start_date,
            s.end_date,
            s.final_value.round_dp(2),
            s.total_return_percent.round_dp(2)
        );
    }
    Ok(())
}

async fn cmd_show(user_id: &str, id: i64) -> anyhow::Result<()> {
    let service = build_service().await?;
    let record = service.get_backtest(user_id, id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn cmd_delete(user_id: &str, id: i64) -> anyhow::Result<()> {
    let service = build_service().await?;
    service.delete_backtest(user_id, id).await?;
    info!("Deleted backtest {}", id);
    Ok(())
}

// ============================================================================
// API Handlers
// ============================================================================

type ApiResponse = (StatusCode, Json<serde_json::Value>);

fn user_id(headers: &HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_USER)
        .to_string()
}

fn status_for(err: &BacktestError) -> StatusCode {
    match err {
        BacktestError::Validation(_) => StatusCode::BAD_REQUEST,
        BacktestError::NoData | BacktestError::NotFound(_) => StatusCode::NOT_FOUND,
        BacktestError::DataSource(_) | BacktestError::Timeout(_) => StatusCode::BAD_GATEWAY,
        BacktestError::Storage(_) | BacktestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: BacktestError) -> ApiResponse {
    if matches!(err, BacktestError::Storage(_) | BacktestError::Internal(_)) {
        error!("Request failed: {}", err);
    }
    (
        status_for(&err),
        Json(serde_json::json!({
            "success": false,
            "message": err.user_message(),
        })),
    )
}

/// GET /api/health
async fn api_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "backtest-lab",
        "version": APP_VERSION,
    }))
}

/// POST /api/backtests — run and save a backtest
async fn api_create_backtest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<BacktestRequest>,
) -> ApiResponse {
    let user = user_id(&headers);
    let response = state.service.create_backtest(&user, &request).await;
    let status = if response.success {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, Json(serde_json::json!(response)))
}

/// GET /api/backtests — saved backtests of the caller, newest first
async fn api_list_backtests(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    match state.service.list_backtests(&user_id(&headers)).await {
        Ok(summaries) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "data": summaries,
                "total": summaries.len(),
            })),
        ),
        Err(e) => error_response(e),
    }
}

/// GET /api/backtests/:id — full record including trades and equity curve
async fn api_get_backtest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResponse {
    match state.service.get_backtest(&user_id(&headers), id).await {
        Ok(record) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "data": record,
            })),
        ),
        Err(e) => error_response(e),
    }
}

/// DELETE /api/backtests/:id
async fn api_delete_backtest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResponse {
    match state.service.delete_backtest(&user_id(&headers), id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "message": format!("Backtest {} deleted", id),
            })),
        ),
        Err(e) => error_response(e),
    }
}
