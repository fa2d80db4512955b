use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockcast_core::catalog::{self, Company};
use stockcast_core::forecast::artifact::{ModelNotFound, ModelStore};
use stockcast_core::forecast::{serve, ForecastRow, Target};
use stockcast_core::market::error::ProviderError;
use stockcast_core::market::twelvedata::TwelveDataClient;
use stockcast_core::market::types::HistoricalBar;
use stockcast_core::market::MarketDataClient;

mod render;
mod views;

use render::FormState;
use views::{InvalidInput, UnknownSymbol};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = stockcast_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let market: Arc<dyn MarketDataClient> = match TwelveDataClient::from_settings(&settings) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(
                error = %e,
                "market data client unavailable; starting dashboard in degraded mode"
            );
            Arc::new(UnconfiguredMarket)
        }
    };

    let store = ModelStore::new(settings.model_dir.clone());
    tracing::info!(model_dir = %store.dir().display(), "serving models");

    let state = AppState { market, store };

    let app = router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port));

    tracing::info!(%addr, "dashboard listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/healthz", get(healthz))
        .route("/trends", get(trends_page))
        .route("/predict", get(predict_page))
        .route("/compare", get(compare_page))
        .route("/api/tickers", get(list_tickers))
        .route("/api/history/:symbol", get(get_history))
        .route("/api/forecast/:symbol/:target", get(get_forecast))
        .route("/api/predict/:symbol", get(get_prediction))
        .route("/api/compare", get(get_comparison))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    market: Arc<dyn MarketDataClient>,
    store: ModelStore,
}

/// Stand-in when no API key is configured; every fetch reports the missing key.
struct UnconfiguredMarket;

#[async_trait::async_trait]
impl MarketDataClient for UnconfiguredMarket {
    fn provider_name(&self) -> &'static str {
        "unconfigured"
    }

    async fn fetch_daily_bars(
        &self,
        _symbol: &str,
        _start_date: NaiveDate,
        _end_date: Option<NaiveDate>,
    ) -> anyhow::Result<Vec<HistoricalBar>> {
        Err(ProviderError {
            provider: "unconfigured",
            code: None,
            message: "TWELVEDATA_API_KEY is not configured".to_string(),
        }
        .into())
    }
}

#[derive(Debug, Default, Deserialize)]
struct RangeParams {
    symbol: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PredictParams {
    symbol: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CompareParams {
    stock1: Option<String>,
    stock2: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn tomorrow() -> NaiveDate {
    let today = today();
    today.checked_add_days(Days::new(1)).unwrap_or(today)
}

fn selected(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn status_for(err: &anyhow::Error) -> StatusCode {
    if err.downcast_ref::<InvalidInput>().is_some() {
        StatusCode::BAD_REQUEST
    } else if err.downcast_ref::<UnknownSymbol>().is_some()
        || err.downcast_ref::<ModelNotFound>().is_some()
    {
        StatusCode::NOT_FOUND
    } else if let Some(pe) = err.downcast_ref::<ProviderError>() {
        tracing::warn!(
            provider = pe.provider,
            code = ?pe.code,
            message = %pe.message,
            "provider error"
        );
        StatusCode::BAD_GATEWAY
    } else {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Error page for HTML views: user mistakes get their message, everything else a generic one.
fn html_error(err: anyhow::Error, page: impl FnOnce(&str) -> String) -> (StatusCode, Html<String>) {
    let status = status_for(&err);
    let text = if status == StatusCode::INTERNAL_SERVER_ERROR {
        "Something went wrong. Please try again.".to_string()
    } else {
        err.to_string()
    };
    (status, Html(page(&render::message("error", &text))))
}

struct ApiError(anyhow::Error);

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

async fn home() -> Html<String> {
    Html(render::home_page())
}

async fn trends_page(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> (StatusCode, Html<String>) {
    let form = FormState {
        symbol: selected(&params.symbol),
        start_date: selected(&params.start_date),
        end_date: selected(&params.end_date),
        ..FormState::default()
    };
    let Some(symbol) = form.symbol else {
        return (StatusCode::OK, Html(render::trends_page(&form, "")));
    };

    match load_trends(&state, &form, symbol, today()).await {
        Ok(view) => (
            StatusCode::OK,
            Html(render::trends_page(&form, &render::trends_content(&view))),
        ),
        Err(err) => html_error(err, |content| render::trends_page(&form, content)),
    }
}

async fn load_trends(
    state: &AppState,
    form: &FormState<'_>,
    symbol: &str,
    today: NaiveDate,
) -> anyhow::Result<views::TrendsView> {
    let start = views::parse_date_or(form.start_date, today, "start_date")?;
    let end = views::parse_date_or(form.end_date, today, "end_date")?;
    views::trends(state.market.as_ref(), &state.store, symbol, start, end).await
}

async fn predict_page(
    State(state): State<AppState>,
    Query(params): Query<PredictParams>,
) -> (StatusCode, Html<String>) {
    let min_date = tomorrow();
    let form = FormState {
        symbol: selected(&params.symbol),
        date: selected(&params.date),
        ..FormState::default()
    };
    let Some(symbol) = form.symbol else {
        return (StatusCode::OK, Html(render::predict_page(&form, min_date, "")));
    };

    let date = form.date.map(str::to_string).unwrap_or_else(|| min_date.to_string());
    match views::predict(&state.store, symbol, &date, today()) {
        Ok(view) => (
            StatusCode::OK,
            Html(render::predict_page(&form, min_date, &render::predict_content(&view))),
        ),
        Err(err) => html_error(err, |content| render::predict_page(&form, min_date, content)),
    }
}

async fn compare_page(
    State(state): State<AppState>,
    Query(params): Query<CompareParams>,
) -> (StatusCode, Html<String>) {
    let today = today();
    let form = FormState {
        symbol: selected(&params.stock1),
        second_symbol: selected(&params.stock2),
        start_date: selected(&params.start_date),
        end_date: selected(&params.end_date),
        ..FormState::default()
    };
    let (Some(first), Some(second)) = (form.symbol, form.second_symbol) else {
        return (StatusCode::OK, Html(render::compare_page(&form, today, "")));
    };

    match load_comparison(&state, &form, first, second, today).await {
        Ok(view) => (
            StatusCode::OK,
            Html(render::compare_page(&form, today, &render::compare_content(&view))),
        ),
        Err(err) => html_error(err, |content| render::compare_page(&form, today, content)),
    }
}

async fn load_comparison(
    state: &AppState,
    form: &FormState<'_>,
    first: &str,
    second: &str,
    today: NaiveDate,
) -> anyhow::Result<views::CompareView> {
    let start = views::parse_date_or(form.start_date, today, "start_date")?;
    let end = views::parse_date_or(form.end_date, today, "end_date")?;
    views::compare(state.market.as_ref(), first, second, start, end, today).await
}

async fn list_tickers() -> Json<&'static [Company]> {
    Json(catalog::companies())
}

async fn get_history(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<RangeParams>,
) -> Result<Json<Vec<HistoricalBar>>, ApiError> {
    let company = views::lookup(&symbol)?;
    let today = today();
    let start = views::parse_date_or(selected(&params.start_date), today, "start_date")?;
    let end = views::parse_date_or(selected(&params.end_date), today, "end_date")?;
    views::check_range(start, end)?;

    let bars = state
        .market
        .fetch_daily_bars(company.symbol, start, Some(end))
        .await?;
    Ok(Json(views::window(&bars, start, end)))
}

#[derive(Debug, Serialize)]
struct ApiForecast {
    ticker: &'static str,
    target: Target,
    start_date: NaiveDate,
    end_date: NaiveDate,
    rows: Vec<ForecastRow>,
}

async fn get_forecast(
    State(state): State<AppState>,
    Path((symbol, target)): Path<(String, String)>,
    Query(params): Query<RangeParams>,
) -> Result<Json<ApiForecast>, ApiError> {
    let company = views::lookup(&symbol)?;
    let target: Target = target
        .parse()
        .map_err(|e: anyhow::Error| anyhow::Error::new(InvalidInput(e.to_string())))?;
    let today = today();
    let start = views::parse_date_or(selected(&params.start_date), today, "start_date")?;
    let end = views::parse_date_or(selected(&params.end_date), start, "end_date")?;
    views::check_range(start, end)?;

    let rows = serve::forecast_stored(&state.store, company.symbol, target, start, end)?;
    Ok(Json(ApiForecast {
        ticker: company.symbol,
        target,
        start_date: start,
        end_date: end,
        rows,
    }))
}

async fn get_prediction(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<PredictParams>,
) -> Result<Json<views::PredictView>, ApiError> {
    let date = selected(&params.date)
        .map(str::to_string)
        .unwrap_or_else(|| tomorrow().to_string());
    Ok(Json(views::predict(&state.store, &symbol, &date, today())?))
}

async fn get_comparison(
    State(state): State<AppState>,
    Query(params): Query<CompareParams>,
) -> Result<Json<views::CompareView>, ApiError> {
    let today = today();
    let first = selected(&params.stock1)
        .ok_or_else(|| anyhow::Error::new(InvalidInput("stock1 is required".to_string())))?;
    let second = selected(&params.stock2)
        .ok_or_else(|| anyhow::Error::new(InvalidInput("stock2 is required".to_string())))?;
    let start = views::parse_date_or(selected(&params.start_date), today, "start_date")?;
    let end = views::parse_date_or(selected(&params.end_date), today, "end_date")?;

    let view = views::compare(state.market.as_ref(), first, second, start, end, today).await?;
    Ok(Json(view))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &stockcast_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use stockcast_core::forecast::artifact::ModelArtifact;
    use stockcast_core::forecast::model::{AdditiveModel, ModelConfig};
    use tower::ServiceExt;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// AAPL succeeds with bars on both sides of any window, GS fails at the provider and every
    /// other symbol fails with an untyped error.
    struct FakeMarket;

    #[async_trait::async_trait]
    impl MarketDataClient for FakeMarket {
        fn provider_name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_daily_bars(
            &self,
            symbol: &str,
            _start_date: NaiveDate,
            _end_date: Option<NaiveDate>,
        ) -> anyhow::Result<Vec<HistoricalBar>> {
            match symbol {
                "AAPL" => Ok((0..7)
                    .map(|i| {
                        let px = 180.0 + i as f64;
                        HistoricalBar {
                            date: date(2024, 2, 28) + Days::new(i),
                            open: Some(px),
                            high: Some(px + 1.0),
                            low: Some(px - 1.0),
                            close: Some(px + 0.5),
                            volume: Some(1.0e6),
                        }
                    })
                    .rev()
                    .collect()),
                "GS" => Err(ProviderError {
                    provider: "fake",
                    code: Some(429),
                    message: "You have run out of API credits for the current minute.".to_string(),
                }
                .into()),
                _ => Err(anyhow::anyhow!("connection reset by peer")),
            }
        }
    }

    fn app(market: Arc<dyn MarketDataClient>, dir: &std::path::Path) -> Router {
        router(AppState {
            market,
            store: ModelStore::new(dir),
        })
    }

    fn save_models(dir: &std::path::Path, ticker: &str, targets: &[Target]) {
        let store = ModelStore::new(dir);
        let start = date(2023, 6, 1);
        let series: Vec<_> = (0..150)
            .map(|i| (start + Days::new(i), 50.0 + 0.2 * i as f64 + (i % 4) as f64))
            .collect();
        let model = AdditiveModel::fit(&series, ModelConfig::default()).unwrap();
        for &target in targets {
            store
                .save(&ModelArtifact::new(ticker, target, model.clone()))
                .unwrap();
        }
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let (status, body) = get(app, uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn healthz_and_tickers() {
        let dir = tempfile::tempdir().unwrap();

        let (status, body) = get(app(Arc::new(FakeMarket), dir.path()), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");

        let (status, json) = get_json(app(Arc::new(FakeMarket), dir.path()), "/api/tickers").await;
        assert_eq!(status, StatusCode::OK);
        let tickers = json.as_array().unwrap();
        assert_eq!(tickers.len(), 10);
        assert_eq!(tickers[0]["symbol"], "AAPL");
        assert_eq!(tickers[9]["name"], "Netflix");
    }

    #[tokio::test]
    async fn unknown_symbol_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = views::lookup("TSLA").unwrap_err();
        assert_eq!(status_for(&err), StatusCode::NOT_FOUND);

        for uri in [
            "/api/history/TSLA",
            "/api/forecast/TSLA/close",
            "/api/predict/TSLA?date=2999-01-01",
            "/api/compare?stock1=AAPL&stock2=TSLA",
        ] {
            let (status, json) = get_json(app(Arc::new(FakeMarket), dir.path()), uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(json["error"], "unknown symbol: TSLA", "{uri}");
        }

        let html = app(Arc::new(FakeMarket), dir.path());
        let (status, body) = get(html, "/trends?symbol=TSLA").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(String::from_utf8(body).unwrap().contains("unknown symbol: TSLA"));
    }

    #[tokio::test]
    async fn missing_model_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let uri = "/api/forecast/AAPL/close?start_date=2024-01-01&end_date=2024-01-05";

        let (status, json) = get_json(app(Arc::new(FakeMarket), dir.path()), uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Model files for AAPL not found.");
    }

    #[tokio::test]
    async fn forecast_returns_the_requested_window() {
        let dir = tempfile::tempdir().unwrap();
        save_models(dir.path(), "AAPL", &[Target::Close]);
        let uri = "/api/forecast/aapl/close?start_date=2024-01-01&end_date=2024-01-05";

        let (status, json) = get_json(app(Arc::new(FakeMarket), dir.path()), uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ticker"], "AAPL");
        assert_eq!(json["target"], "close");
        let rows = json["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0]["ds"], "2024-01-01");
        assert_eq!(rows[4]["ds"], "2024-01-05");
    }

    #[tokio::test]
    async fn bad_target_and_bad_dates_are_bad_requests() {
        let dir = tempfile::tempdir().unwrap();
        save_models(dir.path(), "AAPL", &Target::ALL);

        for uri in [
            "/api/forecast/AAPL/high",
            "/api/forecast/AAPL/close?start_date=2024-13-01",
            "/api/forecast/AAPL/close?start_date=2024-01-10&end_date=2024-01-01",
            "/api/forecast/AAPL/close?start_date=2024-01-01&end_date=9999-12-31",
            "/api/history/AAPL?start_date=2024-01-01&end_date=9999-12-31",
            "/api/predict/AAPL?date=2000-01-01",
        ] {
            let (status, json) = get_json(app(Arc::new(FakeMarket), dir.path()), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(json["error"].is_string(), "{uri}");
        }
    }

    #[tokio::test]
    async fn history_is_windowed_and_ascending() {
        let dir = tempfile::tempdir().unwrap();
        let uri = "/api/history/AAPL?start_date=2024-03-01&end_date=2024-03-03";

        let (status, json) = get_json(app(Arc::new(FakeMarket), dir.path()), uri).await;
        assert_eq!(status, StatusCode::OK);
        let dates: Vec<_> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|bar| bar["date"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(dates, vec!["2024-03-01", "2024-03-02", "2024-03-03"]);
    }

    #[tokio::test]
    async fn provider_error_is_bad_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let uri = "/api/history/GS?start_date=2024-01-01&end_date=2024-01-05";

        let (status, json) = get_json(app(Arc::new(FakeMarket), dir.path()), uri).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(
            json["error"],
            "Error fetching data: You have run out of API credits for the current minute."
        );
    }

    #[tokio::test]
    async fn other_errors_are_generic_server_errors() {
        let dir = tempfile::tempdir().unwrap();
        let uri = "/api/history/MAC?start_date=2024-01-01&end_date=2024-01-05";

        let (status, json) = get_json(app(Arc::new(FakeMarket), dir.path()), uri).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "internal error");
    }

    #[tokio::test]
    async fn degraded_mode_still_serves_predictions() {
        let dir = tempfile::tempdir().unwrap();
        save_models(dir.path(), "AAPL", &Target::ALL);

        let (status, json) = get_json(
            app(Arc::new(UnconfiguredMarket), dir.path()),
            "/api/history/AAPL?start_date=2024-01-01&end_date=2024-01-05",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(json["error"]
            .as_str()
            .unwrap()
            .contains("TWELVEDATA_API_KEY is not configured"));

        let (status, json) = get_json(
            app(Arc::new(UnconfiguredMarket), dir.path()),
            "/api/predict/AAPL?date=2999-01-01",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["company"]["symbol"], "AAPL");
        assert_eq!(json["outcome"]["status"], "available");
    }
}
