use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::observability::metrics::gather_text;
use crate::orchestrator::SourceRef;
use crate::types::{Pair, RateRecord};

#[derive(Debug, Default, Deserialize)]
pub struct CurrencyQuery {
    pub exchange: Option<String>,
    pub pair: Option<String>,
}

/// Validated read filters.
#[derive(Clone, Debug, Default)]
pub struct CurrencyFilter {
    pub source: Option<SourceRef>,
    pub pair: Option<Pair>,
}

impl CurrencyQuery {
    pub async fn validate(self, ctx: &AppContext) -> Result<CurrencyFilter> {
        let source = match self.exchange {
            Some(exchange) if !ctx.manager.registry().contains(&exchange).await => {
                return Err(Error::UnknownSource(exchange));
            }
            exchange => exchange.map(SourceRef::Id),
        };
        let pair = self.pair.as_deref().map(Pair::parse).transpose()?;

        Ok(CurrencyFilter { source, pair })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AvailableExchangesResponse {
    pub result: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct ExchangeRate {
    pub exchange: String,
    pub currency_rate: Option<f64>,
    /// Unix time in seconds
    pub last_update_timestamp: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct PairRates {
    pub pair_name: String,
    pub exchanges: Vec<ExchangeRate>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct CurrencyResponse {
    pub result: Vec<PairRates>,
}

impl CurrencyResponse {
    /// Group records by pair, one entry per exchange.
    pub fn from_records(records: Vec<RateRecord>) -> Self {
        let mut grouped: BTreeMap<Pair, Vec<ExchangeRate>> = BTreeMap::new();
        for record in records {
            grouped.entry(record.pair.clone()).or_default().push(ExchangeRate {
                currency_rate: record.rate,
                last_update_timestamp: record.last_update.map(|ts| ts.as_secs_f64()),
                exchange: record.source_id,
            });
        }

        let result = grouped.into_iter()
            .map(|(pair, exchanges)| PairRates { pair_name: pair.title(), exchanges })
            .collect();
        CurrencyResponse { result }
    }
}

/// Read through the refresh-on-miss reader and shape the response.
pub async fn read_currency(ctx: &AppContext, filter: &CurrencyFilter) -> Result<CurrencyResponse> {
    let mut reader = ctx.reader();
    if let Some(source) = &filter.source {
        reader = reader.source(source.clone());
    }
    if let Some(pair) = &filter.pair {
        reader = reader.pair(pair.clone());
    }

    Ok(CurrencyResponse::from_records(reader.read().await?))
}

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn available_exchanges(State(ctx): State<AppContext>) -> Json<AvailableExchangesResponse> {
    Json(AvailableExchangesResponse {
        result: ctx.manager.source_ids().await,
    })
}

/// Current rates from one or all exchanges, optionally for a single pair.
pub async fn get_currency_info(
    State(ctx): State<AppContext>,
    Query(query): Query<CurrencyQuery>,
) -> Result<Json<CurrencyResponse>> {
    let filter = query.validate(&ctx).await?;
    Ok(Json(read_currency(&ctx, &filter).await?))
}

pub async fn metrics() -> Result<String> {
    gather_text()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::create_router;
    use crate::config::AppConfig;
    use crate::scrapers::{ListenerState, RateSource};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct FixedSource {
        id: &'static str,
        pair: &'static str,
        rate: f64,
        state: ListenerState,
    }

    #[async_trait]
    impl RateSource for FixedSource {
        fn source_id(&self) -> &str {
            self.id
        }

        fn listener_state(&self) -> &ListenerState {
            &self.state
        }

        async fn fetch(&self, pair: Option<&Pair>) -> Result<Vec<RateRecord>> {
            let record = RateRecord::from_title(self.id, self.pair, self.rate)?;
            match pair {
                Some(pair) if *pair != record.pair => Ok(Vec::new()),
                _ => Ok(vec![record]),
            }
        }
    }

    fn fixed(id: &'static str, pair: &'static str, rate: f64) -> Arc<dyn RateSource> {
        Arc::new(FixedSource { id, pair, rate, state: ListenerState::new() })
    }

    async fn app() -> Router {
        let mut config = AppConfig::default();
        config.api.auth_token = "secret".to_string();
        let sources = vec![
            fixed("binance", "USDT_BTC", 0.5),
            fixed("kraken", "USDT_BTC", 0.4),
            fixed("other", "USDT_ETH", 0.1),
        ];
        create_router(AppContext::with_sources(config, sources).await.unwrap())
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_response_groups_by_pair() {
        let records = vec![
            RateRecord::from_title("binance", "USDT_BTC", 0.5).unwrap(),
            RateRecord::from_title("binance", "USDT_ETH", 0.1).unwrap(),
            RateRecord::from_title("kraken", "USDT_BTC", 0.4).unwrap(),
        ];

        let response = CurrencyResponse::from_records(records);
        assert_eq!(response.result.len(), 2);
        assert_eq!(response.result[0].pair_name, "USDT_BTC");
        let exchanges: Vec<&str> = response.result[0].exchanges.iter().map(|e| e.exchange.as_str()).collect();
        assert_eq!(exchanges, vec!["binance", "kraken"]);
        assert_eq!(response.result[1].exchanges[0].currency_rate, Some(0.1));
        assert!(response.result[1].exchanges[0].last_update_timestamp.is_some());
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let response = app().await.oneshot(get("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_auth_required() {
        let app = app().await;
        let response = app.clone().oneshot(get("/currency", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.oneshot(get("/available_exchanges", Some("wrong"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_available_exchanges() {
        let response = app().await.oneshot(get("/available_exchanges", Some("secret"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: AvailableExchangesResponse = body_json(response).await;
        assert_eq!(body.result, vec!["binance", "kraken", "other"]);
    }

    #[tokio::test]
    async fn test_invalid_query_is_bad_request() {
        let app = app().await;
        let response = app.clone().oneshot(get("/currency?pair=btcusdt", Some("secret"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.oneshot(get("/currency?exchange=nope", Some("secret"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_currency_reads_through_on_miss() {
        let response = app().await
            .oneshot(get("/currency?pair=usdt_btc", Some("secret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: CurrencyResponse = body_json(response).await;
        assert_eq!(body.result.len(), 1);
        assert_eq!(body.result[0].pair_name, "USDT_BTC");
        let rates: Vec<Option<f64>> = body.result[0].exchanges.iter().map(|e| e.currency_rate).collect();
        assert_eq!(rates, vec![Some(0.5), Some(0.4)]);
    }

    #[tokio::test]
    async fn test_currency_single_exchange() {
        let response = app().await
            .oneshot(get("/currency?exchange=other", Some("secret")))
            .await
            .unwrap();
        let body: CurrencyResponse = body_json(response).await;
        assert_eq!(body.result.len(), 1);
        assert_eq!(body.result[0].pair_name, "USDT_ETH");
        assert_eq!(body.result[0].exchanges[0].exchange, "other");
    }
}
