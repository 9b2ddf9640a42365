use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use crate::config::{SourcesConfig, VenueConfig};
use crate::error::{Error, Result};
use crate::scrapers::{
    http_client, mid_price, parse_price, reciprocal, ListenerState, RateSource, SourceKind,
};
use crate::types::{Pair, RateRecord};

const DEFAULT_BASE_URL: &str = "https://api.kraken.com";

/// Kraken's legacy asset codes that differ from common tickers.
const ASSET_ALIASES: &[(&str, &str)] = &[("XBT", "BTC"), ("XDG", "DOGE")];

pub struct KrakenSource {
    client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
    auto_start: bool,
    listener: ListenerState,
    /// Venue pair key (e.g. `XXBTZUSD`) -> canonical pair, loaded once
    asset_pairs: OnceCell<HashMap<String, Pair>>,
}

impl SourceKind for KrakenSource {
    const SOURCE_ID: &'static str = "kraken";
}

pub fn from_config(config: &SourcesConfig) -> Result<Option<Arc<dyn RateSource>>> {
    if !config.kraken.enabled {
        return Ok(None);
    }
    Ok(Some(Arc::new(KrakenSource::new(&config.kraken)?)))
}

impl KrakenSource {
    pub fn new(config: &VenueConfig) -> Result<Self> {
        Ok(KrakenSource {
            client: http_client(Self::SOURCE_ID, config.request_timeout())?,
            base_url: config.base_url_or(DEFAULT_BASE_URL),
            poll_interval: config.poll_interval(),
            auto_start: config.auto_start,
            listener: ListenerState::new(),
            asset_pairs: OnceCell::new(),
        })
    }

    pub fn canonical_asset(asset: &str) -> String {
        let asset = asset.to_uppercase();
        ASSET_ALIASES.iter()
            .find(|(venue, _)| *venue == asset)
            .map(|(_, common)| common.to_string())
            .unwrap_or(asset)
    }

    /// `XBT/USDT` -> `BTC_USDT`
    pub fn parse_wsname(wsname: &str) -> Option<Pair> {
        let (base, quote) = wsname.split_once('/')?;
        Pair::new(&Self::canonical_asset(base), &Self::canonical_asset(quote)).ok()
    }

    async fn public<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<T> {
        let response: KrakenResponse<T> = self.client
            .get(format!("{}/0/public/{}", self.base_url, endpoint))
            .query(query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::fetch(Self::SOURCE_ID, e))?
            .json()
            .await
            .map_err(|e| Error::fetch(Self::SOURCE_ID, e))?;

        if !response.error.is_empty() {
            return Err(Error::fetch(Self::SOURCE_ID, response.error.join("; ")));
        }
        response.result
            .ok_or_else(|| Error::fetch(Self::SOURCE_ID, format!("{} returned no result", endpoint)))
    }

    async fn asset_pairs(&self) -> Result<&HashMap<String, Pair>> {
        self.asset_pairs
            .get_or_try_init(|| async {
                let raw: HashMap<String, AssetPairInfo> = self.public("AssetPairs", &[]).await?;
                let pairs: HashMap<String, Pair> = raw.into_iter()
                    .filter_map(|(key, info)| {
                        let pair = info.wsname.as_deref().and_then(Self::parse_wsname)?;
                        Some((key, pair))
                    })
                    .collect();
                tracing::info!("Kraken asset pairs loaded: {}", pairs.len());
                Ok::<_, Error>(pairs)
            })
            .await
    }

    fn to_record(pair: Pair, ticker: &KrakenTicker, inverted: bool) -> Result<Option<RateRecord>> {
        let (Some(ask), Some(bid)) = (ticker.a.first(), ticker.b.first()) else {
            return Ok(None);
        };
        let mid = mid_price(
            parse_price(Self::SOURCE_ID, bid)?,
            parse_price(Self::SOURCE_ID, ask)?,
        );
        let rate = if inverted { mid.and_then(reciprocal) } else { mid };
        Ok(rate.map(|rate| RateRecord::new(Self::SOURCE_ID, pair, rate)))
    }

    async fn fetch_pair(&self, pair: &Pair) -> Result<Vec<RateRecord>> {
        let asset_pairs = self.asset_pairs().await?;
        let inverted_pair = pair.inverted();

        let found = asset_pairs.iter()
            .find(|(_, canonical)| *canonical == pair)
            .map(|(key, _)| (key, false))
            .or_else(|| asset_pairs.iter()
                .find(|(_, canonical)| **canonical == inverted_pair)
                .map(|(key, _)| (key, true)));

        let Some((key, inverted)) = found else {
            tracing::debug!("Kraken does not list {}", pair);
            return Ok(Vec::new());
        };

        let tickers: HashMap<String, KrakenTicker> = self.public("Ticker", &[("pair", key.as_str())]).await?;
        let Some(ticker) = tickers.get(key).or_else(|| tickers.values().next()) else {
            return Ok(Vec::new());
        };
        Ok(Self::to_record(pair.clone(), ticker, inverted)?.into_iter().collect())
    }

    async fn fetch_all(&self) -> Result<Vec<RateRecord>> {
        let asset_pairs = self.asset_pairs().await?;
        let tickers: HashMap<String, KrakenTicker> = self.public("Ticker", &[]).await?;

        let mut records = Vec::with_capacity(tickers.len());
        for (key, ticker) in &tickers {
            let Some(pair) = asset_pairs.get(key) else {
                continue;
            };
            if let Some(record) = Self::to_record(pair.clone(), ticker, false)? {
                records.push(record);
            }
        }

        records.sort_by(|a, b| a.pair.cmp(&b.pair));
        tracing::debug!("Kraken returned {} rates", records.len());
        Ok(records)
    }
}

#[async_trait]
impl RateSource for KrakenSource {
    fn source_id(&self) -> &str {
        Self::SOURCE_ID
    }

    fn auto_start(&self) -> bool {
        self.auto_start
    }

    fn default_delay(&self) -> Duration {
        self.poll_interval
    }

    fn listener_state(&self) -> &ListenerState {
        &self.listener
    }

    async fn fetch(&self, pair: Option<&Pair>) -> Result<Vec<RateRecord>> {
        match pair {
            Some(pair) => self.fetch_pair(pair).await,
            None => self.fetch_all().await,
        }
    }
}

#[derive(Debug, Deserialize)]
struct KrakenResponse<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct AssetPairInfo {
    wsname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KrakenTicker {
    /// Ask: [price, whole lot volume, lot volume]
    a: Vec<String>,
    /// Bid: [price, whole lot volume, lot volume]
    b: Vec<String>,
}
