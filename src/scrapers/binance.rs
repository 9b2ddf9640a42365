use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use futures::Sink;
use futures_util::SinkExt;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use crate::config::{SourcesConfig, VenueConfig};
use crate::error::{Error, Result};
use crate::scrapers::{
    http_client, mid_price, parse_price, reciprocal, ListenerRun, ListenerState, RateSource,
    RateStream, SourceKind,
};
use crate::types::{Pair, RateRecord};

/// Quote assets used to split concatenated Binance symbols, longest first.
const QUOTE_ASSETS: &[&str] = &[
    "FDUSD", "USDT", "USDC", "TUSD", "BUSD", "USDP", "DAI", "BTC", "ETH", "BNB", "EUR", "TRY",
    "BRL", "GBP", "AUD", "JPY", "XRP", "TRX", "DOGE",
];

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const DEFAULT_STREAM_URL: &str = "wss://stream.binance.com:9443";

/// Quiet-stream bound so the stop flag is still checked.
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct BinanceSource {
    client: reqwest::Client,
    base_url: String,
    stream_url: String,
    stream_pairs: Vec<Pair>,
    poll_interval: Duration,
    auto_start: bool,
    listener: ListenerState,
}

impl SourceKind for BinanceSource {
    const SOURCE_ID: &'static str = "binance";
}

pub fn from_config(config: &SourcesConfig) -> Result<Option<Arc<dyn RateSource>>> {
    if !config.binance.enabled {
        return Ok(None);
    }
    Ok(Some(Arc::new(BinanceSource::new(&config.binance)?)))
}

impl BinanceSource {
    pub fn new(config: &VenueConfig) -> Result<Self> {
        let stream_pairs = config.stream_pairs.iter()
            .map(|title| Pair::parse(title))
            .collect::<Result<Vec<_>>>()?;

        Ok(BinanceSource {
            client: http_client(Self::SOURCE_ID, config.request_timeout())?,
            base_url: config.base_url_or(DEFAULT_BASE_URL),
            stream_url: config.stream_url_or(DEFAULT_STREAM_URL),
            stream_pairs,
            poll_interval: config.poll_interval(),
            auto_start: config.auto_start,
            listener: ListenerState::new(),
        })
    }

    /// `BTCUSDT` -> `BTC_USDT`, using the known quote asset suffixes.
    pub fn split_symbol(symbol: &str) -> Option<Pair> {
        let symbol = symbol.to_uppercase();
        QUOTE_ASSETS.iter()
            .filter(|quote| symbol.len() > quote.len() && symbol.ends_with(*quote))
            .max_by_key(|quote| quote.len())
            .and_then(|quote| Pair::new(&symbol[..symbol.len() - quote.len()], quote).ok())
    }

    /// Venue symbol for a canonical pair and whether its price must be inverted.
    pub fn venue_symbol(pair: &Pair) -> (String, bool) {
        let is_quote = |asset: &str| QUOTE_ASSETS.contains(&asset);
        if !is_quote(pair.quote()) && is_quote(pair.base()) {
            (format!("{}{}", pair.quote(), pair.base()), true)
        } else {
            (format!("{}{}", pair.base(), pair.quote()), false)
        }
    }

    fn ticker_url(&self) -> String {
        format!("{}/api/v3/ticker/bookTicker", self.base_url)
    }

    /// `None` when Binance does not list the symbol.
    async fn fetch_symbol(&self, symbol: &str) -> Result<Option<BookTicker>> {
        let response = self.client
            .get(self.ticker_url())
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| Error::fetch(Self::SOURCE_ID, e))?;

        // Binance answers 400 with code -1121 for unknown symbols
        if response.status() == StatusCode::BAD_REQUEST {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| Error::fetch(Self::SOURCE_ID, e))?;

        let ticker = response
            .json::<BookTicker>()
            .await
            .map_err(|e| Error::fetch(Self::SOURCE_ID, e))?;
        Ok(Some(ticker))
    }

    async fn fetch_pair(&self, pair: &Pair) -> Result<Vec<RateRecord>> {
        let (symbol, inverted) = Self::venue_symbol(pair);
        let (fallback_symbol, fallback_inverted) = Self::venue_symbol(&pair.inverted());
        let mut candidates = vec![(symbol, inverted)];
        if fallback_symbol != candidates[0].0 {
            candidates.push((fallback_symbol, !fallback_inverted));
        }

        for (symbol, inverted) in &candidates {
            let Some(ticker) = self.fetch_symbol(symbol).await? else {
                tracing::debug!("Binance does not list {}", symbol);
                continue;
            };
            let Some(mid) = ticker.mid()? else {
                return Ok(Vec::new());
            };
            let rate = if *inverted { reciprocal(mid) } else { Some(mid) };
            return Ok(rate
                .map(|rate| RateRecord::new(Self::SOURCE_ID, pair.clone(), rate))
                .into_iter()
                .collect());
        }

        Ok(Vec::new())
    }

    async fn fetch_all(&self) -> Result<Vec<RateRecord>> {
        let tickers = self.client
            .get(self.ticker_url())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::fetch(Self::SOURCE_ID, e))?
            .json::<Vec<BookTicker>>()
            .await
            .map_err(|e| Error::fetch(Self::SOURCE_ID, e))?;

        let mut records = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            let Some(pair) = Self::split_symbol(&ticker.symbol) else {
                continue;
            };
            if let Some(mid) = ticker.mid()? {
                records.push(RateRecord::new(Self::SOURCE_ID, pair, mid));
            }
        }

        tracing::debug!("Binance returned {} rates", records.len());
        Ok(records)
    }

    fn combined_stream_url(&self, stream_url: &str) -> String {
        let streams: Vec<String> = self.stream_pairs.iter()
            .map(|pair| format!("{}@bookTicker", Self::venue_symbol(pair).0.to_lowercase()))
            .collect();
        format!("{}/stream?streams={}", stream_url, streams.join("/"))
    }

    /// Push listener: one batch per book ticker update on the subscribed pairs.
    fn open_stream_listener(self: Arc<Self>, url: String, delay: Duration, max_iterations: Option<u64>) -> RateStream {
        let subscriptions: HashMap<String, (Pair, bool)> = self.stream_pairs.iter()
            .map(|pair| {
                let (symbol, inverted) = Self::venue_symbol(pair);
                (symbol, (pair.clone(), inverted))
            })
            .collect();

        let state = StreamState {
            run: ListenerRun::begin(self, max_iterations),
            url,
            socket: None,
            subscriptions,
            reconnect_delay: delay,
        };

        stream::unfold(state, |mut state| async move {
            if state.run.should_exit() {
                if let Some(mut socket) = state.socket.take() {
                    let _ = socket.close(None).await;
                }
                return None;
            }
            let batch = state.next_batch().await;
            state.run.record_iteration();
            Some((batch, state))
        })
        .boxed()
    }
}

#[async_trait]
impl RateSource for BinanceSource {
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

    fn open_listener(self: Arc<Self>, delay: Option<Duration>, max_iterations: Option<u64>) -> RateStream {
        let delay = delay.unwrap_or(self.poll_interval);
        if self.stream_pairs.is_empty() {
            return crate::scrapers::poll_listener(self, delay, max_iterations);
        }

        let url = self.combined_stream_url(&self.stream_url);
        tracing::info!("Binance listener in push mode: {}", url);
        self.open_stream_listener(url, delay, max_iterations)
    }
}

struct StreamState {
    run: ListenerRun<BinanceSource>,
    url: String,
    socket: Option<WsStream>,
    subscriptions: HashMap<String, (Pair, bool)>,
    reconnect_delay: Duration,
}

impl StreamState {
    async fn next_batch(&mut self) -> Result<Vec<RateRecord>> {
        if self.socket.is_none() {
            match connect_async(self.url.as_str()).await {
                Ok((socket, _)) => {
                    tracing::info!("Connected to Binance stream");
                    self.socket = Some(socket);
                }
                Err(e) => {
                    tokio::time::sleep(self.reconnect_delay).await;
                    return Err(Error::fetch(BinanceSource::SOURCE_ID, format!("WebSocket connection failed: {}", e)));
                }
            }
        }

        let Some(socket) = self.socket.as_mut() else {
            return Ok(Vec::new());
        };

        loop {
            let message = match tokio::time::timeout(STREAM_IDLE_TIMEOUT, socket.next()).await {
                Err(_) => return Ok(Vec::new()),
                Ok(None) => {
                    self.socket = None;
                    return Err(Error::fetch(BinanceSource::SOURCE_ID, "stream closed"));
                }
                Ok(Some(Err(e))) => {
                    self.socket = None;
                    return Err(Error::fetch(BinanceSource::SOURCE_ID, e));
                }
                Ok(Some(Ok(message))) => message,
            };

            match message {
                Message::Text(text) => return self.decode(&text),
                Message::Ping(payload) => {
                    if let Err(e) = send_pong(&mut *socket, payload).await {
                        self.socket = None;
                        return Err(e);
                    }
                }
                Message::Close(_) => {
                    self.socket = None;
                    return Err(Error::fetch(BinanceSource::SOURCE_ID, "stream closed by venue"));
                }
                _ => {}
            }
        }
    }

    fn decode(&self, text: &str) -> Result<Vec<RateRecord>> {
        let envelope: StreamEnvelope = serde_json::from_str(text)
            .map_err(|e| Error::fetch(BinanceSource::SOURCE_ID, format!("decode failed: {}", e)))?;
        let ticker = envelope.data;

        let Some((pair, inverted)) = self.subscriptions.get(&ticker.symbol.to_uppercase()) else {
            return Ok(Vec::new());
        };
        let mid = ticker.mid()?;
        let rate = if *inverted { mid.and_then(reciprocal) } else { mid };

        Ok(rate
            .map(|rate| RateRecord::new(BinanceSource::SOURCE_ID, pair.clone(), rate))
            .into_iter()
            .collect())
    }
}

/// Answer a venue ping. A failed send means the connection is gone.
async fn send_pong<S>(sink: &mut S, payload: Vec<u8>) -> Result<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    sink.send(Message::Pong(payload))
        .await
        .map_err(|e| Error::fetch(BinanceSource::SOURCE_ID, format!("pong failed: {}", e)))
}

#[derive(Debug, Deserialize)]
struct BookTicker {
    #[serde(alias = "s")]
    symbol: String,
    #[serde(rename = "bidPrice", alias = "b")]
    bid_price: String,
    #[serde(rename = "askPrice", alias = "a")]
    ask_price: String,
}

impl BookTicker {
    fn mid(&self) -> Result<Option<f64>> {
        let bid = parse_price(BinanceSource::SOURCE_ID, &self.bid_price)?;
        let ask = parse_price(BinanceSource::SOURCE_ID, &self.ask_price)?;
        Ok(mid_price(bid, ask))
    }
}

#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    data: BookTicker,
}
