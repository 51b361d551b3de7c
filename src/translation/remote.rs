//! 远程翻译服务
//!
//! 所有在线词典都实现 `RemoteTranslator`。非成功状态码、传输错误和无法解析的响应
//! 一律返回 `RemoteError`，由查询服务决定是否重试。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::{LookupConfig, ProviderConfig, ProviderKind};
use crate::error::{RemoteError, RemoteResult};

/// 远程翻译协作者
#[async_trait]
pub trait RemoteTranslator: Send + Sync {
    /// 服务名称，用于日志
    fn name(&self) -> &str;

    /// 查询单个词的译文
    async fn lookup(&self, word: &str, source_lang: &str, target_lang: &str)
        -> RemoteResult<String>;

    /// 单次 `lookup` 允许的总时长，`per_call` 为单个服务的超时
    fn call_budget(&self, per_call: Duration) -> Duration {
        per_call
    }
}

fn build_client(timeout: Duration) -> RemoteResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("lexistream/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| RemoteError::Unavailable(format!("无法创建HTTP客户端: {}", e)))
}

/// 检查状态码，429 单独识别为限流
fn check_status(status: StatusCode, service: &str) -> RemoteResult<()> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(RemoteError::RateLimited);
    }
    if !status.is_success() {
        return Err(RemoteError::Unavailable(format!("{} 返回 {}", service, status)));
    }
    Ok(())
}

fn non_empty(text: Option<&str>, service: &str) -> RemoteResult<String> {
    match text.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(RemoteError::Malformed(format!("{} 响应中没有译文", service))),
    }
}

/// MyMemory 免费翻译接口
///
/// `GET {api_url}?q=WORD&langpair=SRC|TGT`，译文在 `responseData.translatedText`。
#[derive(Clone)]
pub struct MyMemoryTranslator {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl MyMemoryTranslator {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> RemoteResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            api_url: api_url.into(),
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// 解析响应体
    pub fn parse_response(body: &Value) -> RemoteResult<String> {
        // 配额用尽时 HTTP 状态仍为 200，真实状态在 responseStatus
        match body.get("responseStatus") {
            Some(Value::Number(n)) if n.as_u64() == Some(429) => {
                return Err(RemoteError::RateLimited)
            }
            Some(Value::Number(n)) if n.as_u64() != Some(200) => {
                return Err(RemoteError::Unavailable(format!("MyMemory 状态 {}", n)))
            }
            _ => {}
        }

        non_empty(
            body.pointer("/responseData/translatedText")
                .and_then(Value::as_str),
            "MyMemory",
        )
    }
}

#[async_trait]
impl RemoteTranslator for MyMemoryTranslator {
    fn name(&self) -> &str {
        "mymemory"
    }

    async fn lookup(
        &self,
        word: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> RemoteResult<String> {
        let langpair = format!("{}|{}", source_lang, target_lang);
        let mut query = vec![("q", word), ("langpair", langpair.as_str())];
        if let Some(key) = &self.api_key {
            query.push(("key", key.as_str()));
        }

        let response = self.client.get(&self.api_url).query(&query).send().await?;
        check_status(response.status(), "MyMemory")?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| RemoteError::Malformed(format!("MyMemory 响应无法解析: {}", e)))?;

        Self::parse_response(&body)
    }
}

/// LibreTranslate 接口
///
/// `POST {api_url}`，请求体 `{q, source, target, format}`，译文在 `translatedText`。
#[derive(Clone)]
pub struct LibreTranslateTranslator {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl LibreTranslateTranslator {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> RemoteResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            api_url: api_url.into(),
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn parse_response(body: &Value) -> RemoteResult<String> {
        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Err(RemoteError::Unavailable(format!("LibreTranslate: {}", error)));
        }
        non_empty(
            body.get("translatedText").and_then(Value::as_str),
            "LibreTranslate",
        )
    }
}

#[async_trait]
impl RemoteTranslator for LibreTranslateTranslator {
    fn name(&self) -> &str {
        "libretranslate"
    }

    async fn lookup(
        &self,
        word: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> RemoteResult<String> {
        let mut body = json!({
            "q": word,
            "source": source_lang,
            "target": target_lang,
            "format": "text",
        });
        if let Some(key) = &self.api_key {
            body["api_key"] = Value::String(key.clone());
        }

        let response = self.client.post(&self.api_url).json(&body).send().await?;
        check_status(response.status(), "LibreTranslate")?;

        let body: Value = response.json().await.map_err(|e| {
            RemoteError::Malformed(format!("LibreTranslate 响应无法解析: {}", e))
        })?;

        Self::parse_response(&body)
    }
}

/// Lingva 接口
///
/// `GET {api_url}/{SRC}/{TGT}/{WORD}`，译文在 `translation`。
#[derive(Clone)]
pub struct LingvaTranslator {
    client: reqwest::Client,
    api_url: reqwest::Url,
}

impl LingvaTranslator {
    pub fn new(api_url: &str, timeout: Duration) -> RemoteResult<Self> {
        let api_url = reqwest::Url::parse(api_url).map_err(|e| {
            RemoteError::Unavailable(format!("Lingva 地址无效 {}: {}", api_url, e))
        })?;
        if api_url.cannot_be_a_base() {
            return Err(RemoteError::Unavailable(format!("Lingva 地址无效: {}", api_url)));
        }

        Ok(Self {
            client: build_client(timeout)?,
            api_url,
        })
    }

    /// 单词作为路径段，由 `Url` 负责百分号编码
    fn request_url(&self, word: &str, source_lang: &str, target_lang: &str) -> reqwest::Url {
        let mut url = self.api_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([source_lang, target_lang, word]);
        }
        url
    }

    pub fn parse_response(body: &Value) -> RemoteResult<String> {
        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Err(RemoteError::Unavailable(format!("Lingva: {}", error)));
        }
        non_empty(body.get("translation").and_then(Value::as_str), "Lingva")
    }
}

#[async_trait]
impl RemoteTranslator for LingvaTranslator {
    fn name(&self) -> &str {
        "lingva"
    }

    async fn lookup(
        &self,
        word: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> RemoteResult<String> {
        let url = self.request_url(word, source_lang, target_lang);
        let response = self.client.get(url).send().await?;
        check_status(response.status(), "Lingva")?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| RemoteError::Malformed(format!("Lingva 响应无法解析: {}", e)))?;

        Self::parse_response(&body)
    }
}

/// SimplyTranslate 接口
///
/// `GET {api_url}?engine=google&from=SRC&to=TGT&text=WORD`，
/// 译文在 `translation`，新版实例使用 `translated_text`。
#[derive(Clone)]
pub struct SimplyTranslateTranslator {
    client: reqwest::Client,
    api_url: String,
    engine: String,
}

impl SimplyTranslateTranslator {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> RemoteResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            api_url: api_url.into(),
            engine: "google".to_string(),
        })
    }

    pub fn parse_response(body: &Value) -> RemoteResult<String> {
        let text = body
            .get("translation")
            .or_else(|| body.get("translated_text"))
            .and_then(Value::as_str);
        non_empty(text, "SimplyTranslate")
    }
}

#[async_trait]
impl RemoteTranslator for SimplyTranslateTranslator {
    fn name(&self) -> &str {
        "simplytranslate"
    }

    async fn lookup(
        &self,
        word: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> RemoteResult<String> {
        let query = [
            ("engine", self.engine.as_str()),
            ("from", source_lang),
            ("to", target_lang),
            ("text", word),
        ];

        let response = self.client.get(&self.api_url).query(&query).send().await?;
        check_status(response.status(), "SimplyTranslate")?;

        let body: Value = response.json().await.map_err(|e| {
            RemoteError::Malformed(format!("SimplyTranslate 响应无法解析: {}", e))
        })?;

        Self::parse_response(&body)
    }
}

/// DeepL 接口
///
/// `POST {api_url}`，`Authorization: DeepL-Auth-Key KEY`，
/// 请求体 `{text: [WORD], source_lang, target_lang}`，译文在 `translations[0].text`。
#[derive(Clone)]
pub struct DeepLTranslator {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl DeepLTranslator {
    /// DeepL 用 456 表示额度用尽
    const QUOTA_EXCEEDED: u16 = 456;

    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> RemoteResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            api_url: api_url.into(),
            api_key: api_key.into(),
        })
    }

    pub fn parse_response(body: &Value) -> RemoteResult<String> {
        if let Some(message) = body.get("message").and_then(Value::as_str) {
            return Err(RemoteError::Unavailable(format!("DeepL: {}", message)));
        }
        non_empty(
            body.pointer("/translations/0/text").and_then(Value::as_str),
            "DeepL",
        )
    }
}

#[async_trait]
impl RemoteTranslator for DeepLTranslator {
    fn name(&self) -> &str {
        "deepl"
    }

    async fn lookup(
        &self,
        word: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> RemoteResult<String> {
        let body = json!({
            "text": [word],
            "source_lang": source_lang.to_uppercase(),
            "target_lang": target_lang.to_uppercase(),
        });

        let response = self
            .client
            .post(&self.api_url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("DeepL-Auth-Key {}", self.api_key),
            )
            .json(&body)
            .send()
            .await?;
        if response.status().as_u16() == Self::QUOTA_EXCEEDED {
            return Err(RemoteError::RateLimited);
        }
        check_status(response.status(), "DeepL")?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| RemoteError::Malformed(format!("DeepL 响应无法解析: {}", e)))?;

        Self::parse_response(&body)
    }
}

/// 按顺序尝试多个远程服务，第一个成功的结果生效
///
/// 设置了单服务超时时，每个服务各自计时，挂起的服务不会拖住后面的服务。
pub struct FallbackChain {
    providers: Vec<Arc<dyn RemoteTranslator>>,
    per_provider_timeout: Option<Duration>,
}

impl FallbackChain {
    pub fn new(providers: Vec<Arc<dyn RemoteTranslator>>) -> Self {
        Self {
            providers,
            per_provider_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_provider_timeout = Some(timeout);
        self
    }

    /// 按配置构建服务链
    pub fn from_config(config: &LookupConfig) -> RemoteResult<Self> {
        let providers = config
            .providers
            .iter()
            .map(|provider| build_provider(provider, config.timeout()))
            .collect::<RemoteResult<Vec<_>>>()?;

        Ok(Self::new(providers).with_timeout(config.timeout()))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

fn build_provider(
    provider: &ProviderConfig,
    timeout: Duration,
) -> RemoteResult<Arc<dyn RemoteTranslator>> {
    let translator: Arc<dyn RemoteTranslator> = match provider.kind {
        ProviderKind::MyMemory => Arc::new(
            MyMemoryTranslator::new(&provider.api_url, timeout)?
                .with_api_key(provider.api_key.clone()),
        ),
        ProviderKind::LibreTranslate => Arc::new(
            LibreTranslateTranslator::new(&provider.api_url, timeout)?
                .with_api_key(provider.api_key.clone()),
        ),
        ProviderKind::Lingva => Arc::new(LingvaTranslator::new(&provider.api_url, timeout)?),
        ProviderKind::SimplyTranslate => {
            Arc::new(SimplyTranslateTranslator::new(&provider.api_url, timeout)?)
        }
        ProviderKind::DeepL => {
            let api_key = provider.api_key.clone().ok_or_else(|| {
                RemoteError::Unavailable("DeepL 需要 api_key".to_string())
            })?;
            Arc::new(DeepLTranslator::new(&provider.api_url, api_key, timeout)?)
        }
    };
    Ok(translator)
}

#[async_trait]
impl RemoteTranslator for FallbackChain {
    fn name(&self) -> &str {
        "fallback-chain"
    }

    async fn lookup(
        &self,
        word: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> RemoteResult<String> {
        let mut last_error = RemoteError::Unavailable("没有配置远程服务".to_string());

        for provider in &self.providers {
            let attempt = provider.lookup(word, source_lang, target_lang);
            let result = match self.per_provider_timeout {
                Some(limit) => tokio::time::timeout(limit, attempt)
                    .await
                    .map_err(RemoteError::from)
                    .and_then(|result| result),
                None => attempt.await,
            };

            match result {
                Ok(text) => {
                    tracing::debug!("{} 翻译 '{}' -> '{}'", provider.name(), word, text);
                    return Ok(text);
                }
                Err(e) => {
                    tracing::debug!(
                        "{} 查询 '{}' 失败，尝试下一个服务: {}",
                        provider.name(),
                        word,
                        e
                    );
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    fn call_budget(&self, per_call: Duration) -> Duration {
        let per_provider = self.per_provider_timeout.unwrap_or(per_call);
        let count = u32::try_from(self.providers.len().max(1)).unwrap_or(u32::MAX);
        per_provider.saturating_mul(count)
    }
}

/// 远程请求限速器
///
/// 按固定间隔发放请求时隙，并发调用方依次排队。
pub struct RateLimiter {
    spacing: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// 等待下一个可用时隙
    pub async fn acquire(&self) {
        if self.spacing.is_zero() {
            return;
        }

        let slot = {
            let mut next = self.next_slot.lock().await;
            let slot = (*next).max(Instant::now());
            *next = slot + self.spacing;
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}
