//! 单词查询服务
//!
//! 包装规范词典存储的运行时查询入口，负责缓存命中、远程回退、写回与并发请求合并。
//!
//! ## 查询流程
//!
//! 1. 按构建器规则规范化输入，结果为空时直接返回原词（`Origin::Unresolved`）
//! 2. 查询存储，命中即返回（`Origin::Cache`）
//! 3. 未命中且启用远程查询时，经限速器发出远程请求：单次超时 T，最多重试 R 次，
//!    重试前按 `base × 2^attempt` 退避并受上限约束
//! 4. 远程成功后规范化译文，以 `unverified` 标签写回存储（`Origin::Remote`）
//! 5. 其余情况返回原词（`Origin::Unresolved`）
//!
//! 查询从不向调用方返回错误，失败只体现在 `origin` 上，批量调用方可以继续推进。
//!
//! ## 请求合并
//!
//! 同一规范化单词的并发未命中共享同一个 `Shared` future，只会产生一次远程调用和一次写回。
//! 共享 future 完成后才从 in-flight 表中移除，并且只在表项仍指向同一个 future 时移除。
//! 共享 future 在发出远程请求前会再次检查存储。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};

use crate::config::LookupConfig;
use crate::dictionary::{
    normalize_translation, normalize_word, DictionaryEntry, DictionaryStore, Tag, UpsertMode,
};
use crate::error::{helpers::log_remote_failure, RemoteError, RemoteResult};
use crate::translation::remote::{FallbackChain, RateLimiter, RemoteTranslator};

/// 译文来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Cache,
    Remote,
    Unresolved,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Cache => "cache",
            Origin::Remote => "remote",
            Origin::Unresolved => "unresolved",
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单次查询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResult {
    pub text: String,
    pub origin: Origin,
}

impl LookupResult {
    fn unresolved(word: &str) -> Self {
        Self {
            text: word.to_string(),
            origin: Origin::Unresolved,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.origin != Origin::Unresolved
    }
}

/// 共享 future 的输出
#[derive(Debug, Clone)]
enum Resolution {
    /// 排队期间已被其他路径写入存储
    Stored(String),
    Fetched(String),
    Failed,
}

type SharedLookup = Shared<BoxFuture<'static, Resolution>>;

/// 查询统计
///
/// 计数器使用 `Relaxed` 内存序，只用于观测。
#[derive(Debug, Default)]
pub struct LookupStats {
    pub cache_hits: AtomicUsize,
    pub remote_hits: AtomicUsize,
    pub unresolved: AtomicUsize,
    /// 实际发出的远程请求数（含重试）
    pub remote_calls: AtomicUsize,
    pub remote_failures: AtomicUsize,
    /// 搭乘已有 in-flight 请求的调用数
    pub coalesced: AtomicUsize,
}

impl LookupStats {
    fn inc(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LookupStatsSnapshot {
        LookupStatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            remote_hits: self.remote_hits.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            remote_calls: self.remote_calls.load(Ordering::Relaxed),
            remote_failures: self.remote_failures.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

/// 统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupStatsSnapshot {
    pub cache_hits: usize,
    pub remote_hits: usize,
    pub unresolved: usize,
    pub remote_calls: usize,
    pub remote_failures: usize,
    pub coalesced: usize,
}

impl LookupStatsSnapshot {
    pub fn total(&self) -> usize {
        self.cache_hits + self.remote_hits + self.unresolved
    }
}

struct Inner {
    store: Arc<DictionaryStore>,
    remote: Option<Arc<dyn RemoteTranslator>>,
    config: LookupConfig,
    limiter: RateLimiter,
    in_flight: DashMap<String, SharedLookup>,
    stats: LookupStats,
}

/// 单词查询服务
///
/// 克隆开销很小，所有克隆共享同一个 in-flight 表、限速器和统计。
#[derive(Clone)]
pub struct LookupService {
    inner: Arc<Inner>,
}

impl LookupService {
    /// 创建查询服务
    ///
    /// `config.remote_enabled` 为 false 或未提供远程服务时，未命中的单词直接返回原词。
    pub fn new(
        store: Arc<DictionaryStore>,
        remote: Option<Arc<dyn RemoteTranslator>>,
        config: LookupConfig,
    ) -> Self {
        let remote = remote.filter(|_| config.remote_enabled);
        let limiter = RateLimiter::new(config.min_request_spacing());

        tracing::debug!(
            "查询服务已创建: 远程 {}, 超时 {:?}, 重试 {} 次",
            remote.as_ref().map(|r| r.name()).unwrap_or("disabled"),
            config.timeout(),
            config.max_retries
        );

        Self {
            inner: Arc::new(Inner {
                store,
                remote,
                config,
                limiter,
                in_flight: DashMap::new(),
                stats: LookupStats::default(),
            }),
        }
    }

    /// 按配置中的远程服务列表创建
    pub fn from_config(store: Arc<DictionaryStore>, config: LookupConfig) -> RemoteResult<Self> {
        let remote: Option<Arc<dyn RemoteTranslator>> = if config.remote_enabled {
            Some(Arc::new(FallbackChain::from_config(&config)?))
        } else {
            None
        };
        Ok(Self::new(store, remote, config))
    }

    pub fn store(&self) -> &Arc<DictionaryStore> {
        &self.inner.store
    }

    pub fn config(&self) -> &LookupConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> &LookupStats {
        &self.inner.stats
    }

    pub fn remote_enabled(&self) -> bool {
        self.inner.remote.is_some()
    }

    /// 查询单个词
    pub async fn translate(&self, word: &str) -> LookupResult {
        let stats = &self.inner.stats;

        let Some(key) = normalize_word(word) else {
            LookupStats::inc(&stats.unresolved);
            return LookupResult::unresolved(word);
        };

        match self.inner.store.get(&key) {
            Ok(Some(entry)) => {
                LookupStats::inc(&stats.cache_hits);
                tracing::trace!("缓存命中 '{}' -> '{}'", key, entry.translation);
                return LookupResult {
                    text: entry.translation,
                    origin: Origin::Cache,
                };
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("查询存储失败 '{}': {}", key, e),
        }

        if self.inner.remote.is_none() {
            LookupStats::inc(&stats.unresolved);
            return LookupResult::unresolved(word);
        }

        match self.coalesced(key).await {
            Resolution::Stored(text) => {
                LookupStats::inc(&stats.cache_hits);
                LookupResult {
                    text,
                    origin: Origin::Cache,
                }
            }
            Resolution::Fetched(text) => {
                LookupStats::inc(&stats.remote_hits);
                LookupResult {
                    text,
                    origin: Origin::Remote,
                }
            }
            Resolution::Failed => {
                LookupStats::inc(&stats.unresolved);
                LookupResult::unresolved(word)
            }
        }
    }

    /// 并发查询多个词，结果与输入顺序一致
    pub async fn translate_many<S: AsRef<str>>(&self, words: &[S]) -> Vec<LookupResult> {
        join_all(words.iter().map(|w| self.translate(w.as_ref()))).await
    }

    /// 跳过存储直接在线查询，成功后按标签感知模式写回
    ///
    /// 管理命令使用，不参与请求合并。
    pub async fn translate_online(&self, word: &str) -> LookupResult {
        let Some(key) = normalize_word(word) else {
            return LookupResult::unresolved(word);
        };

        match self.inner.fetch_remote(&key).await {
            Resolution::Fetched(text) | Resolution::Stored(text) => {
                LookupStats::inc(&self.inner.stats.remote_hits);
                LookupResult {
                    text,
                    origin: Origin::Remote,
                }
            }
            Resolution::Failed => {
                LookupStats::inc(&self.inner.stats.unresolved);
                LookupResult::unresolved(word)
            }
        }
    }

    /// 当前 in-flight 的单词数
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    async fn coalesced(&self, key: String) -> Resolution {
        let future = match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                LookupStats::inc(&self.inner.stats.coalesced);
                tracing::debug!("合并到已有请求 '{}'", key);
                occupied.get().clone()
            }
            Entry::Vacant(vacant) => {
                let inner = Arc::clone(&self.inner);
                let word = key.clone();
                let future = async move { inner.resolve(&word).await }.boxed().shared();
                vacant.insert(future.clone());
                future
            }
        };

        let resolution = future.clone().await;

        self.inner
            .in_flight
            .remove_if(&key, |_, current| Shared::ptr_eq(current, &future));

        resolution
    }
}

impl Inner {
    /// 共享 future 的主体：再次检查存储后走远程
    async fn resolve(&self, key: &str) -> Resolution {
        match self.store.get(key) {
            Ok(Some(entry)) => return Resolution::Stored(entry.translation),
            Ok(None) => {}
            Err(e) => tracing::warn!("复查存储失败 '{}': {}", key, e),
        }

        self.fetch_remote(key).await
    }

    async fn fetch_remote(&self, key: &str) -> Resolution {
        let Some(remote) = &self.remote else {
            return Resolution::Failed;
        };

        let attempts = self.config.max_retries.saturating_add(1);
        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.config.backoff(attempt - 1);
                tracing::debug!("第 {} 次重试 '{}'，等待 {:?}", attempt, key, delay);
                tokio::time::sleep(delay).await;
            }

            self.limiter.acquire().await;
            LookupStats::inc(&self.stats.remote_calls);

            let outcome = tokio::time::timeout(
                remote.call_budget(self.config.timeout()),
                remote.lookup(key, &self.config.source_lang, &self.config.target_lang),
            )
            .await
            .map_err(RemoteError::from)
            .and_then(|result| result)
            .and_then(|text| {
                normalize_translation(&text)
                    .ok_or_else(|| RemoteError::Malformed(format!("'{}' 的译文为空", key)))
            });

            match outcome {
                Ok(translation) => {
                    self.write_through(key, &translation);
                    return Resolution::Fetched(translation);
                }
                Err(e) => {
                    LookupStats::inc(&self.stats.remote_failures);
                    log_remote_failure(key, &e);
                    if !e.is_retryable() {
                        break;
                    }
                }
            }
        }

        Resolution::Failed
    }

    fn write_through(&self, key: &str, translation: &str) {
        let entry = DictionaryEntry::new(key.to_string(), translation.to_string(), Tag::Unverified);
        match self.store.upsert_with(entry, UpsertMode::TagAware) {
            Ok(_) => tracing::debug!("远程结果已写回 '{}' -> '{}'", key, translation),
            Err(e) => tracing::warn!("写回 '{}' 失败: {}", key, e),
        }
    }
}
