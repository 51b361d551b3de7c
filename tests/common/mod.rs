// 集成测试公共模块
//
// 临时存储、快速查询配置和可计数的假远程服务

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use lexistream::config::{LookupConfig, SessionConfig};
use lexistream::dictionary::{DictionaryEntry, DictionaryStore, Tag};
use lexistream::error::{RemoteError, RemoteResult};
use lexistream::translation::{LookupService, ProgressiveTranslator, RemoteTranslator};

/// 临时目录中的存储，目录随返回值一起释放
pub struct TestStore {
    pub dir: TempDir,
    pub store: Arc<DictionaryStore>,
}

impl TestStore {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let store = Arc::new(
            DictionaryStore::open(dir.path().join("dictionary.redb")).expect("打开测试存储"),
        );
        Self { dir, store }
    }

    /// 预置词条，标签为 common
    pub fn with_words(pairs: &[(&str, &str)]) -> Self {
        let test_store = Self::new();
        let entries = pairs
            .iter()
            .map(|(w, t)| DictionaryEntry::new(w.to_string(), t.to_string(), Tag::Common))
            .collect();
        test_store
            .store
            .upsert_batch(entries, lexistream::dictionary::UpsertMode::LastWriteWins)
            .expect("预置词条");
        test_store
    }

    pub fn store(&self) -> Arc<DictionaryStore> {
        Arc::clone(&self.store)
    }
}

/// 不等待的查询配置：短超时、极小退避、不限速
pub fn fast_lookup_config() -> LookupConfig {
    LookupConfig {
        remote_enabled: true,
        timeout_ms: 1_000,
        max_retries: 2,
        backoff_base_ms: 1,
        backoff_max_ms: 5,
        max_requests_per_second: 10_000.0,
        ..LookupConfig::default()
    }
}

pub fn offline_lookup_config() -> LookupConfig {
    LookupConfig {
        remote_enabled: false,
        ..fast_lookup_config()
    }
}

pub fn fast_session_config() -> SessionConfig {
    SessionConfig {
        min_interval_ms: 0,
        max_in_flight: 1,
        ..SessionConfig::default()
    }
}

/// 假远程服务的行为
#[derive(Debug, Clone)]
pub enum RemoteBehavior {
    /// 查表，表中没有的词返回 `<word>_en`
    Answer,
    /// 每次都返回同一个错误
    Fail(RemoteError),
    /// 前 n 次失败，之后正常回答
    FailTimes(usize, RemoteError),
}

/// 记录调用次数的假远程服务
pub struct CountingTranslator {
    calls: AtomicUsize,
    delay: Duration,
    word_delays: HashMap<String, Duration>,
    behavior: RemoteBehavior,
    answers: HashMap<String, String>,
}

impl CountingTranslator {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            word_delays: HashMap::new(),
            behavior: RemoteBehavior::Answer,
            answers: HashMap::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 单独指定某些词的延迟（毫秒），其余词使用 `with_delay`
    pub fn with_word_delays(mut self, delays: &[(&str, u64)]) -> Self {
        self.word_delays = delays
            .iter()
            .map(|(w, ms)| (w.to_string(), Duration::from_millis(*ms)))
            .collect();
        self
    }

    pub fn with_behavior(mut self, behavior: RemoteBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_answers(mut self, pairs: &[(&str, &str)]) -> Self {
        self.answers = pairs
            .iter()
            .map(|(w, t)| (w.to_string(), t.to_string()))
            .collect();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self, word: &str) -> String {
        self.answers
            .get(word)
            .cloned()
            .unwrap_or_else(|| format!("{}_en", word))
    }
}

#[async_trait]
impl RemoteTranslator for CountingTranslator {
    fn name(&self) -> &str {
        "counting"
    }

    async fn lookup(&self, word: &str, _source: &str, _target: &str) -> RemoteResult<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.word_delays.get(word).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            RemoteBehavior::Answer => Ok(self.answer(word)),
            RemoteBehavior::Fail(error) => Err(error.clone()),
            RemoteBehavior::FailTimes(n, error) if call < *n => Err(error.clone()),
            RemoteBehavior::FailTimes(..) => Ok(self.answer(word)),
        }
    }
}

/// 组装查询服务，同时返回假远程服务以便检查调用次数
pub fn lookup_with_remote(
    store: Arc<DictionaryStore>,
    remote: CountingTranslator,
    config: LookupConfig,
) -> (LookupService, Arc<CountingTranslator>) {
    let remote = Arc::new(remote);
    let shared: Arc<dyn RemoteTranslator> = remote.clone();
    (LookupService::new(store, Some(shared), config), remote)
}

pub fn translator_with_remote(
    store: Arc<DictionaryStore>,
    remote: CountingTranslator,
    session: SessionConfig,
) -> (ProgressiveTranslator, Arc<CountingTranslator>) {
    let (lookup, remote) = lookup_with_remote(store, remote, fast_lookup_config());
    (ProgressiveTranslator::new(lookup, session), remote)
}
