//! 规范词典存储
//!
//! 基于 redb 的单文件存储，键为规范化单词。读写走 redb 事务，单条操作要么全部生效要么不生效；
//! 整库替换先写入暂存文件，再在句柄写锁内原子改名替换，读取方只会看到旧版本或新版本。
//! 前面挂一层 LRU 热缓存，写入时按键失效，发布新版本时整体清空。
//! 每次失效都推进缓存纪元，读取结束时纪元已变化则不回填，避免旧条目在写入之后回到缓存。

use std::fs;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};

use chrono::{SecondsFormat, Utc};
use lru::LruCache;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use crate::config::StoreConfig;
use crate::dictionary::normalize::{normalize_translation, normalize_word};
use crate::dictionary::types::{DictionaryEntry, SourceSummary, StoreStats, Tag};
use crate::error::{helpers, DictionaryError, DictionaryResult};

const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");
const SOURCES: TableDefinition<&str, &[u8]> = TableDefinition::new("sources");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const GENERATION_KEY: &str = "generation";

/// 写入模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpsertMode {
    /// 同一单词后写覆盖先写
    #[default]
    LastWriteWins,
    /// 已有条目标签更高时保留已有条目
    TagAware,
}

/// 规范词典存储句柄
///
/// 以 `Arc<DictionaryStore>` 显式传给构建器和查询服务，
/// 并发协调完全由存储自身的读写纪律负责。
pub struct DictionaryStore {
    path: PathBuf,
    db: RwLock<Option<Arc<Database>>>,
    hot: Mutex<LruCache<String, DictionaryEntry>>,
    /// 热缓存纪元，只在持有 `hot` 锁时推进
    epoch: AtomicU64,
    /// 串行化整库发布
    publish_lock: Mutex<()>,
}

impl DictionaryStore {
    /// 按默认配置打开（不存在则创建）
    pub fn open(path: impl AsRef<Path>) -> DictionaryResult<Self> {
        Self::open_with(&StoreConfig {
            path: path.as_ref().to_path_buf(),
            ..StoreConfig::default()
        })
    }

    /// 按配置打开
    pub fn open_with(config: &StoreConfig) -> DictionaryResult<Self> {
        let db = open_database(&config.path)?;
        let capacity = NonZeroUsize::new(config.hot_cache_size).unwrap_or(NonZeroUsize::MIN);

        tracing::info!("词典存储已打开: {}", config.path.display());

        Ok(Self {
            path: config.path.clone(),
            db: RwLock::new(Some(Arc::new(db))),
            hot: Mutex::new(LruCache::new(capacity)),
            epoch: AtomicU64::new(0),
            publish_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 重新打开底层文件
    ///
    /// 失败后存储保持不可用，所有操作返回 `StoreUnavailable`，直到下一次成功的重新打开。
    pub fn reopen(&self) -> DictionaryResult<()> {
        let mut slot = self.db.write().map_err(|_| poisoned())?;

        // 先释放旧句柄，redb 不允许同一进程重复打开同一文件
        slot.take();
        self.clear_hot();

        match open_database(&self.path) {
            Ok(db) => {
                *slot = Some(Arc::new(db));
                tracing::info!("词典存储已重新打开: {}", self.path.display());
                Ok(())
            }
            Err(e) => helpers::log_error(e),
        }
    }

    pub fn is_available(&self) -> bool {
        self.db.read().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// 查询单词，输入按构建器规则规范化
    pub fn get(&self, word: &str) -> DictionaryResult<Option<DictionaryEntry>> {
        let Some(key) = normalize_word(word) else {
            return Ok(None);
        };

        if let Some(entry) = self.hot_get(&key) {
            return Ok(Some(entry));
        }

        let observed = self.epoch.load(Ordering::Acquire);
        let db = self.handle()?;
        let txn = db.begin_read()?;
        let table = txn.open_table(ENTRIES)?;
        let entry = match table.get(key.as_str())? {
            Some(guard) => Some(serde_json::from_slice::<DictionaryEntry>(guard.value())?),
            None => None,
        };

        if let Some(entry) = &entry {
            self.hot_put(entry.clone(), observed);
        }

        Ok(entry)
    }

    /// 后写覆盖的写入
    pub fn upsert(&self, entry: DictionaryEntry) -> DictionaryResult<bool> {
        self.upsert_with(entry, UpsertMode::LastWriteWins)
    }

    /// 按指定模式写入单条记录，返回是否实际写入
    ///
    /// 写事务期间持有句柄读锁，发布会等待进行中的写入提交后再替换文件。
    pub fn upsert_with(&self, entry: DictionaryEntry, mode: UpsertMode) -> DictionaryResult<bool> {
        let entry = normalize_entry(entry)?;

        let written = {
            let slot = self.read_slot()?;
            let db = self.live(&slot)?;
            let txn = db.begin_write()?;
            let written = {
                let mut table = txn.open_table(ENTRIES)?;
                write_entry(&mut table, &entry, mode)?
            };
            txn.commit()?;
            written
        };

        self.hot_invalidate(&entry.normalized_word);
        if written {
            tracing::debug!(
                "写入词条 '{}' -> '{}' ({})",
                entry.normalized_word,
                entry.translation,
                entry.tag
            );
        } else {
            tracing::debug!("保留更高标签的已有词条 '{}'", entry.normalized_word);
        }

        Ok(written)
    }

    /// 批量写入，单个事务内完成，返回实际写入条数
    pub fn upsert_batch(
        &self,
        entries: Vec<DictionaryEntry>,
        mode: UpsertMode,
    ) -> DictionaryResult<usize> {
        let entries = entries
            .into_iter()
            .map(normalize_entry)
            .collect::<DictionaryResult<Vec<_>>>()?;

        let mut written = 0;
        {
            let slot = self.read_slot()?;
            let db = self.live(&slot)?;
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(ENTRIES)?;
                for entry in &entries {
                    if write_entry(&mut table, entry, mode)? {
                        written += 1;
                    }
                }
            }
            txn.commit()?;
        }

        for entry in &entries {
            self.hot_invalidate(&entry.normalized_word);
        }
        tracing::info!("批量写入 {} / {} 条词条", written, entries.len());

        Ok(written)
    }

    /// 按规范化单词排序导出全部条目
    pub fn export_all(&self) -> DictionaryResult<Vec<DictionaryEntry>> {
        let db = self.handle()?;
        let txn = db.begin_read()?;
        let table = txn.open_table(ENTRIES)?;

        let mut entries = Vec::with_capacity(table.len()? as usize);
        for item in table.iter()? {
            let (_, value) = item?;
            entries.push(serde_json::from_slice::<DictionaryEntry>(value.value())?);
        }

        Ok(entries)
    }

    /// 以制表符分隔格式写出全部条目，返回条目数
    pub fn export_to_writer<W: Write>(&self, writer: &mut W) -> DictionaryResult<usize> {
        let entries = self.export_all()?;

        writeln!(writer, "# lexistream canonical dictionary")?;
        writeln!(writer, "# Format: word<tab>translation<tab>tag<tab>timestamp")?;
        writeln!(
            writer,
            "# Created: {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        )?;
        writeln!(writer, "# Words: {}", entries.len())?;

        for entry in &entries {
            writeln!(writer, "{}", entry.to_export_line())?;
        }
        writer.flush()?;

        tracing::info!("已导出 {} 条词条", entries.len());
        Ok(entries.len())
    }

    pub fn len(&self) -> DictionaryResult<usize> {
        let db = self.handle()?;
        let txn = db.begin_read()?;
        let table = txn.open_table(ENTRIES)?;
        Ok(table.len()? as usize)
    }

    pub fn is_empty(&self) -> DictionaryResult<bool> {
        Ok(self.len()? == 0)
    }

    /// 当前已发布的版本号，每次构建发布加一
    pub fn generation(&self) -> DictionaryResult<u64> {
        let db = self.handle()?;
        let txn = db.begin_read()?;
        let meta = txn.open_table(META)?;
        Ok(meta.get(GENERATION_KEY)?.map(|g| g.value()).unwrap_or(0))
    }

    /// 存储统计
    pub fn stats(&self) -> DictionaryResult<StoreStats> {
        let db = self.handle()?;
        let txn = db.begin_read()?;

        let mut stats = StoreStats::default();

        let entries = txn.open_table(ENTRIES)?;
        for item in entries.iter()? {
            let (_, value) = item?;
            let entry: DictionaryEntry = serde_json::from_slice(value.value())?;
            stats.entries += 1;
            match entry.tag {
                Tag::Common => stats.common += 1,
                Tag::Rare => stats.rare += 1,
                Tag::Unverified => stats.unverified += 1,
            }
        }

        let sources = txn.open_table(SOURCES)?;
        for item in sources.iter()? {
            let (_, value) = item?;
            stats.sources.push(serde_json::from_slice(value.value())?);
        }

        let meta = txn.open_table(META)?;
        stats.generation = meta.get(GENERATION_KEY)?.map(|g| g.value()).unwrap_or(0);

        Ok(stats)
    }

    /// 用新一代数据整体替换存储
    ///
    /// 数据先完整写入并提交到暂存文件；暂存失败时删除暂存文件，当前存储不受影响。
    /// 之后在句柄写锁内改名替换并重新打开，返回新的版本号。
    ///
    /// 并发发布按顺序执行，版本号严格递增。写入在替换前提交到旧文件的，
    /// 随旧版本一起被新一代取代；替换之后的写入落在新文件上。
    pub(crate) fn publish(
        &self,
        entries: &[DictionaryEntry],
        sources: &[SourceSummary],
    ) -> DictionaryResult<u64> {
        let _publishing = self.publish_lock.lock().map_err(|_| poisoned())?;

        let generation = self.generation()? + 1;
        let staging = self.staging_path();

        if staging.exists() {
            if let Err(e) = fs::remove_file(&staging) {
                return helpers::log_error(e.into());
            }
        }

        if let Err(e) = write_generation(&staging, entries, sources, generation) {
            let _ = fs::remove_file(&staging);
            tracing::warn!("暂存第 {} 代词典失败，保留当前版本", generation);
            return helpers::log_error(e);
        }

        let mut slot = self.db.write().map_err(|_| poisoned())?;

        let previous = slot.take();
        drop(previous);

        if let Err(e) = fs::rename(&staging, &self.path) {
            let _ = fs::remove_file(&staging);
            // 改名失败时旧文件仍完整，重新打开它
            *slot = open_database(&self.path).ok().map(Arc::new);
            let error = DictionaryError::Io(format!("替换词典文件失败: {}", e));
            return helpers::log_error(error);
        }

        match open_database(&self.path) {
            Ok(db) => *slot = Some(Arc::new(db)),
            Err(e) => return helpers::log_error(e),
        }
        drop(slot);

        self.clear_hot();
        tracing::info!(
            "已发布第 {} 代词典: {} 条词条, {} 个来源",
            generation,
            entries.len(),
            sources.len()
        );

        Ok(generation)
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "dictionary.redb".into());
        name.push(".staging");
        self.path.with_file_name(name)
    }

    fn read_slot(&self) -> DictionaryResult<RwLockReadGuard<'_, Option<Arc<Database>>>> {
        self.db.read().map_err(|_| poisoned())
    }

    fn live<'a>(&self, slot: &'a Option<Arc<Database>>) -> DictionaryResult<&'a Database> {
        slot.as_deref().ok_or_else(|| self.unavailable())
    }

    fn handle(&self) -> DictionaryResult<Arc<Database>> {
        let slot = self.read_slot()?;
        slot.clone().ok_or_else(|| self.unavailable())
    }

    fn unavailable(&self) -> DictionaryError {
        DictionaryError::StoreUnavailable(format!("{} 需要重新打开", self.path.display()))
    }

    fn hot_get(&self, key: &str) -> Option<DictionaryEntry> {
        self.hot.lock().ok()?.get(key).cloned()
    }

    /// 回填热缓存，读取开始后发生过失效则放弃
    fn hot_put(&self, entry: DictionaryEntry, observed: u64) {
        if let Ok(mut hot) = self.hot.lock() {
            if self.epoch.load(Ordering::Acquire) == observed {
                hot.put(entry.normalized_word.clone(), entry);
            }
        }
    }

    fn hot_invalidate(&self, key: &str) {
        if let Ok(mut hot) = self.hot.lock() {
            self.epoch.fetch_add(1, Ordering::AcqRel);
            hot.pop(key);
        }
    }

    fn clear_hot(&self) {
        if let Ok(mut hot) = self.hot.lock() {
            self.epoch.fetch_add(1, Ordering::AcqRel);
            hot.clear();
        }
    }
}

fn poisoned() -> DictionaryError {
    DictionaryError::StoreUnavailable("存储句柄锁已损坏".to_string())
}

fn open_database(path: &Path) -> DictionaryResult<Database> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            DictionaryError::StoreUnavailable(format!("无法创建目录 {}: {}", parent.display(), e))
        })?;
    }

    let db = Database::create(path).map_err(|e| {
        DictionaryError::StoreUnavailable(format!("无法打开 {}: {}", path.display(), e))
    })?;

    // 保证三张表都存在，只读事务打开不存在的表会报错
    let txn = db.begin_write()?;
    {
        txn.open_table(ENTRIES)?;
        txn.open_table(SOURCES)?;
        txn.open_table(META)?;
    }
    txn.commit()?;

    Ok(db)
}

fn write_generation(
    path: &Path,
    entries: &[DictionaryEntry],
    sources: &[SourceSummary],
    generation: u64,
) -> DictionaryResult<()> {
    let db = open_database(path)?;
    let txn = db.begin_write()?;
    {
        let mut table = txn.open_table(ENTRIES)?;
        for entry in entries {
            let bytes = serde_json::to_vec(entry)?;
            table.insert(entry.normalized_word.as_str(), bytes.as_slice())?;
        }

        let mut source_table = txn.open_table(SOURCES)?;
        for (index, summary) in sources.iter().enumerate() {
            // 前缀序号保持来源顺序
            let key = format!("{:04}:{}", index, summary.name);
            let bytes = serde_json::to_vec(summary)?;
            source_table.insert(key.as_str(), bytes.as_slice())?;
        }

        let mut meta = txn.open_table(META)?;
        meta.insert(GENERATION_KEY, generation)?;
    }
    txn.commit()?;

    Ok(())
}

fn normalize_entry(entry: DictionaryEntry) -> DictionaryResult<DictionaryEntry> {
    let word = normalize_word(&entry.normalized_word).ok_or_else(|| {
        DictionaryError::MalformedSourceRecord("单词规范化后为空".to_string())
    })?;
    let translation = normalize_translation(&entry.translation).ok_or_else(|| {
        DictionaryError::MalformedSourceRecord(format!("'{}' 的译文规范化后为空", word))
    })?;

    Ok(DictionaryEntry {
        normalized_word: word,
        translation,
        ..entry
    })
}

fn write_entry(
    table: &mut redb::Table<'_, &'static str, &'static [u8]>,
    entry: &DictionaryEntry,
    mode: UpsertMode,
) -> DictionaryResult<bool> {
    if mode == UpsertMode::TagAware {
        let existing = table
            .get(entry.normalized_word.as_str())?
            .map(|guard| serde_json::from_slice::<DictionaryEntry>(guard.value()))
            .transpose()?;

        if let Some(existing) = existing {
            if existing.tag > entry.tag {
                return Ok(false);
            }
        }
    }

    let bytes = serde_json::to_vec(entry)?;
    table.insert(entry.normalized_word.as_str(), bytes.as_slice())?;
    Ok(true)
}
