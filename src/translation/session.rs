//! 渐进式翻译会话
//!
//! 一次会话把一段原文切分成句子，先给每个单词放上占位符，再按阅读顺序逐词查询，
//! 每确定一个词就向消费方推送一次增量更新。
//!
//! ## 状态
//!
//! `Idle → Segmenting → Placeholdering → Translating → {Done | Cancelled}`
//!
//! ## 顺序与前瞻
//!
//! `max_in_flight` 大于 1 时最多提前发出 N 个查询，但结果严格按阅读顺序应用和推送。
//! 每个查询在独立任务中执行，会话取消时已发出的查询会继续完成（远程结果照常写回），
//! 只是结果被丢弃。
//!
//! ## 取消
//!
//! 调用 `SessionHandle::cancel()` 或丢弃事件接收端都会取消会话。
//! 每次发出查询前、每次应用结果前都会检查取消标志。

use std::collections::VecDeque;
use std::future::Future;

use futures::stream::{FuturesOrdered, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::translation::lookup::{LookupResult, LookupService, Origin};
use crate::translation::segmenter::{segment, SentenceUnit, TokenKind};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Segmenting,
    Placeholdering,
    Translating,
    Done,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Cancelled)
    }
}

/// 词元翻译状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenStatus {
    Pending,
    Resolved,
    /// 查不到译文，显示原词
    Fallback,
}

/// 与词元一一对应的显示内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTranslation {
    pub text: String,
    pub status: TokenStatus,
}

/// 句子与其逐词译文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationUnit {
    pub sentence: SentenceUnit,
    pub translations: Vec<TokenTranslation>,
}

impl TranslationUnit {
    fn with_placeholders(sentence: SentenceUnit, placeholder: &str) -> Self {
        let translations = sentence
            .tokens()
            .iter()
            .map(|token| match token.kind {
                TokenKind::Word => TokenTranslation {
                    text: placeholder.to_string(),
                    status: TokenStatus::Pending,
                },
                TokenKind::Punct => TokenTranslation {
                    text: token.text.clone(),
                    status: TokenStatus::Resolved,
                },
            })
            .collect();

        Self {
            sentence,
            translations,
        }
    }

    /// 当前显示内容，词元之间以单个空格分隔
    pub fn render(&self) -> String {
        self.translations
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// 推送给消费方的事件
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// 占位阶段的完整快照
    Placeholders(Vec<TranslationUnit>),
    /// 单个单词确定
    TokenResolved {
        sentence: usize,
        token: usize,
        text: String,
        status: TokenStatus,
        origin: Origin,
    },
    /// 会话结束
    Finished(SessionState),
}

/// 会话结束时的汇总
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub state: SessionState,
    pub resolved: usize,
    pub fallback: usize,
    pub pending: usize,
    /// 每个句子的最终显示内容
    pub lines: Vec<String>,
}

impl SessionReport {
    fn from_units(state: SessionState, units: &[TranslationUnit]) -> Self {
        let mut report = Self {
            state,
            resolved: 0,
            fallback: 0,
            pending: 0,
            lines: units.iter().map(TranslationUnit::render).collect(),
        };

        for unit in units {
            for (token, translation) in unit.sentence.tokens().iter().zip(&unit.translations) {
                if !token.is_word() {
                    continue;
                }
                match translation.status {
                    TokenStatus::Resolved => report.resolved += 1,
                    TokenStatus::Fallback => report.fallback += 1,
                    TokenStatus::Pending => report.pending += 1,
                }
            }
        }

        report
    }
}

/// 会话句柄
pub struct SessionHandle {
    cancel: watch::Sender<bool>,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<SessionReport>,
}

impl SessionHandle {
    /// 请求取消，已经结束的会话不受影响
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// 等待会话结束
    pub async fn join(self) -> SessionReport {
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("翻译会话任务异常退出: {}", e);
                SessionReport {
                    state: SessionState::Cancelled,
                    resolved: 0,
                    fallback: 0,
                    pending: 0,
                    lines: Vec::new(),
                }
            }
        }
    }
}

/// 渐进式翻译器
#[derive(Clone)]
pub struct ProgressiveTranslator {
    lookup: LookupService,
    config: SessionConfig,
}

impl ProgressiveTranslator {
    pub fn new(lookup: LookupService, config: SessionConfig) -> Self {
        Self { lookup, config }
    }

    pub fn lookup(&self) -> &LookupService {
        &self.lookup
    }

    /// 启动会话，必须在 tokio 运行时内调用
    pub fn start(
        &self,
        raw_text: impl Into<String>,
    ) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
        let (events, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        let session = Session {
            lookup: self.lookup.clone(),
            config: self.config.clone(),
            events,
            cancel: cancel_rx,
            state: state_tx,
        };
        let task = tokio::spawn(session.run(raw_text.into()));

        let handle = SessionHandle {
            cancel: cancel_tx,
            state: state_rx,
            task,
        };
        (handle, receiver)
    }

    /// 运行到结束并直接返回汇总，不关心中间事件
    pub async fn translate_text(&self, raw_text: impl Into<String>) -> SessionReport {
        let (handle, mut receiver) = self.start(raw_text);
        let drain = tokio::spawn(async move { while receiver.recv().await.is_some() {} });
        let report = handle.join().await;
        let _ = drain.await;
        report
    }
}

/// 单词在文本中的位置
struct WordSlot {
    sentence: usize,
    token: usize,
    word: String,
}

struct Session {
    lookup: LookupService,
    config: SessionConfig,
    events: mpsc::Sender<SessionEvent>,
    cancel: watch::Receiver<bool>,
    state: watch::Sender<SessionState>,
}

impl Session {
    async fn run(mut self, raw_text: String) -> SessionReport {
        self.set_state(SessionState::Segmenting);
        let sentences = segment(&raw_text);

        self.set_state(SessionState::Placeholdering);
        let mut units: Vec<TranslationUnit> = sentences
            .into_iter()
            .map(|s| TranslationUnit::with_placeholders(s, &self.config.placeholder))
            .collect();

        let mut slots: VecDeque<WordSlot> = VecDeque::new();
        for (sentence, unit) in units.iter().enumerate() {
            for (token, span) in unit.sentence.tokens().iter().enumerate() {
                if span.is_word() {
                    slots.push_back(WordSlot {
                        sentence,
                        token,
                        word: span.text.clone(),
                    });
                }
            }
        }

        tracing::debug!("会话开始: {} 个句子, {} 个单词", units.len(), slots.len());

        if !self.emit(SessionEvent::Placeholders(units.clone())).await {
            return self.finish(SessionState::Cancelled, &units).await;
        }

        self.set_state(SessionState::Translating);
        let state = self.translate_all(&mut units, slots).await;
        self.finish(state, &units).await
    }

    async fn translate_all(
        &mut self,
        units: &mut [TranslationUnit],
        mut slots: VecDeque<WordSlot>,
    ) -> SessionState {
        let max_in_flight = self.config.max_in_flight.max(1);
        let interval = self.config.min_interval();
        let mut in_flight: FuturesOrdered<JoinHandle<LookupResult>> = FuturesOrdered::new();
        let mut pending: VecDeque<WordSlot> = VecDeque::new();

        loop {
            while in_flight.len() < max_in_flight {
                if self.is_cancelled() {
                    return SessionState::Cancelled;
                }
                let Some(slot) = slots.pop_front() else {
                    break;
                };

                let lookup = self.lookup.clone();
                let word = slot.word.clone();
                tracing::trace!("发出查询 '{}' ({}:{})", word, slot.sentence, slot.token);
                in_flight.push_back(tokio::spawn(async move { lookup.translate(&word).await }));
                pending.push_back(slot);
            }

            let Some(slot) = pending.pop_front() else {
                return SessionState::Done;
            };

            let joined = {
                let next = in_flight.next();
                match self.until_cancelled(next).await {
                    Some(joined) => joined,
                    None => return SessionState::Cancelled,
                }
            };

            if self.is_cancelled() {
                return SessionState::Cancelled;
            }

            let result = match joined {
                Some(Ok(result)) => result,
                Some(Err(e)) => {
                    tracing::warn!("查询任务异常 '{}': {}", slot.word, e);
                    LookupResult {
                        text: slot.word.clone(),
                        origin: Origin::Unresolved,
                    }
                }
                None => return SessionState::Done,
            };

            let event = self.apply(units, &slot, result);
            if !self.emit(event).await {
                return SessionState::Cancelled;
            }

            if !interval.is_zero() && !(slots.is_empty() && pending.is_empty()) {
                if self.until_cancelled(tokio::time::sleep(interval)).await.is_none() {
                    return SessionState::Cancelled;
                }
            }
        }
    }

    fn apply(
        &self,
        units: &mut [TranslationUnit],
        slot: &WordSlot,
        result: LookupResult,
    ) -> SessionEvent {
        let (text, status) = match result.origin {
            Origin::Cache | Origin::Remote => {
                let text = if self.config.preserve_case {
                    match_capitalization(&slot.word, &result.text)
                } else {
                    result.text
                };
                (text, TokenStatus::Resolved)
            }
            Origin::Unresolved => (slot.word.clone(), TokenStatus::Fallback),
        };

        let translation = &mut units[slot.sentence].translations[slot.token];
        translation.text = text.clone();
        translation.status = status;

        tracing::debug!("'{}' -> '{}' ({})", slot.word, text, result.origin);

        SessionEvent::TokenResolved {
            sentence: slot.sentence,
            token: slot.token,
            text,
            status,
            origin: result.origin,
        }
    }

    async fn finish(&mut self, state: SessionState, units: &[TranslationUnit]) -> SessionReport {
        self.set_state(state);
        if state == SessionState::Done {
            self.emit(SessionEvent::Finished(state)).await;
        } else {
            let _ = self.events.try_send(SessionEvent::Finished(state));
        }

        let report = SessionReport::from_units(state, units);
        tracing::info!(
            "翻译会话结束 ({:?}): 已译 {}, 保留原词 {}, 未完成 {}",
            state,
            report.resolved,
            report.fallback,
            report.pending
        );
        report
    }

    /// 推送事件，接收端已关闭或会话被取消时返回 false
    async fn emit(&mut self, event: SessionEvent) -> bool {
        let events = self.events.clone();
        match self.until_cancelled(events.send(event)).await {
            Some(Ok(())) => true,
            Some(Err(_)) => {
                tracing::debug!("事件接收端已关闭，取消会话");
                false
            }
            None => false,
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow() || self.events.is_closed()
    }

    /// 等待 `fut` 完成；期间被取消或接收端关闭则返回 `None`
    async fn until_cancelled<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        if self.is_cancelled() {
            return None;
        }

        let events = self.events.clone();
        let cancel = &mut self.cancel;

        tokio::select! {
            biased;
            _ = wait_for_cancel(cancel) => None,
            _ = events.closed() => None,
            output = fut => Some(output),
        }
    }

    fn set_state(&self, state: SessionState) {
        let _ = self.state.send(state);
    }
}

async fn wait_for_cancel(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            // 句柄已丢弃，之后不会再有取消请求
            std::future::pending::<()>().await;
        }
    }
}

/// 原词首字母大写时，译文首字母也大写
fn match_capitalization(source: &str, translation: &str) -> String {
    let source_capitalized = source.chars().next().is_some_and(char::is_uppercase);
    if !source_capitalized {
        return translation.to_string();
    }

    let mut chars = translation.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
