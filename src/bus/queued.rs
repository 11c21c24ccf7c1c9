//! Отложенные события: пара FIFO с перестановкой после слива.
//!
//! Публикации во время идущего слива попадают во вторую очередь и ждут
//! следующего вызова `process_queued` — событие, отложенное обработчиком,
//! никогда не догоняет сливаемую очередь.

use std::{collections::VecDeque, sync::Arc, thread::ThreadId};

use crate::payload::Object;

/// Одна запись отложенной очереди.
pub(crate) struct QueuedEvent {
    pub event: String,
    pub payload: Arc<Object>,
    /// Отсутствие живой темы — ошибка `UnhandledEvent`.
    pub requires_handler: bool,
    /// Маркер исключения: слив прерывается ошибкой `Blackboard`.
    pub is_exception: bool,
}

/// Состояние отложенной доставки под одним мьютексом.
pub(crate) struct QueueState {
    /// Очередь, которую сливает текущий вызов `process_queued`.
    pub current: VecDeque<QueuedEvent>,
    /// Очередь для публикаций, пришедших во время слива.
    pub next: VecDeque<QueuedEvent>,
    /// Идёт слив (публикации направляются в `next`).
    pub processing: bool,
    /// Поток, владеющий сливом; `None` — очередь свободна.
    pub processor: Option<ThreadId>,
    /// Глубина реентерабельных вызовов `process_queued` потока-владельца.
    pub depth: u32,
}

impl QueueState {
    pub(crate) fn new() -> Self {
        Self {
            current: VecDeque::new(),
            next: VecDeque::new(),
            processing: false,
            processor: None,
            depth: 0,
        }
    }
}
