//! Тема: запись одного идентификатора события.
//!
//! Хранит упорядоченный список обработчиков и маркер идущей
//! диспетчеризации. Ровно один поток в каждый момент крутит цикл вызова по
//! теме; остальные отправители ждут на условной переменной. Сам цикл
//! никогда не держит мьютекс темы поперёк вызова обработчика, поэтому
//! обработчик может реентерабельно публиковать и снимать регистрацию.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    thread::{self, ThreadId},
};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use super::{blackboard::HandlerId, EventHandler};
use crate::{
    error::{BusError, BusResult},
    payload::Object,
};

/// Одна запись списка обработчиков.
pub(crate) struct HandlerEntry {
    pub id: HandlerId,
    pub once: bool,
    pub handler: EventHandler,
}

/// Изменяемое состояние темы под мьютексом.
pub(crate) struct TopicState {
    /// Порядок вставки — порядок вызова; стабилен при удалении соседей.
    pub handlers: Vec<HandlerEntry>,
    /// Инертная тема: новые диспетчеризации не начинаются.
    pub deleted: bool,
    /// Поток, ведущий диспетчеризацию; `None` — тема свободна.
    pub dispatching: Option<ThreadId>,
    /// Глубина реентерабельных публикаций владеющего потока.
    pub depth: u32,
    /// Идентификатор вызываемого прямо сейчас обработчика (0 — никакого).
    pub current_invoked: HandlerId,
    /// Обработчик снял сам себя; фактическое удаление отложено до шага
    /// после вызова, чтобы не ломать итерацию.
    pub removed_itself: bool,
}

/// Как продолжить итерацию после вызова обработчика.
enum PostStep {
    Advance,
    EraseAndAdvance { auto_removed: bool },
}

pub(crate) struct Topic {
    pub state: Mutex<TopicState>,
    pub idle: Condvar,
}

impl Topic {
    /// Создаёт тему с единственным обработчиком.
    pub(crate) fn with_handler(entry: HandlerEntry) -> Self {
        Self {
            state: Mutex::new(TopicState {
                handlers: vec![entry],
                deleted: false,
                dispatching: None,
                depth: 0,
                current_invoked: 0,
                removed_itself: false,
            }),
            idle: Condvar::new(),
        }
    }

    /// Захватывает право диспетчеризации и прогоняет цикл вызова.
    ///
    /// Реентерабельный вызов с потока-владельца проходит без ожидания;
    /// чужой поток ждёт, пока тема освободится. Освобождение и
    /// оповещение ожидающих выполняются в guard-е на любом пути выхода,
    /// включая ошибочный.
    pub(crate) fn dispatch(
        &self,
        event: &str,
        payload: &Object,
        last_auto_removed: &AtomicU64,
    ) -> BusResult<()> {
        self.claim();
        let _release = DispatchRelease { topic: self };
        self.run_loop(event, payload, last_auto_removed)
    }

    fn claim(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.dispatching == Some(me) {
            state.depth += 1;
        } else {
            while state.dispatching.is_some() {
                self.idle.wait(&mut state);
            }
            state.dispatching = Some(me);
            state.depth = 1;
        }
    }

    /// Цикл вызова по порядку вставки.
    fn run_loop(
        &self,
        event: &str,
        payload: &Object,
        last_auto_removed: &AtomicU64,
    ) -> BusResult<()> {
        let mut index = 0usize;

        loop {
            // Снимаем очередную запись под замком; сам вызов идёт без него.
            let (id, once, handler) = {
                let mut state = self.state.lock();
                if state.deleted || index >= state.handlers.len() {
                    state.current_invoked = 0;
                    return Ok(());
                }
                let entry = &state.handlers[index];
                let snapshot = (entry.id, entry.once, entry.handler.clone());
                state.current_invoked = snapshot.0;
                snapshot
            };

            trace!(event, handler = id, "invoking event handler");
            let verdict = handler(event, payload);

            let mut state = self.state.lock();
            match verdict {
                Ok(true) => {
                    index = Self::post_step(&mut state, id, once, index, last_auto_removed);
                }
                Ok(false) | Err(BusError::StopInvocation) => {
                    Self::post_step(&mut state, id, once, index, last_auto_removed);
                    state.current_invoked = 0;
                    return Ok(());
                }
                Err(error) => {
                    // Пользовательская ошибка: корректировка шага
                    // пропускается, ошибка уходит отправителю.
                    state.current_invoked = 0;
                    return Err(error);
                }
            }
        }
    }

    /// Вычисляет шаг итерации после вызова и применяет отложенные удаления.
    ///
    /// Возвращает индекс следующей записи. Запись могла исчезнуть во время
    /// вложенной диспетчеризации — тогда индекс остаётся как есть (на его
    /// место уже сдвинулся преемник).
    fn post_step(
        state: &mut TopicState,
        id: HandlerId,
        once: bool,
        index: usize,
        last_auto_removed: &AtomicU64,
    ) -> usize {
        let Some(position) = state.handlers.iter().position(|entry| entry.id == id) else {
            return index;
        };

        let step = if once {
            PostStep::EraseAndAdvance { auto_removed: true }
        } else if state.removed_itself {
            state.removed_itself = false;
            PostStep::EraseAndAdvance {
                auto_removed: false,
            }
        } else {
            PostStep::Advance
        };

        match step {
            PostStep::Advance => position + 1,
            PostStep::EraseAndAdvance { auto_removed } => {
                state.handlers.remove(position);
                if auto_removed {
                    last_auto_removed.store(id, Ordering::Relaxed);
                }
                position
            }
        }
    }
}

/// Освобождение темы на выходе из диспетчеризации.
///
/// Только самый внешний уровень снимает маркер и будит одного ожидающего;
/// вложенные публикации лишь уменьшают глубину.
struct DispatchRelease<'a> {
    topic: &'a Topic,
}

impl Drop for DispatchRelease<'_> {
    fn drop(&mut self) {
        let outermost = {
            let mut state = self.topic.state.lock();
            state.depth -= 1;
            if state.depth == 0 {
                state.dispatching = None;
                true
            } else {
                false
            }
        };
        if outermost {
            self.topic.idle.notify_one();
        }
    }
}
