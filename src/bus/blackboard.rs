//! Событийная доска: реестр обработчиков и обе дороги доставки.
//!
//! Доска владеет картой тем, парой FIFO отложенных событий и счётчиком
//! публикаций в полёте, который защищает физическое удаление тем. Запись и
//! снятие обработчиков разрешены только потоку-создателю; публиковать
//! может кто угодно.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::{self, ThreadId},
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use super::{
    queued::{QueueState, QueuedEvent},
    topic::{HandlerEntry, Topic},
    EventHandler,
};
use crate::{
    error::{BusError, BusResult},
    payload::Object,
};

/// Идентификатор зарегистрированного обработчика.
///
/// Уникален внутри одной доски среди одновременно живых записей. Значение
/// 0 зарезервировано: «такого обработчика нет / регистрация отклонена,
/// пока тема ждёт физического удаления».
pub type HandlerId = u64;

/// Вызывать ли обработчик только один раз.
///
/// `Yes` снимает обработчик со списка сразу после его ближайшего вызова.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOnce {
    No,
    Yes,
}

/// Событийная доска.
///
/// Синхронная публикация (`post`) вызывает обработчики темы по порядку
/// регистрации на потоке отправителя, сериализуясь с другими отправителями
/// той же темы. Отложенная публикация (`post_queued`) кладёт событие в
/// FIFO; единственный поток-потребитель сливает её через
/// [`process_queued`](Blackboard::process_queued).
pub struct Blackboard {
    /// Поток-создатель; только он управляет регистрациями.
    owner: ThreadId,
    topics: Mutex<HashMap<String, Arc<Topic>>>,
    queue: Mutex<QueueState>,
    queue_idle: Condvar,
    /// Публикации в полёте; физическое удаление темы возможно только при нуле.
    in_flight: Mutex<i64>,
    next_handler_id: AtomicU64,
    /// Последний автоматически снятый (одноразовый) обработчик.
    last_auto_removed: AtomicU64,
}

impl Blackboard {
    /// Создаёт доску; вызывающий поток становится её владельцем.
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
            topics: Mutex::new(HashMap::new()),
            queue: Mutex::new(QueueState::new()),
            queue_idle: Condvar::new(),
            in_flight: Mutex::new(0),
            next_handler_id: AtomicU64::new(1),
            last_auto_removed: AtomicU64::new(0),
        }
    }

    // ------------------------------------------------------------------
    //  Регистрация
    // ------------------------------------------------------------------

    /// Регистрирует обработчик события и возвращает его идентификатор.
    ///
    /// Если тема помечена удалённой и её ещё держат публикации в полёте,
    /// регистрация отклоняется и возвращается 0.
    pub fn register(&self, event_id: &str, handler: EventHandler, once: CallOnce) -> HandlerId {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "only the creating thread registers handlers"
        );

        let existing = self.topics.lock().get(event_id).cloned();
        let Some(topic) = existing else {
            return self.create_topic(event_id, handler, once);
        };

        let deleted = topic.state.lock().deleted;
        if deleted {
            if self.try_remove(event_id, &topic) {
                return self.create_topic(event_id, handler, once);
            }
            return 0;
        }

        let id = self.allocate_handler_id();
        topic.state.lock().handlers.push(HandlerEntry {
            id,
            once: once == CallOnce::Yes,
            handler,
        });
        debug!(event = event_id, handler = id, "event handler registered");
        id
    }

    /// Снимает обработчик с события.
    ///
    /// Снятие вызываемого прямо сейчас обработчика откладывается до шага
    /// после вызова, чтобы итерация цикла осталась корректной.
    pub fn unregister(&self, event_id: &str, handler_id: HandlerId) {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "only the creating thread unregisters handlers"
        );

        let existing = self.topics.lock().get(event_id).cloned();
        let Some(topic) = existing else {
            // Одноразовый обработчик уже снят вместе со своей темой.
            debug_assert_eq!(self.last_auto_removed.load(Ordering::Relaxed), handler_id);
            return;
        };

        let found = {
            let mut state = topic.state.lock();
            if state.deleted {
                drop(state);
                self.try_remove(event_id, &topic);
                return;
            }
            match state.handlers.iter().position(|e| e.id == handler_id) {
                Some(position) => {
                    if handler_id == state.current_invoked {
                        state.removed_itself = true;
                    } else {
                        state.handlers.remove(position);
                    }
                    true
                }
                None => false,
            }
        };

        if found {
            debug!(event = event_id, handler = handler_id, "event handler removed");
            self.check_topic_removal(event_id, &topic);
        }
    }

    /// Помечает тему удалённой и пытается убрать её физически.
    ///
    /// Все последующие публикации события остаются без обработчиков;
    /// повторная регистрация того же идентификатора создаёт свежую тему.
    pub fn clear(&self, event_id: &str) {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "only the creating thread clears handlers"
        );

        let existing = self.topics.lock().get(event_id).cloned();
        let Some(topic) = existing else { return };

        topic.state.lock().deleted = true;
        debug!(event = event_id, "event handlers cleared");
        self.try_remove(event_id, &topic);
    }

    // ------------------------------------------------------------------
    //  Синхронная публикация
    // ------------------------------------------------------------------

    /// Публикует событие; отсутствие обработчиков не считается ошибкой.
    pub fn post(&self, event_id: &str, payload: &Arc<Object>) -> BusResult<()> {
        self.post_internal(event_id, payload, false)
    }

    /// Публикует событие, требуя хотя бы одну живую тему.
    pub fn post_requiring_handler(&self, event_id: &str, payload: &Arc<Object>) -> BusResult<()> {
        self.post_internal(event_id, payload, true)
    }

    /// Безусловно возвращает доменную ошибку; темы не затрагиваются.
    pub fn post_exception(&self, event_id: &str, payload: &Arc<Object>) -> BusResult<()> {
        Err(BusError::Blackboard {
            event: event_id.to_owned(),
            payload: Arc::clone(payload),
        })
    }

    /// Возвращает сигнал остановки цикла вызова.
    ///
    /// Обработчик завершает цикл, вернув его как ошибку:
    /// `return blackboard.stop_invocation_loop();` — наружу сигнал не
    /// выходит, цикл диспетчеризации поглощает его.
    pub fn stop_invocation_loop(&self) -> BusResult<bool> {
        Err(BusError::StopInvocation)
    }

    fn post_internal(
        &self,
        event_id: &str,
        payload: &Arc<Object>,
        requires_handler: bool,
    ) -> BusResult<()> {
        let in_flight = InFlightGuard::enter(self);
        trace!(event = event_id, "posting event");

        let existing = self.topics.lock().get(event_id).cloned();
        let Some(topic) = existing else {
            if requires_handler {
                return Err(BusError::UnhandledEvent {
                    event: event_id.to_owned(),
                    payload: Arc::clone(payload),
                });
            }
            return Ok(());
        };

        if topic.state.lock().deleted {
            // Публикация уже не состоится: выходим из полёта до попытки
            // физического удаления, иначе она всегда будет проигрывать
            // собственному счётчику.
            drop(in_flight);
            let error = requires_handler.then(|| BusError::UnhandledEvent {
                event: event_id.to_owned(),
                payload: Arc::clone(payload),
            });
            self.try_remove(event_id, &topic);
            return match error {
                Some(error) => Err(error),
                None => Ok(()),
            };
        }

        self.dispatch_on(event_id, &topic, payload)
    }

    // ------------------------------------------------------------------
    //  Отложенная публикация
    // ------------------------------------------------------------------

    /// Откладывает событие до ближайшего `process_queued`.
    pub fn post_queued(&self, event_id: &str, payload: &Arc<Object>) {
        self.post_queued_internal(event_id, payload, false, false);
    }

    /// Откладывает событие, требующее живую тему на момент слива.
    pub fn post_queued_requiring_handler(&self, event_id: &str, payload: &Arc<Object>) {
        self.post_queued_internal(event_id, payload, true, false);
    }

    /// Откладывает маркер исключения: слив прервётся доменной ошибкой.
    pub fn post_queued_exception(&self, event_id: &str, payload: &Arc<Object>) {
        self.post_queued_internal(event_id, payload, false, true);
    }

    fn post_queued_internal(
        &self,
        event_id: &str,
        payload: &Arc<Object>,
        requires_handler: bool,
        is_exception: bool,
    ) {
        let entry = QueuedEvent {
            event: event_id.to_owned(),
            payload: Arc::clone(payload),
            requires_handler,
            is_exception,
        };
        let mut queue = self.queue.lock();
        if queue.processing {
            queue.next.push_back(entry);
        } else {
            queue.current.push_back(entry);
        }
        trace!(event = event_id, deferred = queue.processing, "event queued");
    }

    /// Сливает отложенную очередь в порядке FIFO.
    ///
    /// Право слива принадлежит одному потоку; остальные ждут на условной
    /// переменной. События, отложенные обработчиками во время слива,
    /// попадают во вторую очередь и дождутся следующего вызова. Сдача
    /// права, перестановка очередей и оповещение ожидающих выполняются в
    /// guard-е на любом пути выхода, включая ошибочный.
    pub fn process_queued(&self) -> BusResult<()> {
        let _in_flight = InFlightGuard::enter(self);
        let me = thread::current().id();

        {
            let mut queue = self.queue.lock();
            if queue.processor == Some(me) {
                queue.depth += 1;
            } else {
                while queue.processor.is_some() {
                    self.queue_idle.wait(&mut queue);
                }
                queue.processor = Some(me);
                queue.processing = true;
                queue.depth = 1;
            }
        }
        let _release = DrainRelease { blackboard: self };

        loop {
            let Some(entry) = self.queue.lock().current.pop_front() else {
                return Ok(());
            };

            if entry.is_exception {
                return Err(BusError::Blackboard {
                    event: entry.event,
                    payload: entry.payload,
                });
            }

            let found = self.topics.lock().get(entry.event.as_str()).cloned();
            let live = found.filter(|topic| !topic.state.lock().deleted);
            let Some(topic) = live else {
                if entry.requires_handler {
                    return Err(BusError::UnhandledEvent {
                        event: entry.event,
                        payload: entry.payload,
                    });
                }
                continue;
            };

            self.dispatch_on(&entry.event, &topic, &entry.payload)?;
        }
    }

    // ------------------------------------------------------------------
    //  Внутреннее
    // ------------------------------------------------------------------

    fn allocate_handler_id(&self) -> HandlerId {
        self.next_handler_id.fetch_add(1, Ordering::Relaxed)
    }

    fn create_topic(&self, event_id: &str, handler: EventHandler, once: CallOnce) -> HandlerId {
        let id = self.allocate_handler_id();
        let topic = Arc::new(Topic::with_handler(HandlerEntry {
            id,
            once: once == CallOnce::Yes,
            handler,
        }));
        self.topics.lock().insert(event_id.to_owned(), topic);
        debug!(event = event_id, handler = id, "event handler registered");
        id
    }

    /// Диспетчеризация на найденной теме плюс проверка её удаления.
    ///
    /// При ошибке обработчика проверка удаления пропускается: тема уже в
    /// согласованном состоянии, ошибка уходит отправителю.
    fn dispatch_on(&self, event_id: &str, topic: &Arc<Topic>, payload: &Object) -> BusResult<()> {
        topic.dispatch(event_id, payload, &self.last_auto_removed)?;
        self.check_topic_removal(event_id, topic);
        Ok(())
    }

    /// Пустой список обработчиков помечает тему удалённой; удалённая тема
    /// убирается физически, как только не останется публикаций в полёте.
    fn check_topic_removal(&self, event_id: &str, topic: &Arc<Topic>) {
        let deleted = {
            let mut state = topic.state.lock();
            if !state.deleted && state.handlers.is_empty() {
                state.deleted = true;
            }
            state.deleted
        };
        if deleted {
            self.try_remove(event_id, topic);
        }
    }

    /// Физически убирает тему из карты, если нет публикаций в полёте.
    ///
    /// Счётчик держится заблокированным на время удаления, чтобы
    /// конкурирующая публикация либо успела поднять его, либо уже не нашла
    /// тему. Возвращает true, когда темы под этим именем больше нет.
    fn try_remove(&self, event_id: &str, topic: &Arc<Topic>) -> bool {
        let in_flight = self.in_flight.lock();
        if *in_flight != 0 {
            return false;
        }
        let mut topics = self.topics.lock();
        if topics
            .get(event_id)
            .is_some_and(|existing| Arc::ptr_eq(existing, topic))
        {
            topics.remove(event_id);
            debug!(event = event_id, "topic removed");
        }
        true
    }
}

impl Default for Blackboard {
    fn default() -> Self {
        Self::new()
    }
}

/// Счётчик публикаций в полёте со сдачей на любом пути выхода.
struct InFlightGuard<'a> {
    blackboard: &'a Blackboard,
}

impl<'a> InFlightGuard<'a> {
    fn enter(blackboard: &'a Blackboard) -> Self {
        let mut count = blackboard.in_flight.lock();
        debug_assert!(*count >= 0);
        *count += 1;
        Self { blackboard }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut count = self.blackboard.in_flight.lock();
        *count -= 1;
        debug_assert!(*count >= 0);
    }
}

/// Сдача права слива отложенной очереди.
///
/// Только самый внешний уровень гасит флаг, переставляет очереди и будит
/// одного ожидающего; вложенные вызовы лишь уменьшают глубину.
struct DrainRelease<'a> {
    blackboard: &'a Blackboard,
}

impl Drop for DrainRelease<'_> {
    fn drop(&mut self) {
        let mut queue = self.blackboard.queue.lock();
        queue.depth -= 1;
        if queue.depth == 0 {
            queue.processing = false;
            queue.processor = None;
            {
                let queue = &mut *queue;
                std::mem::swap(&mut queue.current, &mut queue.next);
            }
            drop(queue);
            self.blackboard.queue_idle.notify_one();
        }
    }
}
