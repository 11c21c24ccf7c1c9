//! Типы ошибок событийной доски.

use std::sync::Arc;

use thiserror::Error;

use crate::payload::Object;

pub type BusResult<T> = Result<T, BusError>;

/// Ошибки, которые доска возвращает вызывающему коду и обработчикам.
///
/// Варианты `UnhandledEvent`, `Blackboard` и `BlackboardQueued` несут имя
/// события и разделяемую полезную нагрузку. `StopInvocation` — внутренний
/// сигнал «останови цикл вызова обработчиков»: цикл диспетчеризации
/// поглощает его, наружу он не выходит.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BusError {
    /// Событие потребовало обработчик, но живой темы для него нет.
    #[error("Unhandled event exception caused while processing event '{event}'")]
    UnhandledEvent { event: String, payload: Arc<Object> },

    /// Доменная ошибка доски: `post_exception` и маркеры исключений в
    /// отложенной очереди.
    #[error("Blackboard exception caused while processing event '{event}'")]
    Blackboard { event: String, payload: Arc<Object> },

    /// Вариант для пользовательских обработчиков, поднимающих ошибку во
    /// время слива очереди. Текст совпадает с `Blackboard`; различие — в
    /// самом варианте.
    #[error("Blackboard exception caused while processing event '{event}'")]
    BlackboardQueued { event: String, payload: Arc<Object> },

    /// Сигнал кооперативной остановки цикла вызова.
    #[error("invocation loop stopped")]
    StopInvocation,
}
