//! Doska — внутрипроцессная событийная доска (blackboard) с учётом потоков.
//!
//! Основные модули:
//! - `bus` — доска: реестр обработчиков, синхронная и отложенная доставка
//! - `error` — типы ошибок доски
//! - `logging` — инициализация `tracing` для встраивающих приложений
//! - `payload` — полезная нагрузка событий: `Value` и `Object`
//! - `registry` — процессный каталог именованных досок

/// Доска: реестр обработчиков, синхронная и отложенная доставка.
pub mod bus;
/// Типы ошибок доски.
pub mod error;
/// Инициализация логирования.
pub mod logging;
/// Полезная нагрузка событий: динамическое значение и объект.
pub mod payload;
/// Процессный каталог именованных досок.
pub mod registry;

// -----------------------------------------------------------------------------
//  Часто используемые публичные типы
// -----------------------------------------------------------------------------

/// Реэкспорт доски и её публичного словаря.
pub use bus::{Blackboard, CallOnce, EventHandler, HandlerId};

/// Реэкспорт типов ошибок.
pub use error::{BusError, BusResult};

/// Реэкспорт бутстрапа логирования.
pub use logging::{init_logging, LoggingConfig};

/// Реэкспорт полезной нагрузки.
pub use payload::{Object, Value};

/// Реэкспорт реестра досок.
pub use registry::{registry, BlackboardRegistry};
