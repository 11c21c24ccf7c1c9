//! Ядро доски: темы, синхронная и отложенная диспетчеризация.

pub mod blackboard;
mod queued;
mod topic;

use std::sync::Arc;

pub use blackboard::{Blackboard, CallOnce, HandlerId};

use crate::{error::BusResult, payload::Object};

/// Обработчик события: `(идентификатор события, полезная нагрузка) → вердикт`.
///
/// - `Ok(true)` — продолжить цикл вызова;
/// - `Ok(false)` — остановить цикл для этой публикации;
/// - `Err(BusError::StopInvocation)` — остановить цикл сигналом
///   (см. [`Blackboard::stop_invocation_loop`]);
/// - любая другая ошибка поднимается из `post` / `process_queued` наружу.
pub type EventHandler = Arc<dyn Fn(&str, &Object) -> BusResult<bool> + Send + Sync>;
