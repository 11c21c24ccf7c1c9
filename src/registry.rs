//! Процессный реестр именованных досок.
//!
//! Единственный на процесс каталог `имя → доска` с явным жизненным циклом
//! `init` / `shutdown`. Создание и уничтожение досок трогают только карту
//! реестра и никогда не блокируют диспетчеризацию на самих досках.

use std::{collections::HashMap, sync::Arc};

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::bus::Blackboard;

/// Процессная ячейка синглтона. Заполняется в `init`, очищается в `shutdown`.
static REGISTRY: Lazy<RwLock<Option<Arc<BlackboardRegistry>>>> = Lazy::new(|| RwLock::new(None));

/// Каталог досок, разделяемый потоками процесса.
///
/// Уничтожение доски, на которой другие потоки держат публикации в полёте,
/// не определено для этой конструкции: вызывающая сторона обязана сначала
/// дождаться их завершения.
pub struct BlackboardRegistry {
    buses: Mutex<HashMap<String, Arc<Blackboard>>>,
}

impl BlackboardRegistry {
    fn new() -> Self {
        Self {
            buses: Mutex::new(HashMap::new()),
        }
    }

    /// Возвращает доску по имени.
    pub fn get(&self, name: &str) -> Option<Arc<Blackboard>> {
        self.buses.lock().get(name).cloned()
    }

    /// Создаёт доску под именем; повторный вызов возвращает существующую.
    ///
    /// Потоком-владельцем новой доски становится вызывающий поток.
    pub fn create(&self, name: &str) -> Arc<Blackboard> {
        let mut buses = self.buses.lock();
        if let Some(blackboard) = buses.get(name) {
            return Arc::clone(blackboard);
        }
        let blackboard = Arc::new(Blackboard::new());
        buses.insert(name.to_owned(), Arc::clone(&blackboard));
        debug!(name, "blackboard created");
        blackboard
    }

    /// Убирает доску из каталога; отсутствующее имя игнорируется.
    pub fn destroy(&self, name: &str) {
        if self.buses.lock().remove(name).is_some() {
            debug!(name, "blackboard destroyed");
        }
    }

    /// Создаёт процессный реестр; повторный вызов ничего не меняет.
    pub fn init() {
        let mut cell = REGISTRY.write();
        if cell.is_none() {
            *cell = Some(Arc::new(BlackboardRegistry::new()));
            info!("blackboard registry initialized");
        }
    }

    /// Уничтожает процессный реестр вместе со всеми досками и их темами.
    pub fn shutdown() {
        if REGISTRY.write().take().is_some() {
            info!("blackboard registry shut down");
        }
    }
}

/// Возвращает процессный реестр.
///
/// # Panics
///
/// Паникует, если реестр ещё не создан через [`BlackboardRegistry::init`].
pub fn registry() -> Arc<BlackboardRegistry> {
    REGISTRY
        .read()
        .as_ref()
        .cloned()
        .expect("blackboard registry is not initialized")
}
