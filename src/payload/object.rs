//! Ассоциативный объект: неупорядоченная карта `Value → Value`.
//!
//! Полезная нагрузка события собирается из таких объектов. Доска не
//! копирует и не изменяет их — объект принадлежит отправителю, обработчики
//! видят заимствование.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::Value;

/// Карта `Value → Value` со вставкой, заменой и удалением по ключу.
///
/// Два объекта равны, когда совпадают по длине и каждая пара одного
/// находится в другом. Поиск ключей идёт через хеш, поэтому объект-ключ
/// совпадает только с тем же самым экземпляром (см. [`Value`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Object {
    values: HashMap<Value, Value>,
}

impl Object {
    /// Создаёт пустой объект.
    pub fn new() -> Self {
        Self::default()
    }

    /// Вставляет пару; существующий ключ получает новое значение.
    pub fn insert(&mut self, key: Value, value: Value) -> &mut Self {
        self.values.insert(key, value);
        self
    }

    /// Возвращает значение по ключу.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.values.get(key)
    }

    /// Удаляет ключ; отсутствующий ключ игнорируется.
    pub fn remove(&mut self, key: &Value) -> &mut Self {
        self.values.remove(key);
        self
    }

    /// Количество пар.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Eq for Object {}
