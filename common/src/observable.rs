//! 変更通知付きリスト
//!
//! 構造的な変更（追加・削除・置換・全削除）はすべて `mutate` を通り、
//! 呼び出しが戻る前に登録済みのオブザーバへ登録順で1回ずつ通知する。
//! 読み取り（添字・長さ・イテレーション）では通知しない。

use std::fmt;
use std::ops::Index;
use std::rc::Rc;

/// 変更通知の受け手
pub trait Observer {
    fn notify(&self);
}

impl<F: Fn()> Observer for F {
    fn notify(&self) {
        self()
    }
}

pub struct ObservableList<T> {
    items: Vec<T>,
    observers: Vec<Rc<dyn Observer>>,
}

impl<T> ObservableList<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            observers: Vec::new(),
        }
    }

    /// オブザーバを追加（同じものを複数回登録すれば複数回呼ばれる）
    pub fn subscribe(&mut self, observer: Rc<dyn Observer>) {
        self.observers.push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn push(&mut self, item: T) {
        self.mutate(|items| items.push(item))
    }

    pub fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.mutate(|items| items.extend(iter))
    }

    /// # Panics
    /// `index > len` の場合（`Vec::insert` と同じ）
    pub fn insert(&mut self, index: usize, item: T) {
        self.mutate(|items| items.insert(index, item))
    }

    /// 範囲外なら `None`（通知もしない）
    pub fn remove(&mut self, index: usize) -> Option<T> {
        if index >= self.items.len() {
            return None;
        }
        Some(self.mutate(|items| items.remove(index)))
    }

    /// 条件を満たさない要素を削除し、削除件数を返す
    pub fn retain<F: FnMut(&T) -> bool>(&mut self, keep: F) -> usize {
        self.mutate(|items| {
            let before = items.len();
            items.retain(keep);
            before - items.len()
        })
    }

    /// 添字代入。範囲外なら値をそのまま `Err` で返す
    pub fn set(&mut self, index: usize, item: T) -> Result<T, T> {
        if index >= self.items.len() {
            return Err(item);
        }
        Ok(self.mutate(|items| std::mem::replace(&mut items[index], item)))
    }

    pub fn clear(&mut self) {
        self.mutate(|items| items.clear())
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// 唯一の変更経路
    fn mutate<R>(&mut self, f: impl FnOnce(&mut Vec<T>) -> R) -> R {
        let result = f(&mut self.items);
        self.notify_all();
        result
    }

    fn notify_all(&self) {
        for observer in &self.observers {
            observer.notify();
        }
    }
}

impl<T> Default for ObservableList<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> From<Vec<T>> for ObservableList<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

impl<T> Index<usize> for ObservableList<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}

impl<'a, T> IntoIterator for &'a ObservableList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableList")
            .field("items", &self.items)
            .field("observers", &self.observers.len())
            .finish()
    }
}
