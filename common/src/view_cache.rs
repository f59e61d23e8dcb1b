//! 派生ビューのキャッシュ
//!
//! 所有者（Dataset）ごとに1つ持ち、ビュー名 → `CachedView<T>` のマップを管理する。
//! `invalidate_all` で全ビューをdirtyにし、次の `get` で再計算する。
//! 無効化は粗粒度で、ビュー間の依存関係は追跡しない。
//!
//! シングルスレッド前提（Rc/RefCell）。計算中は借用を保持しないが、
//! 計算関数から所有者のリストを変更することはサポートしない。

use crate::error::Result;
use crate::observable::Observer;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;
use tracing::debug;

/// 1ビュー分の (値, dirtyフラグ)
#[derive(Debug)]
pub struct CachedView<T> {
    value: Option<Rc<T>>,
    dirty: bool,
}

impl<T> CachedView<T> {
    fn fresh(value: Rc<T>) -> Self {
        Self {
            value: Some(value),
            dirty: false,
        }
    }

    /// dirtyでなければキャッシュ値
    pub fn value(&self) -> Option<&Rc<T>> {
        if self.dirty {
            None
        } else {
            self.value.as_ref()
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty || self.value.is_none()
    }
}

/// 型を消したビュー（全ビュー一括の無効化用）
trait ErasedView {
    fn mark_dirty(&mut self);
    fn is_dirty(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
}

impl<T: 'static> ErasedView for CachedView<T> {
    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn is_dirty(&self) -> bool {
        CachedView::is_dirty(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct ViewCache<K> {
    views: RefCell<HashMap<K, Box<dyn ErasedView>>>,
}

impl<K> ViewCache<K>
where
    K: Copy + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self {
            views: RefCell::new(HashMap::new()),
        }
    }

    /// キャッシュ済みならそのまま（同じRc）を返し、なければ `compute` で計算して保存
    ///
    /// `compute` が失敗した場合は何も保存せずエラーを返す（部分的な結果は残らない）。
    pub fn get<T, F>(&self, key: K, compute: F) -> Result<Rc<T>>
    where
        T: 'static,
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.cached::<T>(key) {
            return Ok(value);
        }

        debug!(view = ?key, "recomputing derived view");
        let value = Rc::new(compute()?);
        self.views
            .borrow_mut()
            .insert(key, Box::new(CachedView::fresh(value.clone())));
        Ok(value)
    }

    /// 全ビューをdirtyにする（値は次の読み取りまで保持）
    pub fn invalidate_all(&self) {
        let mut views = self.views.borrow_mut();
        for view in views.values_mut() {
            view.mark_dirty();
        }
        debug!(views = views.len(), "invalidated derived views");
    }

    /// 未計算のビューもdirty扱い
    pub fn is_dirty(&self, key: K) -> bool {
        self.views
            .borrow()
            .get(&key)
            .map(|view| view.is_dirty())
            .unwrap_or(true)
    }

    /// 一度でも計算されたビューの数
    pub fn len(&self) -> usize {
        self.views.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.borrow().is_empty()
    }

    fn cached<T: 'static>(&self, key: K) -> Option<Rc<T>> {
        let views = self.views.borrow();
        let view = views.get(&key)?;
        // 同じキーで別の型を要求された場合はミス扱い（再計算で上書き）
        view.as_any()
            .downcast_ref::<CachedView<T>>()
            .and_then(|v| v.value())
            .cloned()
    }
}

impl<K> Default for ViewCache<K>
where
    K: Copy + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Observer for ViewCache<K>
where
    K: Copy + Eq + Hash + Debug,
{
    fn notify(&self) {
        self.invalidate_all();
    }
}
