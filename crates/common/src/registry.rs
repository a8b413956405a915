//! プロセスの寿命を通して保持するキー付きストア
//!
//! 引き継ぎメモや機械の制御状態のように、ハンドラ間で共有する小さな状態を
//! グローバル変数ではなくインスタンスとして持ち回るために使う。

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
pub struct KeyedStore<K, V> {
    entries: Mutex<HashMap<K, V>>,
}

impl<K, V> Default for KeyedStore<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> KeyedStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, V>> {
        // 保持しているのは単純な値だけなので、poison されても中身はそのまま使える
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().get(key).cloned()
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.lock().insert(key, value)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.lock().remove(key)
    }

    /// 既存の値だけを更新する。キーが無ければ `None`
    pub fn modify<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.lock().get_mut(key).map(f)
    }

    /// キーが無ければ `init` で作成してから更新する
    pub fn upsert<R>(&self, key: K, init: impl FnOnce() -> V, f: impl FnOnce(&mut V) -> R) -> R {
        let mut entries = self.lock();
        f(entries.entry(key).or_insert_with(init))
    }

    pub fn entries(&self) -> Vec<(K, V)> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn values(&self) -> Vec<V> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
