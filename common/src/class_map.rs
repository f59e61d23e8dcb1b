//! クラスマップ（ID ↔ クラス名）

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// クラスIDとクラス名の双方向マップ
///
/// IDは 0..N-1 の連番。マップにないIDは `unknown_<id>` として表示する。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ClassMap {
    id2class: Vec<String>,
    class2id: HashMap<String, usize>,
}

impl ClassMap {
    /// ラベル一覧から作成（添字 = クラスID）。重複ラベルはエラー
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id2class: Vec<String> = labels.into_iter().map(Into::into).collect();
        let mut class2id = HashMap::with_capacity(id2class.len());
        for (id, label) in id2class.iter().enumerate() {
            if class2id.insert(label.clone(), id).is_some() {
                return Err(Error::Config(format!("duplicate class label: {}", label)));
            }
        }
        Ok(Self { id2class, class2id })
    }

    /// IDとクラス名の組から作成。欠けたIDはプレースホルダで埋める
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, String)>,
    {
        let known: HashMap<usize, String> = pairs.into_iter().collect();
        let len = known.keys().max().map(|max| max + 1).unwrap_or(0);
        Self::new((0..len).map(|id| {
            known
                .get(&id)
                .cloned()
                .unwrap_or_else(|| placeholder_label(id))
        }))
    }

    /// 表示名を取得（未登録IDはプレースホルダ）
    pub fn get_by_id(&self, id: usize) -> String {
        self.id2class
            .get(id)
            .cloned()
            .unwrap_or_else(|| placeholder_label(id))
    }

    pub fn get_by_name(&self, label: &str) -> Option<usize> {
        self.class2id.get(label).copied()
    }

    pub fn labels(&self) -> &[String] {
        &self.id2class
    }

    pub fn len(&self) -> usize {
        self.id2class.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id2class.is_empty()
    }
}

/// 未登録IDの表示名
pub fn placeholder_label(id: usize) -> String {
    format!("unknown_{}", id)
}

impl TryFrom<Vec<String>> for ClassMap {
    type Error = Error;

    fn try_from(labels: Vec<String>) -> Result<Self> {
        Self::new(labels)
    }
}

impl From<ClassMap> for Vec<String> {
    fn from(map: ClassMap) -> Self {
        map.id2class
    }
}
