//! データセット（レコード列 + クラスマップ + 派生ビュー）
//!
//! レコード列は `ObservableList` で保持し、そのオブザーバとして
//! ビューキャッシュを登録する。レコードを変更すると全ビューがdirtyになり、
//! 次に読んだときに再計算される。ビューの状態はインスタンスごとに独立で、
//! filter等で作った別インスタンスには影響しない。

mod persist;

pub use persist::unique_save_path;

use crate::error::{RecordStatsError, Result};
use crate::metadata::FsMetadataProvider;
use record_stats_common::parser::placeholder_class_map;
use record_stats_common::stats::{self, ClassSummary, DatasetSummary, GalleryRow, ImageSummary};
use record_stats_common::{
    aggregate, AnnotationRow, ClassMap, FileMetadataProvider, ObservableList, Record, ViewCache,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

/// キャッシュされる派生ビュー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetView {
    /// アノテーション単位の行テーブル
    Data,
    Gallery,
    DatasetStats,
    ImageStats,
    ClassStats,
    /// filepath → レコード位置
    RecordIndex,
}

pub struct Dataset {
    records: ObservableList<Record>,
    class_map: ClassMap,
    name: Option<String>,
    description: Option<String>,
    views: Rc<ViewCache<DatasetView>>,
    metadata: Rc<dyn FileMetadataProvider>,
}

impl Dataset {
    /// タイムスタンプは実ファイルから読む（見つからなければ集計はエラー）
    pub fn new(records: Vec<Record>, class_map: ClassMap) -> Self {
        Self::assemble(
            records,
            class_map,
            None,
            None,
            Rc::new(FsMetadataProvider::strict()),
        )
    }

    pub fn builder(records: Vec<Record>) -> DatasetBuilder {
        DatasetBuilder::new(records)
    }

    fn assemble(
        records: Vec<Record>,
        class_map: ClassMap,
        name: Option<String>,
        description: Option<String>,
        metadata: Rc<dyn FileMetadataProvider>,
    ) -> Self {
        let views: Rc<ViewCache<DatasetView>> = Rc::new(ViewCache::new());
        let mut records = ObservableList::new(records);
        records.subscribe(views.clone());

        Self {
            records,
            class_map,
            name,
            description,
            views,
            metadata,
        }
    }

    pub fn records(&self) -> &ObservableList<Record> {
        &self.records
    }

    /// 変更はすべてのビューを無効化する
    pub fn records_mut(&mut self) -> &mut ObservableList<Record> {
        &mut self.records
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn num_images(&self) -> usize {
        self.len()
    }

    pub fn class_map(&self) -> &ClassMap {
        &self.class_map
    }

    pub fn set_class_map(&mut self, class_map: ClassMap) {
        self.class_map = class_map;
        self.views.invalidate_all();
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: Option<String>) {
        self.name = name;
        self.views.invalidate_all();
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
        self.views.invalidate_all();
    }

    pub fn is_view_dirty(&self, view: DatasetView) -> bool {
        self.views.is_dirty(view)
    }

    /// "data" ビュー（アノテーション単位の行テーブル）
    pub fn data(&self) -> Result<Rc<Vec<AnnotationRow>>> {
        Ok(self.rows()?)
    }

    pub fn gallery(&self) -> Result<Rc<Vec<GalleryRow>>> {
        Ok(self.views.get(DatasetView::Gallery, || {
            Ok(stats::gallery(&self.rows()?))
        })?)
    }

    pub fn dataset_stats(&self) -> Result<Rc<DatasetSummary>> {
        Ok(self.views.get(DatasetView::DatasetStats, || {
            Ok(stats::dataset_summary(
                &self.rows()?,
                self.name(),
                self.description(),
            ))
        })?)
    }

    pub fn image_stats(&self) -> Result<Rc<ImageSummary>> {
        Ok(self.views.get(DatasetView::ImageStats, || {
            Ok(stats::image_summary(&self.rows()?))
        })?)
    }

    pub fn class_stats(&self) -> Result<Rc<Vec<ClassSummary>>> {
        Ok(self.views.get(DatasetView::ClassStats, || {
            Ok(stats::class_summary(&self.rows()?))
        })?)
    }

    /// filepathからレコードを引く（描画側が画像IDで問い合わせる用）
    pub fn record_by_filepath(&self, filepath: &str) -> Result<Option<&Record>> {
        let index = self.views.get(DatasetView::RecordIndex, || {
            Ok(self
                .records
                .iter()
                .enumerate()
                .map(|(i, r)| (r.filepath.clone(), i))
                .collect::<HashMap<String, usize>>())
        })?;
        Ok(index.get(filepath).and_then(|&i| self.records.get(i)))
    }

    /// 行単位の条件でレコード単位に絞り込む
    ///
    /// 条件を満たす行を1つでも持つレコードを、アノテーションを欠かさず丸ごと残す。
    /// 新しいデータセットは同じクラスマップを持ち、キャッシュは独立。
    pub fn filter<P>(&self, predicate: P) -> Result<Dataset>
    where
        P: Fn(&AnnotationRow) -> bool,
    {
        let rows = self.data()?;
        let matching: HashSet<&str> = rows
            .iter()
            .filter(|&row| predicate(row))
            .map(|row| row.id.as_str())
            .collect();

        let records: Vec<Record> = self
            .records
            .iter()
            .filter(|r| matching.contains(r.id.as_str()))
            .cloned()
            .collect();

        Ok(Self::assemble(
            records,
            self.class_map.clone(),
            None,
            None,
            self.metadata.clone(),
        ))
    }

    /// 先頭から順に分割（シャッフルしない）
    ///
    /// `fraction > 1` の場合は件数として扱う。ランダムに分けたい場合は
    /// 事前にレコードを並べ替えておくこと。
    pub fn split(&self, fraction: f64) -> (Vec<Record>, Vec<Record>) {
        let len = self.records.len();
        let fraction = if fraction > 1.0 && len > 0 {
            fraction / len as f64
        } else {
            fraction
        };
        // 負数・NaN は 0 に飽和する
        let cut = ((len as f64 * fraction) as usize).min(len);

        let records = self.records.as_slice();
        (records[..cut].to_vec(), records[cut..].to_vec())
    }

    fn rows(&self) -> record_stats_common::Result<Rc<Vec<AnnotationRow>>> {
        self.views.get(DatasetView::Data, || {
            aggregate(
                self.records.as_slice(),
                Some(&self.class_map),
                self.metadata.as_ref(),
            )
        })
    }
}

impl std::ops::Index<usize> for Dataset {
    type Output = Record;

    fn index(&self, index: usize) -> &Record {
        &self.records[index]
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dataset_stats() {
            Ok(summary) => write!(f, "{}", summary),
            Err(e) => write!(f, "<stats unavailable: {}>", e),
        }
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("name", &self.name)
            .field("records", &self.records.len())
            .field("classes", &self.class_map.len())
            .finish()
    }
}

/// 名前・説明・メタデータ取得元を指定して作る
pub struct DatasetBuilder {
    records: Vec<Record>,
    class_map: Option<ClassMap>,
    infer_class_map: bool,
    name: Option<String>,
    description: Option<String>,
    metadata: Option<Rc<dyn FileMetadataProvider>>,
}

impl DatasetBuilder {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            class_map: None,
            infer_class_map: false,
            name: None,
            description: None,
            metadata: None,
        }
    }

    pub fn class_map(mut self, class_map: ClassMap) -> Self {
        self.class_map = Some(class_map);
        self
    }

    /// クラスマップ未指定時、レコード中のクラスIDからプレースホルダ名で作る
    pub fn infer_class_map(mut self) -> Self {
        self.infer_class_map = true;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn metadata_provider(mut self, provider: Rc<dyn FileMetadataProvider>) -> Self {
        self.metadata = Some(provider);
        self
    }

    pub fn build(self) -> Result<Dataset> {
        let class_map = match self.class_map {
            Some(map) => map,
            None if self.infer_class_map => placeholder_class_map(&self.records)?,
            None => {
                return Err(RecordStatsError::Common(record_stats_common::Error::Config(
                    "class map is required (or call infer_class_map)".into(),
                )))
            }
        };
        let metadata = self
            .metadata
            .unwrap_or_else(|| Rc::new(FsMetadataProvider::strict()));

        Ok(Dataset::assemble(
            self.records,
            class_map,
            self.name,
            self.description,
            metadata,
        ))
    }
}
