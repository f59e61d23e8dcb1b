//! 物体検出の推論結果データセット
//!
//! 予測行と正解行を1つのテーブルで持つ。指標（適合率・再現率）の計算は
//! 外部の `MetricEngine` に任せ、結果をキャッシュする。

use crate::error::Result;
use record_stats_common::results::{
    build_result_rows, class_map_from_results, default_iou_thresholds, image_pair, results_summary,
};
use record_stats_common::csv_table::{read_results_csv, write_results_csv};
use record_stats_common::{
    ClassMap, Error, FileMetadataProvider, ImageSizeProvider, MetricEngine, MetricRow,
    ObservableList, Prediction, Preprocessing, Record, ResultRow, ResultsSummary, SampleWithLoss,
    ViewCache,
};
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultsView {
    Metrics,
    Summary,
    ClassMap,
}

pub struct ResultsDataset {
    rows: ObservableList<ResultRow>,
    name: Option<String>,
    description: Option<String>,
    iou_thresholds: Vec<f64>,
    metric_engine: Option<Box<dyn MetricEngine>>,
    views: Rc<ViewCache<ResultsView>>,
}

impl ResultsDataset {
    pub fn new(rows: Vec<ResultRow>) -> Self {
        let views: Rc<ViewCache<ResultsView>> = Rc::new(ViewCache::new());
        let mut rows = ObservableList::new(rows);
        rows.subscribe(views.clone());

        Self {
            rows,
            name: None,
            description: None,
            iou_thresholds: default_iou_thresholds(),
            metric_engine: None,
            views,
        }
    }

    /// 予測とサンプル（正解 + 損失）から作る
    ///
    /// 元画像サイズは `image_sizes` から取得し、座標は元画像のピクセル空間に補正する。
    pub fn from_predictions(
        predictions: &[Prediction],
        samples: &[SampleWithLoss],
        preprocessing: Preprocessing,
        class_map: Option<&ClassMap>,
        image_sizes: &dyn ImageSizeProvider,
        metadata: &dyn FileMetadataProvider,
    ) -> Result<Self> {
        let rows = build_result_rows(
            predictions,
            samples,
            preprocessing,
            class_map,
            image_sizes,
            metadata,
        )?;
        info!(
            images = samples.len(),
            rows = rows.len(),
            preprocessing = %preprocessing,
            "results dataset built"
        );
        Ok(Self::new(rows))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metric_engine(mut self, engine: Box<dyn MetricEngine>) -> Self {
        self.set_metric_engine(engine);
        self
    }

    pub fn set_metric_engine(&mut self, engine: Box<dyn MetricEngine>) {
        self.metric_engine = Some(engine);
        self.views.invalidate_all();
    }

    pub fn set_iou_thresholds(&mut self, thresholds: Vec<f64>) {
        self.iou_thresholds = thresholds;
        self.views.invalidate_all();
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn rows(&self) -> &ObservableList<ResultRow> {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut ObservableList<ResultRow> {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_view_dirty(&self, view: ResultsView) -> bool {
        self.views.is_dirty(view)
    }

    /// 行中の (label, label_num) から作るクラスマップ
    pub fn class_map(&self) -> Result<Rc<ClassMap>> {
        Ok(self.views.get(ResultsView::ClassMap, || {
            class_map_from_results(self.rows.as_slice())
        })?)
    }

    pub fn summary(&self) -> Result<Rc<ResultsSummary>> {
        Ok(self.views.get(ResultsView::Summary, || {
            Ok(results_summary(self.rows.as_slice()))
        })?)
    }

    /// 指標エンジン未設定なら `NotConfigured`
    pub fn metrics(&self) -> Result<Rc<Vec<MetricRow>>> {
        Ok(self.views.get(ResultsView::Metrics, || {
            let engine = self.metric_engine.as_ref().ok_or_else(|| {
                Error::NotConfigured("metric engine is not set".into())
            })?;
            engine.compute(self.rows.as_slice(), &self.iou_thresholds)
        })?)
    }

    /// 描画用の (正解, 予測) レコード
    pub fn image_pair(&self, image_id: &str) -> Result<Option<(Record, Record)>> {
        Ok(image_pair(self.rows.as_slice(), image_id)?)
    }

    /// CSVで保存（親フォルダがなければ作る）
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, write_results_csv(self.rows.as_slice()))?;
        info!(path = %path.display(), rows = self.rows.len(), "results saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let rows = read_results_csv(&content)?;
        info!(path = %path.display(), rows = rows.len(), "results loaded");
        Ok(Self::new(rows))
    }
}

impl fmt::Debug for ResultsDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultsDataset")
            .field("name", &self.name)
            .field("rows", &self.rows.len())
            .field("metric_engine", &self.metric_engine.is_some())
            .finish()
    }
}
