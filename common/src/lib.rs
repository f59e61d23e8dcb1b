//! Record Stats Common Library
//!
//! データセット統計の純粋な部分（型・集計・座標補正）。
//! ファイルシステムに触れる処理はトレイト越しに注入する。

pub mod types;
pub mod class_map;
pub mod error;
pub mod float_repr;
pub mod observable;
pub mod view_cache;
pub mod aggregator;
pub mod stats;
pub mod coords;
pub mod parser;
pub mod results;
pub mod csv_table;

pub use types::{Annotation, AnnotationRow, BBox, Mask, Record};
pub use class_map::ClassMap;
pub use error::{Error, Result};
pub use observable::{ObservableList, Observer};
pub use view_cache::{CachedView, ViewCache};
pub use aggregator::{aggregate, FileMetadataProvider, FileTimestamps, FixedMetadataProvider};
pub use stats::{ClassSummary, DatasetSummary, GalleryRow, ImageSummary};
pub use coords::{CoordinateCorrector, ImageSize, Preprocessing};
pub use parser::{AnnotationDecoder, RecordTableParser};
pub use results::{
    ImageSizeProvider, Losses, MetricEngine, MetricRow, Prediction, ResultRow, ResultsSummary,
    SampleWithLoss,
};
