//! データセットのテスト
//!
//! ビューキャッシュの一貫性、filter/split、保存・読み込みを検証

use chrono::{TimeZone, Utc};
use record_stats::{Dataset, DatasetView, RecordStatsError};
use record_stats_common::{
    Annotation, BBox, ClassMap, Error, FileMetadataProvider, FileTimestamps,
    FixedMetadataProvider, Record,
};
use std::rc::Rc;
use tempfile::tempdir;

fn metadata() -> Rc<dyn FileMetadataProvider> {
    Rc::new(FixedMetadataProvider(FileTimestamps {
        created: Utc.timestamp_opt(1_700_000_000, 0).single(),
        modified: Utc.timestamp_opt(1_700_000_100, 0).single(),
    }))
}

fn class_map() -> ClassMap {
    ClassMap::new(["background", "cat", "dog"]).unwrap()
}

fn records() -> Vec<Record> {
    vec![
        Record::new("1", "/images/1.jpg", 100, 100)
            .with_annotation(Annotation::new(1, BBox::from_xyxy(0.0, 0.0, 10.0, 10.0)))
            .with_annotation(Annotation::new(2, BBox::from_xyxy(0.0, 0.0, 50.0, 40.0))),
        Record::new("2", "/images/2.jpg", 200, 100)
            .with_annotation(Annotation::new(1, BBox::from_xyxy(5.0, 5.0, 25.0, 15.0))),
        Record::new("3", "/images/3.jpg", 100, 200)
            .with_annotation(Annotation::new(2, BBox::from_xyxy(0.0, 0.0, 100.0, 100.0))),
        Record::new("4", "/images/4.jpg", 100, 100),
    ]
}

fn dataset() -> Dataset {
    Dataset::builder(records())
        .class_map(class_map())
        .name("pets")
        .description("cats and dogs")
        .metadata_provider(metadata())
        .build()
        .expect("データセット作成失敗")
}

/// 未変更なら同じビューを返す
#[test]
fn test_views_are_cached() {
    let ds = dataset();
    assert!(ds.is_view_dirty(DatasetView::Data));

    let first = ds.data().unwrap();
    let second = ds.data().unwrap();
    assert!(Rc::ptr_eq(&first, &second));
    assert!(!ds.is_view_dirty(DatasetView::Data));

    let stats = ds.class_stats().unwrap();
    assert!(Rc::ptr_eq(&stats, &ds.class_stats().unwrap()));
}

/// レコードを変更すると全ビューが再計算される
#[test]
fn test_mutation_invalidates_views() {
    let mut ds = dataset();
    let before = ds.data().unwrap();
    let stats_before = ds.dataset_stats().unwrap();
    assert_eq!(before.len(), 4);

    ds.records_mut().push(
        Record::new("5", "/images/5.jpg", 100, 100)
            .with_annotation(Annotation::new(1, BBox::from_xyxy(0.0, 0.0, 1.0, 1.0))),
    );
    assert!(ds.is_view_dirty(DatasetView::Data));
    assert!(ds.is_view_dirty(DatasetView::DatasetStats));

    let after = ds.data().unwrap();
    assert!(!Rc::ptr_eq(&before, &after));
    assert_eq!(after.len(), 5);
    assert_eq!(ds.dataset_stats().unwrap().no_imgs, stats_before.no_imgs + 1);
}

/// 範囲外の削除は何も変えない
#[test]
fn test_out_of_range_remove_keeps_cache() {
    let mut ds = dataset();
    let before = ds.data().unwrap();

    assert!(ds.records_mut().remove(99).is_none());
    assert!(Rc::ptr_eq(&before, &ds.data().unwrap()));
}

/// 名前・クラスマップの変更もビューを無効化する
#[test]
fn test_setters_invalidate_views() {
    let mut ds = dataset();
    assert_eq!(ds.dataset_stats().unwrap().name.as_deref(), Some("pets"));

    ds.set_name(Some("renamed".into()));
    assert_eq!(ds.dataset_stats().unwrap().name.as_deref(), Some("renamed"));

    ds.set_class_map(ClassMap::new(["bg", "kitten", "puppy"]).unwrap());
    let classes = &ds.dataset_stats().unwrap().classes;
    assert_eq!(classes, &vec!["kitten".to_string(), "puppy".to_string()]);
}

/// filterで作ったデータセットは元のキャッシュと独立
#[test]
fn test_filter_has_independent_cache() {
    let ds = dataset();
    let original = ds.data().unwrap();

    let mut filtered = ds.filter(|row| row.label == "cat").unwrap();
    filtered.records_mut().clear();

    assert!(!ds.is_view_dirty(DatasetView::Data));
    assert!(Rc::ptr_eq(&original, &ds.data().unwrap()));
    assert!(filtered.data().unwrap().is_empty());
}

/// 条件に合う行を持つレコードはアノテーションを欠かさず残る
#[test]
fn test_filter_keeps_whole_records() {
    let ds = dataset();
    let filtered = ds.filter(|row| row.label == "cat").unwrap();

    assert_eq!(filtered.len(), 2);
    assert_eq!(filtered[0].id, "1");
    assert_eq!(filtered[0].annotations.len(), 2);
    assert_eq!(filtered[1].id, "2");
    assert_eq!(filtered.class_map(), ds.class_map());
    assert!(filtered.name().is_none());
    assert!(filtered.description().is_none());

    let labels: Vec<String> = filtered.data().unwrap().iter().map(|r| r.label.clone()).collect();
    assert_eq!(labels, vec!["cat", "dog", "cat"]);
}

/// 面積条件
#[test]
fn test_filter_by_area() {
    let ds = dataset();
    let large = ds.filter(|row| row.area >= 5000.0).unwrap();

    assert_eq!(large.len(), 1);
    assert_eq!(large[0].id, "3");

    let none = ds.filter(|row| row.area < 0.0).unwrap();
    assert!(none.is_empty());
    assert!(none.data().unwrap().is_empty());
}

/// 割合と件数による分割
#[test]
fn test_split() {
    let ds = dataset();

    let (train, valid) = ds.split(0.5);
    assert_eq!(train.len(), 2);
    assert_eq!(valid.len(), 2);
    assert_eq!(train[0].id, "1");
    assert_eq!(valid[0].id, "3");

    let (train, valid) = ds.split(3.0);
    assert_eq!(train.len(), 3);
    assert_eq!(valid.len(), 1);

    let (train, valid) = ds.split(0.0);
    assert!(train.is_empty());
    assert_eq!(valid.len(), 4);

    let (train, valid) = ds.split(1.0);
    assert_eq!(train.len(), 4);
    assert!(valid.is_empty());
}

/// 統計ビューの中身
#[test]
fn test_stats_views() {
    let ds = dataset();

    let summary = ds.dataset_stats().unwrap();
    assert_eq!(summary.no_imgs, 3);
    assert_eq!(summary.no_classes, 2);
    assert_eq!(summary.area_min, Some(100.0));
    assert_eq!(summary.area_max, Some(10000.0));
    assert_eq!(summary.num_annotations_max, Some(2));

    let images = ds.image_stats().unwrap();
    assert_eq!(images.num_images, 3);
    assert_eq!(images.min_objects, Some(1));
    assert_eq!(images.max_objects, Some(2));
    assert_eq!(images.rounded().mean_objects, Some(1.33));

    let classes = ds.class_stats().unwrap();
    assert_eq!(classes.len(), 2);
    assert_eq!(classes[0].class, "cat");
    assert_eq!(classes[0].imgs, 2);
    assert_eq!(classes[0].objects, 2);
    assert!((classes[0].frac_of_labels - 0.5).abs() < 1e-12);

    assert_eq!(ds.gallery().unwrap().len(), 4);

    let text = format!("{}", ds);
    assert!(text.contains("pets"));
    assert!(text.contains("no_imgs: 3"));
}

/// filepathからレコードを引く
#[test]
fn test_record_by_filepath() {
    let mut ds = dataset();
    assert_eq!(ds.record_by_filepath("/images/2.jpg").unwrap().map(|r| r.id.as_str()), Some("2"));
    assert!(ds.record_by_filepath("/images/missing.jpg").unwrap().is_none());

    ds.records_mut().remove(0);
    assert_eq!(ds.record_by_filepath("/images/2.jpg").unwrap().map(|r| r.id.as_str()), Some("2"));
    assert!(ds.record_by_filepath("/images/1.jpg").unwrap().is_none());
}

/// タイムスタンプ取得に失敗すると集計はエラー
#[test]
fn test_missing_image_file_is_error() {
    let ds = Dataset::new(records(), class_map());
    let result = ds.data();
    assert!(matches!(result, Err(RecordStatsError::Common(Error::Io(_)))));
}

/// クラスマップなしの構築
#[test]
fn test_builder_requires_class_map() {
    let result = Dataset::builder(records()).metadata_provider(metadata()).build();
    assert!(matches!(result, Err(RecordStatsError::Common(Error::Config(_)))));

    let inferred = Dataset::builder(records())
        .infer_class_map()
        .metadata_provider(metadata())
        .build()
        .unwrap();
    assert_eq!(inferred.class_map().len(), 3);
    assert_eq!(inferred.class_map().get_by_id(2), "unknown_2");
}

/// 保存して読み込むと同じ統計になる
#[test]
fn test_save_and_load() {
    let dir = tempdir().expect("Failed to create temp dir");
    let ds = dataset();

    let path = ds.save(dir.path()).expect("保存失敗");
    assert_eq!(path, dir.path().join("pets.json"));

    let loaded = Dataset::load_with_provider(&path, metadata()).expect("読み込み失敗");
    assert_eq!(loaded.name(), Some("pets"));
    assert_eq!(loaded.description(), Some("cats and dogs"));
    assert_eq!(loaded.class_map(), ds.class_map());
    // 空のレコードは行を持たないので戻らない
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded[0].annotations.len(), 2);
    assert_eq!(*loaded.dataset_stats().unwrap(), *ds.dataset_stats().unwrap());
    assert_eq!(*loaded.class_stats().unwrap(), *ds.class_stats().unwrap());
}

/// 同名ファイルがあれば (1), (2) を付ける
#[test]
fn test_save_does_not_overwrite() {
    let dir = tempdir().expect("Failed to create temp dir");
    let ds = dataset();

    let first = ds.save(dir.path()).unwrap();
    let second = ds.save(dir.path()).unwrap();
    let third = ds.save(dir.path()).unwrap();

    assert_eq!(first, dir.path().join("pets.json"));
    assert_eq!(second, dir.path().join("pets(1).json"));
    assert_eq!(third, dir.path().join("pets(2).json"));
}

/// 名前がなければ dataset.json
#[test]
fn test_save_without_name() {
    let dir = tempdir().expect("Failed to create temp dir");
    let ds = dataset().filter(|_| true).unwrap();

    let path = ds.save(&dir.path().join("nested")).unwrap();
    assert_eq!(path, dir.path().join("nested").join("dataset.json"));

    let loaded = Dataset::load_with_provider(&path, metadata()).unwrap();
    assert!(loaded.name().is_none());
}

/// 存在しないファイルはIOエラーのまま
#[test]
fn test_load_missing_file() {
    let result = Dataset::load_with_provider(std::path::Path::new("/nonexistent/ds.json"), metadata());
    match result {
        Err(RecordStatsError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        other => panic!("IOエラーになるはず: {:?}", other.map(|d| d.len())),
    }
}

/// 反転したボックス（幅が負）でも保存したファイルを読み戻せる
#[test]
fn test_inverted_box_round_trip() {
    let dir = tempdir().expect("Failed to create temp dir");
    let records = vec![Record::new("x", "/images/x.jpg", 200, 100)
        .with_annotation(Annotation::new(1, BBox::from_xyxy(60.0, 10.0, 10.0, 30.0)))];
    let ds = Dataset::builder(records)
        .class_map(class_map())
        .name("inverted")
        .metadata_provider(metadata())
        .build()
        .unwrap();

    let row = &ds.data().unwrap()[0];
    assert_eq!(row.area, -1000.0);
    assert!(row.area_square_root.is_nan());

    let path = ds.save(dir.path()).expect("保存失敗");
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains(r#""area_square_root": "nan""#));

    let loaded = Dataset::load_with_provider(&path, metadata()).expect("読み込み失敗");
    let restored = &loaded.data().unwrap()[0];
    assert_eq!(restored.bbox(), BBox::from_xyxy(60.0, 10.0, 10.0, 30.0));
    assert_eq!(restored.area, -1000.0);
    assert!(restored.area_square_root.is_nan());
    assert_eq!(loaded.gallery().unwrap().len(), 1);
}

/// name / description のキーがないファイルは読めない（値が null なのは可）
#[test]
fn test_load_requires_name_and_description_keys() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dataset().save(dir.path()).unwrap();
    let mut value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

    value["name"] = serde_json::Value::Null;
    value["description"] = serde_json::Value::Null;
    let nulls = dir.path().join("nulls.json");
    std::fs::write(&nulls, value.to_string()).unwrap();
    let loaded = Dataset::load_with_provider(&nulls, metadata()).expect("null は許容");
    assert!(loaded.name().is_none());
    assert!(loaded.description().is_none());

    for key in ["name", "description"] {
        let mut broken = value.clone();
        broken.as_object_mut().unwrap().remove(key);
        let missing = dir.path().join(format!("no_{}.json", key));
        std::fs::write(&missing, broken.to_string()).unwrap();

        let result = Dataset::load_with_provider(&missing, metadata());
        assert!(
            matches!(result, Err(RecordStatsError::Common(Error::Deserialization(_)))),
            "{} がなくても読めてしまった",
            key
        );
    }
}

/// 壊れた・不完全なファイル
#[test]
fn test_load_incomplete_file() {
    let dir = tempdir().expect("Failed to create temp dir");

    let no_class_map = dir.path().join("a.json");
    std::fs::write(&no_class_map, r#"{"name": "x", "data": []}"#).unwrap();
    let result = Dataset::load_with_provider(&no_class_map, metadata());
    assert!(matches!(result, Err(RecordStatsError::Common(Error::Deserialization(_)))));

    let empty_data = dir.path().join("b.json");
    std::fs::write(&empty_data, r#"{"class_map": ["bg"], "data": []}"#).unwrap();
    let result = Dataset::load_with_provider(&empty_data, metadata());
    assert!(matches!(result, Err(RecordStatsError::Common(Error::Deserialization(_)))));

    let garbage = dir.path().join("c.json");
    std::fs::write(&garbage, "not json").unwrap();
    let result = Dataset::load_with_provider(&garbage, metadata());
    assert!(matches!(result, Err(RecordStatsError::Common(Error::Deserialization(_)))));
}
