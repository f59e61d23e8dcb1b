use anyhow::Context;
use clap::Parser;
use record_stats::cli::{Cli, Commands};
use record_stats::config::Config;
use record_stats::metadata::FsMetadataProvider;
use record_stats::{Dataset, RecordStatsError, ResultsDataset};
use record_stats_common::{AnnotationRow, FileMetadataProvider, Record};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use walkdir::WalkDir;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("設定ファイルの読み込みに失敗しました")?;

    let default_filter = if cli.verbose {
        "record_stats=debug,record_stats_common=debug".to_string()
    } else {
        config.log_filter.clone()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let metadata: Rc<dyn FileMetadataProvider> = if cli.lenient {
        Rc::new(FsMetadataProvider::lenient())
    } else {
        config.metadata_provider()
    };

    match cli.command {
        Commands::Stats { input, json } => {
            let dataset = load_dataset(&input, &metadata)?;

            let summary = dataset.dataset_stats()?;
            let images = dataset.image_stats()?.rounded();
            let classes: Vec<_> = dataset.class_stats()?.iter().map(|c| c.rounded()).collect();

            if json {
                let value = serde_json::json!({
                    "dataset": &*summary,
                    "images": images,
                    "classes": classes,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }

            println!("📊 record-stats - 統計\n");
            println!("{}\n", summary);
            println!("画像:");
            println!("  枚数: {}", images.num_images);
            println!(
                "  アノテーション数/枚: 最小 {} / 最大 {} / 平均 {}",
                or_dash(images.min_objects),
                or_dash(images.max_objects),
                or_dash(images.mean_objects)
            );
            println!("\nクラス:");
            for class in &classes {
                println!(
                    "  {}: 画像 {} / 物体 {} / 平均 {} / 割合 {}",
                    class.class,
                    class.imgs,
                    class.objects,
                    class.avg_objects_per_img,
                    class.frac_of_labels
                );
            }
        }

        Commands::Gallery { input, limit } => {
            let dataset = load_dataset(&input, &metadata)?;
            let gallery = dataset.gallery()?;

            println!("🖼  record-stats - ギャラリー ({}件中{}件)\n", gallery.len(), limit.min(gallery.len()));
            for (i, row) in gallery.iter().take(limit).enumerate() {
                println!(
                    "{:>4}  {}  {}  area={:.1}  {}x{}  ratio={:.2}  ({}x{})",
                    i,
                    row.id,
                    row.label,
                    row.area,
                    row.bbox_width,
                    row.bbox_height,
                    row.bbox_ratio,
                    row.width,
                    row.height
                );
            }
        }

        Commands::Filter { input, label, min_area, max_area, output } => {
            let dataset = load_dataset(&input, &metadata)?;

            let mut filtered = dataset.filter(|row: &AnnotationRow| {
                label.as_deref().map_or(true, |l| row.label == l)
                    && min_area.map_or(true, |min| row.area >= min)
                    && max_area.map_or(true, |max| row.area <= max)
            })?;
            println!("✔ {}件中{}件のレコードが条件に一致", dataset.len(), filtered.len());

            filtered.set_name(Some(format!("{}_filtered", dataset_stem(&dataset, &input))));
            let folder = output_folder(output, &config, &input);
            let path = filtered
                .save(&folder)
                .with_context(|| format!("保存に失敗しました: {}", folder.display()))?;
            println!("✔ 保存: {}", path.display());
        }

        Commands::Split { input, fraction, output } => {
            let dataset = load_dataset(&input, &metadata)?;
            let stem = dataset_stem(&dataset, &input);
            let (train, valid) = dataset.split(fraction);
            println!("✔ 学習用 {}件 / 検証用 {}件", train.len(), valid.len());

            let folder = output_folder(output, &config, &input);
            for (records, suffix) in [(train, "train"), (valid, "valid")] {
                let part = build_part(&dataset, records, format!("{}_{}", stem, suffix), &metadata)?;
                let path = part.save(&folder)?;
                println!("✔ 保存: {}", path.display());
            }
        }

        Commands::List { folder } => {
            if !folder.is_dir() {
                return Err(RecordStatsError::FolderNotFound(folder.display().to_string()).into());
            }

            println!("📁 {}\n", folder.display());
            let mut found = 0;
            for entry in WalkDir::new(&folder)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| e.path().extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")))
            {
                match Dataset::load_with_provider(entry.path(), metadata.clone()) {
                    Ok(dataset) => {
                        found += 1;
                        println!(
                            "  {}  name={}  records={}  classes={}",
                            entry.path().display(),
                            dataset.name().unwrap_or("-"),
                            dataset.len(),
                            dataset.class_map().len()
                        );
                    }
                    Err(e) => debug!(path = %entry.path().display(), error = %e, "not a dataset"),
                }
            }
            println!("\n✔ {}件のデータセット", found);
        }

        Commands::Results { input, image } => {
            ensure_file(&input)?;
            let results = ResultsDataset::load(&input)
                .with_context(|| format!("結果CSVの読み込みに失敗しました: {}", input.display()))?;

            let summary = results.summary()?;
            println!("🎯 record-stats - 推論結果\n");
            println!("  画像数: {}", summary.num_images);
            println!("  予測: {}", summary.num_predictions);
            println!("  正解: {}", summary.num_ground_truth);
            match summary.mean_loss_total {
                Some(loss) => println!("  平均loss: {:.4}", loss),
                None => println!("  平均loss: -"),
            }
            println!("  クラス: {}", results.class_map()?.labels().join(", "));

            if let Some(image_id) = image {
                match results.image_pair(&image_id)? {
                    Some((truth, prediction)) => {
                        print_record("正解", &truth);
                        print_record("予測", &prediction);
                    }
                    None => warn!(image_id = %image_id, "image not found in results"),
                }
            }
        }

        Commands::Config { show } => {
            if show {
                println!("設定:");
                println!("  パス: {}", Config::config_path()?.display());
                println!(
                    "  保存先: {}",
                    config
                        .default_save_dir
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "（入力と同じフォルダ）".into())
                );
                println!("  前処理: {}", config.preprocessing());
                println!("  タイムスタンプ: {}", if config.lenient_timestamps { "欠損を許容" } else { "必須" });
                println!("  IoU閾値: {:?}", config.iou_thresholds);
                println!("  ログ: {}", config.log_filter);
            }
        }
    }

    Ok(())
}

fn load_dataset(path: &Path, metadata: &Rc<dyn FileMetadataProvider>) -> anyhow::Result<Dataset> {
    ensure_file(path)?;
    Dataset::load_with_provider(path, metadata.clone())
        .with_context(|| format!("データセットの読み込みに失敗しました: {}", path.display()))
}

/// 入力ファイルがなければ分かりやすいメッセージで止める
fn ensure_file(path: &Path) -> Result<(), RecordStatsError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(RecordStatsError::FileNotFound(path.display().to_string()))
    }
}

/// 保存名のもと（データセット名、なければ入力ファイル名）
fn dataset_stem(dataset: &Dataset, input: &Path) -> String {
    dataset
        .name()
        .map(String::from)
        .or_else(|| input.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "dataset".into())
}

fn output_folder(output: Option<PathBuf>, config: &Config, input: &Path) -> PathBuf {
    output
        .or_else(|| config.default_save_dir.clone())
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn build_part(
    source: &Dataset,
    records: Vec<Record>,
    name: String,
    metadata: &Rc<dyn FileMetadataProvider>,
) -> anyhow::Result<Dataset> {
    let mut builder = Dataset::builder(records)
        .class_map(source.class_map().clone())
        .name(name)
        .metadata_provider(metadata.clone());
    if let Some(description) = source.description() {
        builder = builder.description(description);
    }
    Ok(builder.build()?)
}

fn or_dash<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

fn print_record(title: &str, record: &Record) {
    println!("\n{} ({}x{}): {}件", title, record.width, record.height, record.annotations.len());
    for a in &record.annotations {
        let score = a.score.map(|s| format!("{:.3}", s)).unwrap_or_else(|| "-".into());
        println!(
            "  label={} score={} [{:.1}, {:.1}, {:.1}, {:.1}]",
            a.label, score, a.bbox.xmin, a.bbox.ymin, a.bbox.xmax, a.bbox.ymax
        );
    }
}
