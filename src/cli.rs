use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "record-stats")]
#[command(about = "アノテーション付き画像データセットの統計ビュー生成ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 画像ファイルが見つからなくてもタイムスタンプなしで続行
    #[arg(long, global = true)]
    pub lenient: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// データセットの統計を表示
    Stats {
        /// データセットJSONファイル
        #[arg(required = true)]
        input: PathBuf,

        /// JSONで出力
        #[arg(long)]
        json: bool,
    },

    /// ギャラリー（重複除去済みの行）を表示
    Gallery {
        /// データセットJSONファイル
        #[arg(required = true)]
        input: PathBuf,

        /// 表示件数
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// 条件に合うアノテーションを持つレコードだけを残して保存
    Filter {
        /// データセットJSONファイル
        #[arg(required = true)]
        input: PathBuf,

        /// ラベル名
        #[arg(short, long)]
        label: Option<String>,

        /// 最小面積（ピクセル）
        #[arg(long)]
        min_area: Option<f64>,

        /// 最大面積（ピクセル）
        #[arg(long)]
        max_area: Option<f64>,

        /// 出力フォルダ（デフォルト: 設定の default_save_dir または入力と同じフォルダ）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 先頭から順に学習用・検証用へ分割して保存
    Split {
        /// データセットJSONファイル
        #[arg(required = true)]
        input: PathBuf,

        /// 学習用の割合（1より大きければ件数）
        #[arg(short, long, default_value = "0.8")]
        fraction: f64,

        /// 出力フォルダ
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// フォルダ内の保存済みデータセットを一覧表示
    List {
        /// 検索するフォルダ
        #[arg(required = true)]
        folder: PathBuf,
    },

    /// 推論結果CSVの概要を表示
    Results {
        /// 結果CSVファイル
        #[arg(required = true)]
        input: PathBuf,

        /// 指定した画像の正解・予測を表示
        #[arg(short, long)]
        image: Option<String>,
    },

    /// 設定を表示
    Config {
        /// 現在の設定を表示
        #[arg(long)]
        show: bool,
    },
}
