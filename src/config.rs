use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// アプリケーション設定 (config.toml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// 既定の種目 (catalog のキー)
    #[serde(default = "default_exercise")]
    pub exercise: String,
    /// リプレイ入力 (JSON Lines の PoseFrame)
    #[serde(default = "default_input")]
    pub input: String,
    /// 1フレームごとの結果を出力するか（false ならサマリーのみ）
    #[serde(default = "default_print_frames")]
    pub print_frames: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    /// 追加の種目定義 (TOML)。未指定なら組み込みのみ
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

/// 平滑化フィルタの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    #[default]
    MovingAverage,
    OneEuro,
}

/// 種目ごとの信号平滑化設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    /// 移動平均のウィンドウ長（フレーム数）
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default)]
    pub filter: FilterKind,
    /// One Euro: 最小カットオフ周波数 (Hz)
    #[serde(default = "default_min_cutoff")]
    pub min_cutoff: f32,
    /// One Euro: 速度係数
    #[serde(default = "default_beta")]
    pub beta: f32,
    /// One Euro: 微分のカットオフ (Hz)
    #[serde(default = "default_d_cutoff")]
    pub d_cutoff: f32,
}

fn default_exercise() -> String { "squat".to_string() }
fn default_input() -> String { "frames.jsonl".to_string() }
fn default_print_frames() -> bool { true }
fn default_listen_addr() -> String { "127.0.0.1:9100".to_string() }
fn default_window() -> usize { 5 }
fn default_min_cutoff() -> f32 { 1.0 }
fn default_beta() -> f32 { 0.05 }
fn default_d_cutoff() -> f32 { 1.0 }

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            exercise: default_exercise(),
            input: default_input(),
            print_frames: default_print_frames(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            filter: FilterKind::default(),
            min_cutoff: default_min_cutoff(),
            beta: default_beta(),
            d_cutoff: default_d_cutoff(),
        }
    }
}

impl SmoothingConfig {
    pub fn moving_average(window: usize) -> Self {
        Self {
            window,
            ..Self::default()
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// 読めなければ既定値（ファイルが無いのは正常系）
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{:#}; using defaults", e);
                Self::default()
            }
        }
    }
}
