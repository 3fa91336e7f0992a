use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::filter::{CartoonSettings, FilterSettings, PixelSettings, ThermalSettings};
use crate::ingest::CameraConfig;
use crate::pipeline::{LiveSettings, ProcessorSettings, DEFAULT_VIDEO_FPS};

const CONFIG_ENV: &str = "THERMATOON_CONFIG";
/// Each pyramid level halves the frame; past this it is already a pixel.
const MAX_DOWNSAMPLE_STEPS: u32 = 8;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ThermaToonConfigFile {
    cartoon: Option<CartoonConfigFile>,
    pixel: Option<PixelConfigFile>,
    thermal: Option<ThermalConfigFile>,
    video: Option<VideoConfigFile>,
    live: Option<LiveConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CartoonConfigFile {
    downsample_steps: Option<u32>,
    bilateral_passes: Option<u32>,
    bilateral_diameter: Option<usize>,
    sigma_color: Option<f64>,
    sigma_space: Option<f64>,
    median_window: Option<usize>,
    threshold_block: Option<usize>,
    threshold_offset: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PixelConfigFile {
    block_size: Option<u32>,
    num_colors: Option<usize>,
    seed: Option<u64>,
    max_iter: Option<usize>,
    epsilon: Option<f32>,
    attempts: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ThermalConfigFile {
    kernel_size: Option<usize>,
    sigma: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct VideoConfigFile {
    default_fps: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LiveConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    max_consecutive_failures: Option<u32>,
    preview_interval_ms: Option<u64>,
}

/// Effective settings for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermaToonConfig {
    pub filters: FilterSettings,
    pub processor: ProcessorSettings,
    /// Minimum time between preview file rewrites in live mode.
    pub preview_interval_ms: u64,
}

impl Default for ThermaToonConfig {
    fn default() -> Self {
        Self {
            filters: FilterSettings::default(),
            processor: ProcessorSettings::default(),
            preview_interval_ms: 200,
        }
    }
}

impl ThermaToonConfig {
    /// Defaults, then the file named by `THERMATOON_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok().filter(|p| !p.trim().is_empty());
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ThermaToonConfigFile) -> Self {
        let defaults = Self::default();

        let cartoon = {
            let d = defaults.filters.cartoon;
            let f = file.cartoon.unwrap_or_default();
            CartoonSettings {
                downsample_steps: f.downsample_steps.unwrap_or(d.downsample_steps),
                bilateral_passes: f.bilateral_passes.unwrap_or(d.bilateral_passes),
                bilateral_diameter: f.bilateral_diameter.unwrap_or(d.bilateral_diameter),
                sigma_color: f.sigma_color.unwrap_or(d.sigma_color),
                sigma_space: f.sigma_space.unwrap_or(d.sigma_space),
                median_window: f.median_window.unwrap_or(d.median_window),
                threshold_block: f.threshold_block.unwrap_or(d.threshold_block),
                threshold_offset: f.threshold_offset.unwrap_or(d.threshold_offset),
            }
        };

        let pixel = {
            let d = defaults.filters.pixel;
            let f = file.pixel.unwrap_or_default();
            let mut criteria = d.criteria;
            criteria.max_iter = f.max_iter.unwrap_or(criteria.max_iter);
            criteria.epsilon = f.epsilon.unwrap_or(criteria.epsilon);
            criteria.attempts = f.attempts.unwrap_or(criteria.attempts);
            PixelSettings {
                block_size: f.block_size.unwrap_or(d.block_size),
                num_colors: f.num_colors.unwrap_or(d.num_colors),
                criteria,
                seed: f.seed.or(d.seed),
            }
        };

        let thermal = {
            let d = defaults.filters.thermal;
            let f = file.thermal.unwrap_or_default();
            ThermalSettings {
                kernel_size: f.kernel_size.unwrap_or(d.kernel_size),
                sigma: f.sigma.unwrap_or(d.sigma),
            }
        };

        let video = file.video.unwrap_or_default();
        let live = file.live.unwrap_or_default();
        let d = defaults.processor.live;
        let camera = CameraConfig {
            device: live.device.unwrap_or(d.camera.device),
            width: live.width.unwrap_or(d.camera.width),
            height: live.height.unwrap_or(d.camera.height),
            target_fps: live.target_fps.unwrap_or(d.camera.target_fps),
        };

        Self {
            filters: FilterSettings {
                cartoon,
                pixel,
                thermal,
            },
            processor: ProcessorSettings {
                default_fps: video.default_fps.unwrap_or(DEFAULT_VIDEO_FPS),
                live: LiveSettings {
                    camera,
                    max_consecutive_failures: live
                        .max_consecutive_failures
                        .unwrap_or(d.max_consecutive_failures),
                    event_capacity: d.event_capacity,
                },
            },
            preview_interval_ms: live
                .preview_interval_ms
                .unwrap_or(defaults.preview_interval_ms),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(size) = env_number::<u32>("THERMATOON_PIXEL_SIZE")? {
            self.filters.pixel.block_size = size;
        }
        if let Some(colors) = env_number::<usize>("THERMATOON_NUM_COLORS")? {
            self.filters.pixel.num_colors = colors;
        }
        if let Some(seed) = env_number::<u64>("THERMATOON_SEED")? {
            self.filters.pixel.seed = Some(seed);
        }
        if let Some(fps) = env_number::<f64>("THERMATOON_VIDEO_FPS")? {
            self.processor.default_fps = fps;
        }
        if let Ok(device) = std::env::var("THERMATOON_LIVE_DEVICE") {
            if !device.trim().is_empty() {
                self.processor.live.camera.device = device;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let cartoon = &self.filters.cartoon;
        require_odd("cartoon.bilateral_diameter", cartoon.bilateral_diameter)?;
        require_odd("cartoon.median_window", cartoon.median_window)?;
        require_odd("cartoon.threshold_block", cartoon.threshold_block)?;
        if cartoon.downsample_steps > MAX_DOWNSAMPLE_STEPS {
            return Err(anyhow!(
                "cartoon.downsample_steps must be at most {MAX_DOWNSAMPLE_STEPS} (got {})",
                cartoon.downsample_steps
            ));
        }
        if cartoon.threshold_block < 3 {
            return Err(anyhow!("cartoon.threshold_block must be at least 3"));
        }
        if !(cartoon.sigma_color > 0.0 && cartoon.sigma_space > 0.0) {
            return Err(anyhow!("cartoon sigmas must be positive"));
        }

        let pixel = &self.filters.pixel;
        if pixel.block_size == 0 {
            return Err(anyhow!("pixel.block_size must be greater than zero"));
        }
        if pixel.num_colors == 0 {
            return Err(anyhow!("pixel.num_colors must be greater than zero"));
        }
        if pixel.criteria.max_iter == 0 || pixel.criteria.attempts == 0 {
            return Err(anyhow!("pixel.max_iter and pixel.attempts must be greater than zero"));
        }

        require_odd("thermal.kernel_size", self.filters.thermal.kernel_size)?;

        let fps = self.processor.default_fps;
        if !(fps.is_finite() && fps > 0.0) {
            return Err(anyhow!("video.default_fps must be positive (got {fps})"));
        }
        if self.processor.live.max_consecutive_failures == 0 {
            return Err(anyhow!("live.max_consecutive_failures must be greater than zero"));
        }
        Ok(())
    }
}

fn require_odd(name: &str, value: usize) -> Result<()> {
    if value == 0 || value % 2 == 0 {
        return Err(anyhow!("{name} must be a positive odd number (got {value})"));
    }
    Ok(())
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{key} must be a number (got '{raw}')")),
        _ => Ok(None),
    }
}

fn read_config_file(path: &Path) -> Result<ThermaToonConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
