//! Application settings persisted in `config.ini`.
//!
//! The file is organised in the sections `Paths`, `Thresholds`, `Limits`,
//! `Behavior`, `Window`, `Model`, `Debug` and `General`. Keys missing from
//! the file take their default value; keys that are present must parse.

use anyhow::{Context, Result};
use ini::Ini;
use serde::Serialize;
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::{error::TaggerError, tagger::Device};

pub const CONFIG_FILE_NAME: &str = "config.ini";
pub const DEBUG_LOG_FILE_NAME: &str = "debug_log.txt";
pub const MODEL_DIR_NAME: &str = "pixai-tagger-v0.9-onnx";
pub const MODEL_FILE_NAME: &str = "model.onnx";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paths {
    pub input_dir: String,
    pub model_dir: String,
    pub model_filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thresholds {
    pub general: f32,
    pub character: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Limits {
    pub general: usize,
    pub character: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Behavior {
    pub enable_solo_character_limit: bool,
    pub convert_underscore_to_space: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Window {
    pub geometry: String,
    pub tag_display_rows: usize,
    pub tag_display_cols: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelState {
    pub verified: bool,
    /// Execution device, see `Device::parse_list`.
    pub device: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugOptions {
    pub debug_log: bool,
}

/// Everything stored in `config.ini`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    /// Directory holding `config.ini`; relative paths resolve against it.
    #[serde(skip)]
    pub base_dir: PathBuf,
    pub paths: Paths,
    pub thresholds: Thresholds,
    pub limits: Limits,
    pub behavior: Behavior,
    pub window: Window,
    pub model: ModelState,
    pub debug: DebugOptions,
    pub language_code: String,
}

/// Window placement in `WxH+X+Y` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
}

impl FromStr for Geometry {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (size, pos) = s.split_once('+').ok_or("expected WxH+X+Y")?;
        let (w, h) = size.split_once('x').ok_or("expected WxH+X+Y")?;
        let (x, y) = pos.split_once('+').ok_or("expected WxH+X+Y")?;
        Ok(Self {
            width: w.trim().parse().map_err(|_| "bad width")?,
            height: h.trim().parse().map_err(|_| "bad height")?,
            x: x.trim().parse().map_err(|_| "bad x offset")?,
            y: y.trim().parse().map_err(|_| "bad y offset")?,
        })
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn format_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn parse_threshold(section: &str, key: &str, value: &str) -> Result<f32, TaggerError> {
    let parsed: f32 = value
        .trim()
        .parse()
        .map_err(|_| TaggerError::config(section, key, value, "not a number"))?;
    if !(0.0..=1.0).contains(&parsed) {
        return Err(TaggerError::config(section, key, value, "must be between 0 and 1"));
    }
    Ok(parsed)
}

fn parse_count(section: &str, key: &str, value: &str) -> Result<usize, TaggerError> {
    value
        .trim()
        .parse()
        .map_err(|_| TaggerError::config(section, key, value, "not a non-negative integer"))
}

fn parse_flag(section: &str, key: &str, value: &str) -> Result<bool, TaggerError> {
    parse_bool(value).ok_or_else(|| TaggerError::config(section, key, value, "not a boolean"))
}

impl Settings {
    /// Default settings for a config file living in `base_dir`.
    pub fn defaults(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            paths: Paths {
                input_dir: base_dir.join("inputs").to_string_lossy().into_owned(),
                model_dir: MODEL_DIR_NAME.to_string(),
                model_filename: MODEL_FILE_NAME.to_string(),
            },
            thresholds: Thresholds {
                general: 0.40,
                character: 0.65,
            },
            limits: Limits {
                general: 55,
                character: 1,
            },
            behavior: Behavior {
                enable_solo_character_limit: true,
                convert_underscore_to_space: true,
            },
            window: Window {
                geometry: "986x976+50+50".to_string(),
                tag_display_rows: 6,
                tag_display_cols: 5,
            },
            model: ModelState {
                verified: false,
                device: "cpu".to_string(),
            },
            debug: DebugOptions { debug_log: false },
            language_code: String::new(),
        }
    }

    /// Loads `config_path`, writing a default file first when it does not exist.
    pub fn load(config_path: &Path) -> Result<Self> {
        let base_dir = config_base_dir(config_path);
        let mut settings = Self::defaults(&base_dir);

        if config_path.is_file() {
            let ini = Ini::load_from_file(config_path)
                .with_context(|| format!("Failed to parse config file {:?}", config_path))?;
            settings.apply_ini(&ini)?;
            tracing::debug!("Loaded settings from {:?}", config_path);
        } else {
            settings
                .save(config_path)
                .with_context(|| format!("Failed to create default config {:?}", config_path))?;
            tracing::info!("Config {:?} not found, created defaults", config_path);
        }

        Ok(settings)
    }

    fn apply_ini(&mut self, ini: &Ini) -> Result<()> {
        for (section, props) in ini.iter() {
            let Some(section) = section else { continue };
            for (key, value) in props.iter() {
                match self.set(section, key, value) {
                    Ok(()) => {}
                    Err(TaggerError::UnknownSetting { .. }) => {
                        tracing::debug!("Ignoring unknown setting [{}] {}", section, key);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    /// Updates one setting from its textual form.
    pub fn set(&mut self, section: &str, key: &str, value: &str) -> Result<(), TaggerError> {
        match (section, key) {
            ("Paths", "input_dir") => self.paths.input_dir = value.to_string(),
            ("Paths", "model_dir") => self.paths.model_dir = value.to_string(),
            ("Paths", "model_filename") => self.paths.model_filename = value.to_string(),
            ("Thresholds", "general") => {
                self.thresholds.general = parse_threshold(section, key, value)?
            }
            ("Thresholds", "character") => {
                self.thresholds.character = parse_threshold(section, key, value)?
            }
            ("Limits", "general") => self.limits.general = parse_count(section, key, value)?,
            ("Limits", "character") => self.limits.character = parse_count(section, key, value)?,
            ("Behavior", "enable_solo_character_limit") => {
                self.behavior.enable_solo_character_limit = parse_flag(section, key, value)?
            }
            ("Behavior", "convert_underscore_to_space") => {
                self.behavior.convert_underscore_to_space = parse_flag(section, key, value)?
            }
            ("Window", "geometry") => {
                value
                    .parse::<Geometry>()
                    .map_err(|reason| TaggerError::config(section, key, value, reason))?;
                self.window.geometry = value.to_string();
            }
            ("Window", "tag_display_rows") => {
                self.window.tag_display_rows = parse_count(section, key, value)?
            }
            ("Window", "tag_display_cols") => {
                self.window.tag_display_cols = parse_count(section, key, value)?
            }
            ("Model", "verified") => self.model.verified = parse_flag(section, key, value)?,
            ("Model", "device") => {
                Device::parse_list(value)
                    .map_err(|reason| TaggerError::config(section, key, value, reason))?;
                self.model.device = value.trim().to_ascii_lowercase();
            }
            ("Debug", "debug_log") => self.debug.debug_log = parse_flag(section, key, value)?,
            ("General", "language_code") => self.language_code = value.to_string(),
            _ => {
                return Err(TaggerError::UnknownSetting {
                    section: section.to_string(),
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some("Paths"))
            .set("input_dir", self.paths.input_dir.as_str())
            .set("model_dir", self.paths.model_dir.as_str())
            .set("model_filename", self.paths.model_filename.as_str());
        ini.with_section(Some("Thresholds"))
            .set("general", format!("{:.2}", self.thresholds.general))
            .set("character", format!("{:.2}", self.thresholds.character));
        ini.with_section(Some("Limits"))
            .set("general", self.limits.general.to_string())
            .set("character", self.limits.character.to_string());
        ini.with_section(Some("Behavior"))
            .set(
                "enable_solo_character_limit",
                format_bool(self.behavior.enable_solo_character_limit),
            )
            .set(
                "convert_underscore_to_space",
                format_bool(self.behavior.convert_underscore_to_space),
            );
        ini.with_section(Some("Window"))
            .set("geometry", self.window.geometry.as_str())
            .set("tag_display_rows", self.window.tag_display_rows.to_string())
            .set("tag_display_cols", self.window.tag_display_cols.to_string());
        ini.with_section(Some("Model"))
            .set("verified", format_bool(self.model.verified))
            .set("device", self.model.device.as_str());
        ini.with_section(Some("Debug"))
            .set("debug_log", format_bool(self.debug.debug_log));
        ini.with_section(Some("General"))
            .set("language_code", self.language_code.as_str());
        ini
    }

    pub fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.to_ini()
            .write_to_file(config_path)
            .with_context(|| format!("Failed to write config file {:?}", config_path))?;
        tracing::debug!("Saved settings to {:?}", config_path);
        Ok(())
    }

    /// The settings rendered exactly as they would be saved.
    pub fn render(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.to_ini().write_to(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Execution providers for the tagger session.
    pub fn devices(&self) -> Result<Vec<Device>, TaggerError> {
        Device::parse_list(&self.model.device)
            .map_err(|reason| TaggerError::config("Model", "device", &self.model.device, reason))
    }

    pub fn input_dir(&self) -> PathBuf {
        self.resolve(&self.paths.input_dir)
    }

    pub fn model_dir(&self) -> PathBuf {
        self.resolve(&self.paths.model_dir)
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir().join(&self.paths.model_filename)
    }

    pub fn debug_log_path(&self) -> PathBuf {
        self.base_dir.join(DEBUG_LOG_FILE_NAME)
    }

    pub fn geometry(&self) -> Option<Geometry> {
        self.window.geometry.parse().ok()
    }
}

/// Directory containing `config_path`, `.` for a bare file name.
pub fn config_base_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Records whether the downloaded model passed verification.
///
/// The file is only rewritten when the flag actually changes.
pub fn update_model_verification(config_path: &Path, verified: bool) -> Result<()> {
    let mut settings = Settings::load(config_path)?;
    if settings.model.verified != verified {
        settings.model.verified = verified;
        settings.save(config_path)?;
        tracing::info!("Model verification status set to {}", verified);
    }
    Ok(())
}
